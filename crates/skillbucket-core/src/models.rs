//! Core data models used throughout SkillBucket.
//!
//! Five record kinds make up the schema:
//!
//! ```text
//! Framework ──┬──▶ FrameworkDocument ──▶ KnowledgeChunk
//!             │                              ▲
//!             └──▶ ActivityEvidence ─────────┘ (supporting_chunk_ids)
//!                        ▲
//! Activity ──────────────┘
//! ```
//!
//! Stored records carry their id and timestamps. The `New*` types are the
//! inputs accepted by [`Store`](crate::store::Store) write operations; the
//! store assigns ids and timestamps.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default object storage backend label for uploaded documents.
pub const DEFAULT_STORAGE_BACKEND: &str = "minio";

/// Default vector store backend label for chunk embeddings.
pub const DEFAULT_VECTOR_BACKEND: &str = "qdrant";

/// A named skills taxonomy or standard (e.g. SFIA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Framework {
    pub id: Uuid,
    pub name: String,
    pub version: Option<String>,
    pub description: String,
    pub license: Option<String>,
    pub homepage_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable fields of a [`Framework`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewFramework {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    pub description: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub homepage_url: Option<String>,
}

/// Source document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Pdf,
    Docx,
    Text,
}

impl DocType {
    /// Map a file extension (case-insensitive, without the dot) to a type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocType::Pdf),
            "docx" => Some(DocType::Docx),
            "txt" | "md" | "markdown" => Some(DocType::Text),
            _ => None,
        }
    }

    /// MIME content type recorded alongside the document.
    pub fn content_type(&self) -> &'static str {
        match self {
            DocType::Pdf => "application/pdf",
            DocType::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocType::Text => "text/plain",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Pdf => "pdf",
            DocType::Docx => "docx",
            DocType::Text => "text",
        }
    }
}

impl std::str::FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(DocType::Pdf),
            "docx" => Ok(DocType::Docx),
            "text" => Ok(DocType::Text),
            other => Err(format!("unknown doc_type: '{}'", other)),
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded source document belonging to a [`Framework`].
///
/// Only the object storage coordinates are recorded; the bytes live in the
/// storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkDocument {
    pub id: Uuid,
    pub framework_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub doc_type: DocType,
    pub content_type: Option<String>,
    pub storage_backend: String,
    pub bucket: String,
    pub object_key: String,
    pub size_bytes: Option<i64>,
    /// SHA-256 of the document bytes, lowercase hex.
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Input for a new [`FrameworkDocument`]. Over HTTP the framework id comes
/// from the route, so it may be omitted from the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFrameworkDocument {
    #[serde(default)]
    pub framework_id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub doc_type: DocType,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,
    pub bucket: String,
    pub object_key: String,
    #[serde(default)]
    pub size_bytes: Option<i64>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

fn default_storage_backend() -> String {
    DEFAULT_STORAGE_BACKEND.to_string()
}

fn default_vector_backend() -> String {
    DEFAULT_VECTOR_BACKEND.to_string()
}

/// A retrieval unit derived from one [`FrameworkDocument`].
///
/// `vector_id` points into the external vector index and is unique across
/// every chunk of every framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: Uuid,
    pub framework_id: Uuid,
    pub framework_document_id: Uuid,
    /// Position in the source, e.g. `"p12"` or `"section 3.2"`.
    pub source_locator: Option<String>,
    /// Taxonomy path, e.g. `"Data > Modelling > Level 4"`.
    pub source_path: Option<String>,
    pub skill_code: Option<String>,
    pub skill_name: Option<String>,
    pub level: Option<String>,
    pub title: Option<String>,
    pub raw_text: String,
    pub summary_text: Option<String>,
    pub vector_backend: String,
    pub vector_collection: String,
    pub vector_id: String,
    pub embedding_model: Option<String>,
    pub embedding_dim: Option<i32>,
    pub extra_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new [`KnowledgeChunk`].
///
/// When `vector_id` is `None` the store uses the chunk's own id. Both parent
/// ids may be omitted from HTTP bodies; the route supplies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKnowledgeChunk {
    #[serde(default)]
    pub framework_id: Uuid,
    #[serde(default)]
    pub framework_document_id: Uuid,
    #[serde(default)]
    pub source_locator: Option<String>,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub skill_code: Option<String>,
    #[serde(default)]
    pub skill_name: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub raw_text: String,
    #[serde(default)]
    pub summary_text: Option<String>,
    #[serde(default = "default_vector_backend")]
    pub vector_backend: String,
    pub vector_collection: String,
    #[serde(default)]
    pub vector_id: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub embedding_dim: Option<i32>,
    #[serde(default)]
    pub extra_metadata: Option<serde_json::Value>,
}

impl NewKnowledgeChunk {
    /// A chunk with only the required fields set.
    pub fn new(
        framework_id: Uuid,
        framework_document_id: Uuid,
        raw_text: impl Into<String>,
        vector_collection: impl Into<String>,
    ) -> Self {
        Self {
            framework_id,
            framework_document_id,
            source_locator: None,
            source_path: None,
            skill_code: None,
            skill_name: None,
            level: None,
            title: None,
            raw_text: raw_text.into(),
            summary_text: None,
            vector_backend: default_vector_backend(),
            vector_collection: vector_collection.into(),
            vector_id: None,
            embedding_model: None,
            embedding_dim: None,
            extra_metadata: None,
        }
    }

    pub fn with_vector_id(mut self, vector_id: impl Into<String>) -> Self {
        self.vector_id = Some(vector_id.into());
        self
    }

    pub fn with_skill(
        mut self,
        code: Option<&str>,
        name: Option<&str>,
        level: Option<&str>,
    ) -> Self {
        self.skill_code = code.map(str::to_string);
        self.skill_name = name.map(str::to_string);
        self.level = level.map(str::to_string);
        self
    }
}

/// Fields of a chunk filled in after extraction, typically by the
/// out-of-band embedding and summarization pipeline. `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkAnnotation {
    #[serde(default)]
    pub summary_text: Option<String>,
    #[serde(default)]
    pub skill_code: Option<String>,
    #[serde(default)]
    pub skill_name: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub embedding_dim: Option<i32>,
}

/// A user-recorded activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub project: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// A generated link between one [`Activity`] and one framework skill/level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvidence {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub framework_id: Uuid,
    pub skill_code: Option<String>,
    pub skill_name: String,
    pub level: Option<String>,
    /// Within `[0, 1]` when present.
    pub confidence: Option<f64>,
    pub justification: String,
    /// Chunks that support the mapping, in the order the model cited them.
    pub supporting_chunk_ids: Vec<Uuid>,
    pub llm_model: Option<String>,
    pub prompt_version: Option<String>,
    pub analysis_run_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewActivityEvidence {
    pub activity_id: Uuid,
    pub framework_id: Uuid,
    #[serde(default)]
    pub skill_code: Option<String>,
    pub skill_name: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub justification: String,
    #[serde(default)]
    pub supporting_chunk_ids: Vec<Uuid>,
    #[serde(default)]
    pub llm_model: Option<String>,
    #[serde(default)]
    pub prompt_version: Option<String>,
    #[serde(default)]
    pub analysis_run_id: Option<Uuid>,
}

/// Selection for [`Store::list_chunks`](crate::store::Store::list_chunks) and
/// [`Store::search_chunks_matching`](crate::store::Store::search_chunks_matching).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkFilter {
    #[serde(default)]
    pub framework_id: Option<Uuid>,
    #[serde(default)]
    pub framework_document_id: Option<Uuid>,
    #[serde(default)]
    pub skill_code: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl ChunkFilter {
    /// Whether `chunk` passes every set field. `limit` is not considered.
    pub fn matches(&self, chunk: &KnowledgeChunk) -> bool {
        self.framework_id.map_or(true, |id| chunk.framework_id == id)
            && self
                .framework_document_id
                .map_or(true, |id| chunk.framework_document_id == id)
            && self
                .skill_code
                .as_deref()
                .map_or(true, |code| chunk.skill_code.as_deref() == Some(code))
            && self
                .level
                .as_deref()
                .map_or(true, |level| chunk.level.as_deref() == Some(level))
    }
}

/// Selection for [`Store::list_evidence`](crate::store::Store::list_evidence).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceFilter {
    #[serde(default)]
    pub activity_id: Option<Uuid>,
    #[serde(default)]
    pub framework_id: Option<Uuid>,
    #[serde(default)]
    pub analysis_run_id: Option<Uuid>,
}

/// A keyword retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkHit {
    pub chunk: KnowledgeChunk,
    /// Higher is better. Scale depends on the backend.
    pub score: f64,
    pub snippet: String,
}

/// Row counts per record kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub frameworks: i64,
    pub documents: i64,
    pub chunks: i64,
    pub activities: i64,
    pub evidence: i64,
}

/// Default vector collection name for a framework: lowercase alphanumeric
/// name segments joined by `_`, plus `_v<version>` when a version is set
/// (a leading `v` on the version is dropped).
///
/// `("SFIA", Some("8"))` becomes `"sfia_v8"`.
pub fn default_collection_name(name: &str, version: Option<&str>) -> String {
    let slug = slugify(name);
    let slug = if slug.is_empty() {
        "framework".to_string()
    } else {
        slug
    };
    let version = version.map(|v| slugify(v.trim().trim_start_matches(['v', 'V'])));
    match version.filter(|v| !v.is_empty()) {
        Some(v) => format!("{}_v{}", slug, v),
        None => slug,
    }
}

fn slugify(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}
