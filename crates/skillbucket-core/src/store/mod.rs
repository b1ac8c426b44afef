//! Storage abstraction for SkillBucket.
//!
//! The [`Store`] trait is the repository layer over the five record kinds.
//! Relationships that an ORM would expose as object graphs are explicit
//! queries here (`list_documents`, `list_chunks`, `list_evidence`).
//!
//! Every backend guarantees the same invariants:
//!
//! - a chunk's document belongs to the chunk's framework;
//! - `vector_id` is unique across all chunks;
//! - a document checksum is unique within its framework;
//! - evidence only cites chunks of its own framework;
//! - `confidence` lies in `[0, 1]` when present;
//! - deleting a framework removes its documents, chunks and evidence;
//!   deleting a document removes its chunks; deleting an activity removes
//!   its evidence; a deleted chunk disappears from `supporting_chunk_ids`.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    Activity, ActivityEvidence, ChunkAnnotation, ChunkFilter, ChunkHit, EvidenceFilter,
    Framework, FrameworkDocument, KnowledgeChunk, NewActivity, NewActivityEvidence, NewFramework,
    NewFrameworkDocument, NewKnowledgeChunk, StoreCounts,
};

pub use memory::InMemoryStore;

/// Abstract storage backend for SkillBucket.
///
/// # Operations
///
/// | Group | Methods |
/// |-------|---------|
/// | Frameworks | `create_framework`, `get_framework`, `list_frameworks`, `update_framework`, `delete_framework` |
/// | Documents | `create_document`, `get_document`, `list_documents`, `find_document_by_checksum`, `delete_document` |
/// | Chunks | `insert_chunks`, `get_chunk`, `list_chunks`, `annotate_chunk`, `search_chunks`, `search_chunks_matching`, `delete_chunk` |
/// | Activities | `create_activity`, `get_activity`, `list_activities`, `delete_activity` |
/// | Evidence | `record_evidence`, `get_evidence`, `list_evidence`, `delete_evidence` |
///
/// `delete_*` methods return `Ok(false)` when nothing matched.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_framework(&self, new: &NewFramework) -> StoreResult<Framework>;

    async fn get_framework(&self, id: Uuid) -> StoreResult<Option<Framework>>;

    /// All frameworks ordered by name, then creation time.
    async fn list_frameworks(&self) -> StoreResult<Vec<Framework>>;

    /// Replace the editable fields and bump `updated_at`.
    async fn update_framework(&self, id: Uuid, new: &NewFramework) -> StoreResult<Framework>;

    /// Delete a framework together with everything under it.
    async fn delete_framework(&self, id: Uuid) -> StoreResult<bool>;

    /// Register a document. A checksum already present under the same
    /// framework is rejected with `Duplicate { field: "checksum" }`.
    async fn create_document(&self, new: &NewFrameworkDocument)
        -> StoreResult<FrameworkDocument>;

    async fn get_document(&self, id: Uuid) -> StoreResult<Option<FrameworkDocument>>;

    /// Documents of one framework, oldest first.
    async fn list_documents(&self, framework_id: Uuid) -> StoreResult<Vec<FrameworkDocument>>;

    async fn find_document_by_checksum(
        &self,
        framework_id: Uuid,
        checksum: &str,
    ) -> StoreResult<Option<FrameworkDocument>>;

    async fn delete_document(&self, id: Uuid) -> StoreResult<bool>;

    /// Insert a batch of chunks atomically: either every chunk is stored or
    /// none is.
    async fn insert_chunks(&self, chunks: &[NewKnowledgeChunk])
        -> StoreResult<Vec<KnowledgeChunk>>;

    async fn get_chunk(&self, id: Uuid) -> StoreResult<Option<KnowledgeChunk>>;

    /// Chunks matching every set field of `filter`, in insertion order.
    async fn list_chunks(&self, filter: &ChunkFilter) -> StoreResult<Vec<KnowledgeChunk>>;

    async fn annotate_chunk(
        &self,
        id: Uuid,
        annotation: &ChunkAnnotation,
    ) -> StoreResult<KnowledgeChunk>;

    /// Keyword retrieval over the chunks selected by `filter`, best first.
    /// The filter applies before `filter.limit`, so a narrow filter still
    /// fills the page with matching chunks.
    async fn search_chunks_matching(
        &self,
        query: &str,
        filter: &ChunkFilter,
    ) -> StoreResult<Vec<ChunkHit>>;

    /// Keyword retrieval within one framework, best first.
    async fn search_chunks(
        &self,
        framework_id: Uuid,
        query: &str,
        limit: i64,
    ) -> StoreResult<Vec<ChunkHit>> {
        let filter = ChunkFilter {
            framework_id: Some(framework_id),
            limit: Some(limit),
            ..Default::default()
        };
        self.search_chunks_matching(query, &filter).await
    }

    async fn delete_chunk(&self, id: Uuid) -> StoreResult<bool>;

    async fn create_activity(&self, new: &NewActivity) -> StoreResult<Activity>;

    async fn get_activity(&self, id: Uuid) -> StoreResult<Option<Activity>>;

    /// Activities, most recently created first.
    async fn list_activities(&self) -> StoreResult<Vec<Activity>>;

    async fn delete_activity(&self, id: Uuid) -> StoreResult<bool>;

    async fn record_evidence(&self, new: &NewActivityEvidence) -> StoreResult<ActivityEvidence>;

    async fn get_evidence(&self, id: Uuid) -> StoreResult<Option<ActivityEvidence>>;

    /// Evidence matching every set field of `filter`, oldest first.
    async fn list_evidence(&self, filter: &EvidenceFilter) -> StoreResult<Vec<ActivityEvidence>>;

    async fn delete_evidence(&self, id: Uuid) -> StoreResult<bool>;

    async fn counts(&self) -> StoreResult<StoreCounts>;
}

/// Trim a chunk's text to a display snippet of at most `max_chars` chars.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
