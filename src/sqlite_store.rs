//! SQLite-backed [`Store`] implementation.
//!
//! Ids are stored as hyphenated UUID text, timestamps as RFC 3339 text and
//! activity dates as `YYYY-MM-DD`. Relationship invariants are enforced by
//! the schema in [`crate::migrate`]; the explicit lookups before inserts
//! only exist to produce precise error messages.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use skillbucket_core::models::{
    Activity, ActivityEvidence, ChunkAnnotation, ChunkFilter, ChunkHit, DocType, EvidenceFilter,
    Framework, FrameworkDocument, KnowledgeChunk, NewActivity, NewActivityEvidence, NewFramework,
    NewFrameworkDocument, NewKnowledgeChunk, StoreCounts,
};
use skillbucket_core::store::Store;
use skillbucket_core::{validate, StoreError, StoreResult};

use crate::config::Config;
use crate::{db, migrate};

const FRAMEWORK_COLUMNS: &str =
    "id, name, version, description, license, homepage_url, created_at, updated_at";

const DOCUMENT_COLUMNS: &str = "id, framework_id, title, description, doc_type, content_type, \
     storage_backend, bucket, object_key, size_bytes, checksum, created_at, uploaded_at";

const CHUNK_COLUMNS: &str = "c.id, c.framework_id, c.framework_document_id, c.source_locator, \
     c.source_path, c.skill_code, c.skill_name, c.level, c.title, c.raw_text, c.summary_text, \
     c.vector_backend, c.vector_collection, c.vector_id, c.embedding_model, c.embedding_dim, \
     c.extra_metadata, c.created_at, c.updated_at";

const ACTIVITY_COLUMNS: &str =
    "id, title, description, project, start_date, end_date, created_at, updated_at";

/// Evidence ids per `IN (...)` lookup, well under SQLite's bound-parameter cap.
const EVIDENCE_ID_BATCH: usize = 500;

const EVIDENCE_COLUMNS: &str = "id, activity_id, framework_id, skill_code, skill_name, level, \
     confidence, justification, llm_model, prompt_version, analysis_run_id, created_at";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an already-migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and apply migrations.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(pool))
    }

    /// A fresh, migrated in-memory database.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let pool = db::connect_in_memory().await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Supporting chunk ids keyed by evidence id, each list in citation order.
    async fn evidence_chunk_map(
        &self,
        evidence_ids: &[String],
    ) -> StoreResult<HashMap<String, Vec<Uuid>>> {
        let mut map: HashMap<String, Vec<Uuid>> = HashMap::new();
        for batch in evidence_ids.chunks(EVIDENCE_ID_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT evidence_id, chunk_id FROM evidence_chunks \
                 WHERE evidence_id IN ({}) ORDER BY evidence_id, position",
                placeholders
            );
            let mut query = sqlx::query_as::<_, (String, String)>(&sql);
            for id in batch {
                query = query.bind(id);
            }
            for (evidence_id, chunk_id) in query.fetch_all(&self.pool).await.map_err(db_err)? {
                map.entry(evidence_id).or_default().push(parse_uuid(&chunk_id)?);
            }
        }
        Ok(map)
    }

    async fn evidence_from_rows(&self, rows: Vec<SqliteRow>) -> StoreResult<Vec<ActivityEvidence>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let mut supporting = self.evidence_chunk_map(&ids).await?;
        rows.iter()
            .zip(&ids)
            .map(|(row, id)| evidence_from_row(row, supporting.remove(id).unwrap_or_default()))
            .collect()
    }
}

// ============ Conversions ============

fn db_err(e: sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        match db.kind() {
            ErrorKind::ForeignKeyViolation => {
                return StoreError::invalid_reference(db.message().to_string())
            }
            ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
                return StoreError::validation("constraint", db.message().to_string())
            }
            ErrorKind::UniqueViolation => {
                return StoreError::Duplicate {
                    field: "key",
                    value: db.message().to_string(),
                }
            }
            _ => {}
        }
    }
    StoreError::backend(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| matches!(db.kind(), ErrorKind::UniqueViolation))
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::backend(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_date(s: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| StoreError::backend(format!("bad date '{}': {}", s, e)))
}

fn parse_uuid(s: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::backend(format!("bad uuid '{}': {}", s, e)))
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(db_err)
}

fn get_uuid(row: &SqliteRow, column: &str) -> StoreResult<Uuid> {
    let s: String = get(row, column)?;
    parse_uuid(&s)
}

fn get_ts(row: &SqliteRow, column: &str) -> StoreResult<DateTime<Utc>> {
    let s: String = get(row, column)?;
    parse_ts(&s)
}

fn framework_from_row(row: &SqliteRow) -> StoreResult<Framework> {
    Ok(Framework {
        id: get_uuid(row, "id")?,
        name: get(row, "name")?,
        version: get(row, "version")?,
        description: get(row, "description")?,
        license: get(row, "license")?,
        homepage_url: get(row, "homepage_url")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn document_from_row(row: &SqliteRow) -> StoreResult<FrameworkDocument> {
    let doc_type: String = get(row, "doc_type")?;
    let uploaded_at: Option<String> = get(row, "uploaded_at")?;
    Ok(FrameworkDocument {
        id: get_uuid(row, "id")?,
        framework_id: get_uuid(row, "framework_id")?,
        title: get(row, "title")?,
        description: get(row, "description")?,
        doc_type: doc_type.parse::<DocType>().map_err(StoreError::backend)?,
        content_type: get(row, "content_type")?,
        storage_backend: get(row, "storage_backend")?,
        bucket: get(row, "bucket")?,
        object_key: get(row, "object_key")?,
        size_bytes: get(row, "size_bytes")?,
        checksum: get(row, "checksum")?,
        created_at: get_ts(row, "created_at")?,
        uploaded_at: uploaded_at.as_deref().map(parse_ts).transpose()?,
    })
}

fn chunk_from_row(row: &SqliteRow) -> StoreResult<KnowledgeChunk> {
    let extra: Option<String> = get(row, "extra_metadata")?;
    let extra_metadata = extra
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| StoreError::backend(format!("bad extra_metadata: {}", e)))?;
    Ok(KnowledgeChunk {
        id: get_uuid(row, "id")?,
        framework_id: get_uuid(row, "framework_id")?,
        framework_document_id: get_uuid(row, "framework_document_id")?,
        source_locator: get(row, "source_locator")?,
        source_path: get(row, "source_path")?,
        skill_code: get(row, "skill_code")?,
        skill_name: get(row, "skill_name")?,
        level: get(row, "level")?,
        title: get(row, "title")?,
        raw_text: get(row, "raw_text")?,
        summary_text: get(row, "summary_text")?,
        vector_backend: get(row, "vector_backend")?,
        vector_collection: get(row, "vector_collection")?,
        vector_id: get(row, "vector_id")?,
        embedding_model: get(row, "embedding_model")?,
        embedding_dim: get(row, "embedding_dim")?,
        extra_metadata,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn activity_from_row(row: &SqliteRow) -> StoreResult<Activity> {
    let start: Option<String> = get(row, "start_date")?;
    let end: Option<String> = get(row, "end_date")?;
    Ok(Activity {
        id: get_uuid(row, "id")?,
        title: get(row, "title")?,
        description: get(row, "description")?,
        project: get(row, "project")?,
        start_date: start.as_deref().map(parse_date).transpose()?,
        end_date: end.as_deref().map(parse_date).transpose()?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn evidence_from_row(row: &SqliteRow, supporting: Vec<Uuid>) -> StoreResult<ActivityEvidence> {
    let run: Option<String> = get(row, "analysis_run_id")?;
    Ok(ActivityEvidence {
        id: get_uuid(row, "id")?,
        activity_id: get_uuid(row, "activity_id")?,
        framework_id: get_uuid(row, "framework_id")?,
        skill_code: get(row, "skill_code")?,
        skill_name: get(row, "skill_name")?,
        level: get(row, "level")?,
        confidence: get(row, "confidence")?,
        justification: get(row, "justification")?,
        supporting_chunk_ids: supporting,
        llm_model: get(row, "llm_model")?,
        prompt_version: get(row, "prompt_version")?,
        analysis_run_id: run.as_deref().map(parse_uuid).transpose()?,
        created_at: get_ts(row, "created_at")?,
    })
}

/// Turn free text into an FTS5 query that matches any of its words.
///
/// Each word is quoted so operators and punctuation in user input are
/// treated as plain text. Words without any alphanumeric character are
/// dropped.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_framework(&self, new: &NewFramework) -> StoreResult<Framework> {
        validate::framework(new)?;
        let id = Uuid::new_v4();
        let now = ts(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO frameworks (id, name, version, description, license, homepage_url,
                                    created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&new.name)
        .bind(&new.version)
        .bind(&new.description)
        .bind(&new.license)
        .bind(&new.homepage_url)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_framework(id)
            .await?
            .ok_or_else(|| StoreError::not_found("framework", id))
    }

    async fn get_framework(&self, id: Uuid) -> StoreResult<Option<Framework>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM frameworks WHERE id = ?",
            FRAMEWORK_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(framework_from_row).transpose()
    }

    async fn list_frameworks(&self) -> StoreResult<Vec<Framework>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM frameworks ORDER BY name, created_at",
            FRAMEWORK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(framework_from_row).collect()
    }

    async fn update_framework(&self, id: Uuid, new: &NewFramework) -> StoreResult<Framework> {
        validate::framework(new)?;
        let result = sqlx::query(
            r#"
            UPDATE frameworks
            SET name = ?, version = ?, description = ?, license = ?, homepage_url = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&new.name)
        .bind(&new.version)
        .bind(&new.description)
        .bind(&new.license)
        .bind(&new.homepage_url)
        .bind(ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("framework", id));
        }
        self.get_framework(id)
            .await?
            .ok_or_else(|| StoreError::not_found("framework", id))
    }

    async fn delete_framework(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM frameworks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_document(
        &self,
        new: &NewFrameworkDocument,
    ) -> StoreResult<FrameworkDocument> {
        validate::document(new)?;
        if self.get_framework(new.framework_id).await?.is_none() {
            return Err(StoreError::invalid_reference(format!(
                "framework {} does not exist",
                new.framework_id
            )));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO framework_documents (id, framework_id, title, description, doc_type,
                                             content_type, storage_backend, bucket, object_key,
                                             size_bytes, checksum, created_at, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(new.framework_id.to_string())
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.doc_type.as_str())
        .bind(&new.content_type)
        .bind(&new.storage_backend)
        .bind(&new.bucket)
        .bind(&new.object_key)
        .bind(new.size_bytes)
        .bind(&new.checksum)
        .bind(ts(Utc::now()))
        .bind(new.uploaded_at.map(ts))
        .execute(&self.pool)
        .await
        .map_err(|e| match (&new.checksum, is_unique_violation(&e)) {
            (Some(checksum), true) => StoreError::Duplicate {
                field: "checksum",
                value: checksum.clone(),
            },
            _ => db_err(e),
        })?;

        self.get_document(id)
            .await?
            .ok_or_else(|| StoreError::not_found("framework document", id))
    }

    async fn get_document(&self, id: Uuid) -> StoreResult<Option<FrameworkDocument>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM framework_documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self, framework_id: Uuid) -> StoreResult<Vec<FrameworkDocument>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM framework_documents WHERE framework_id = ? ORDER BY rowid",
            DOCUMENT_COLUMNS
        ))
        .bind(framework_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(document_from_row).collect()
    }

    async fn find_document_by_checksum(
        &self,
        framework_id: Uuid,
        checksum: &str,
    ) -> StoreResult<Option<FrameworkDocument>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM framework_documents WHERE framework_id = ? AND checksum = ? \
             ORDER BY rowid LIMIT 1",
            DOCUMENT_COLUMNS
        ))
        .bind(framework_id.to_string())
        .bind(checksum)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn delete_document(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM framework_documents WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_chunks(
        &self,
        chunks: &[NewKnowledgeChunk],
    ) -> StoreResult<Vec<KnowledgeChunk>> {
        for new in chunks {
            validate::chunk(new)?;
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let now = ts(Utc::now());
        let mut ids = Vec::with_capacity(chunks.len());

        for new in chunks {
            let owner: Option<String> =
                sqlx::query_scalar("SELECT framework_id FROM framework_documents WHERE id = ?")
                    .bind(new.framework_document_id.to_string())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err)?;
            match owner {
                None => {
                    return Err(StoreError::invalid_reference(format!(
                        "framework document {} does not exist",
                        new.framework_document_id
                    )))
                }
                Some(fw) if fw != new.framework_id.to_string() => {
                    return Err(StoreError::invalid_reference(format!(
                        "framework document {} does not belong to framework {}",
                        new.framework_document_id, new.framework_id
                    )))
                }
                Some(_) => {}
            }

            let id = Uuid::new_v4();
            let vector_id = new.vector_id.clone().unwrap_or_else(|| id.to_string());
            let extra = new
                .extra_metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| StoreError::validation("extra_metadata", e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO knowledge_chunks (id, framework_id, framework_document_id,
                                              source_locator, source_path, skill_code,
                                              skill_name, level, title, raw_text, summary_text,
                                              vector_backend, vector_collection, vector_id,
                                              embedding_model, embedding_dim, extra_metadata,
                                              created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(new.framework_id.to_string())
            .bind(new.framework_document_id.to_string())
            .bind(&new.source_locator)
            .bind(&new.source_path)
            .bind(&new.skill_code)
            .bind(&new.skill_name)
            .bind(&new.level)
            .bind(&new.title)
            .bind(&new.raw_text)
            .bind(&new.summary_text)
            .bind(&new.vector_backend)
            .bind(&new.vector_collection)
            .bind(&vector_id)
            .bind(&new.embedding_model)
            .bind(new.embedding_dim)
            .bind(extra)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate {
                        field: "vector_id",
                        value: vector_id.clone(),
                    }
                } else {
                    db_err(e)
                }
            })?;

            ids.push(id);
        }

        tx.commit().await.map_err(db_err)?;

        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            let chunk = self
                .get_chunk(id)
                .await?
                .ok_or_else(|| StoreError::not_found("knowledge chunk", id))?;
            created.push(chunk);
        }
        Ok(created)
    }

    async fn get_chunk(&self, id: Uuid) -> StoreResult<Option<KnowledgeChunk>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM knowledge_chunks c WHERE c.id = ?",
            CHUNK_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(chunk_from_row).transpose()
    }

    async fn list_chunks(&self, filter: &ChunkFilter) -> StoreResult<Vec<KnowledgeChunk>> {
        let framework_id = filter.framework_id.map(|id| id.to_string());
        let document_id = filter.framework_document_id.map(|id| id.to_string());
        // SQLite treats a negative LIMIT as no limit.
        let limit = filter.limit.map(|l| l.max(0)).unwrap_or(-1);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM knowledge_chunks c
            WHERE (? IS NULL OR c.framework_id = ?)
              AND (? IS NULL OR c.framework_document_id = ?)
              AND (? IS NULL OR c.skill_code = ?)
              AND (? IS NULL OR c.level = ?)
            ORDER BY c.rowid
            LIMIT ?
            "#,
            CHUNK_COLUMNS
        ))
        .bind(&framework_id)
        .bind(&framework_id)
        .bind(&document_id)
        .bind(&document_id)
        .bind(&filter.skill_code)
        .bind(&filter.skill_code)
        .bind(&filter.level)
        .bind(&filter.level)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn annotate_chunk(
        &self,
        id: Uuid,
        annotation: &ChunkAnnotation,
    ) -> StoreResult<KnowledgeChunk> {
        validate::embedding_dim(annotation.embedding_dim)?;
        let result = sqlx::query(
            r#"
            UPDATE knowledge_chunks
            SET summary_text = COALESCE(?, summary_text),
                skill_code = COALESCE(?, skill_code),
                skill_name = COALESCE(?, skill_name),
                level = COALESCE(?, level),
                embedding_model = COALESCE(?, embedding_model),
                embedding_dim = COALESCE(?, embedding_dim),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&annotation.summary_text)
        .bind(&annotation.skill_code)
        .bind(&annotation.skill_name)
        .bind(&annotation.level)
        .bind(&annotation.embedding_model)
        .bind(annotation.embedding_dim)
        .bind(ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("knowledge chunk", id));
        }
        self.get_chunk(id)
            .await?
            .ok_or_else(|| StoreError::not_found("knowledge chunk", id))
    }

    async fn search_chunks_matching(
        &self,
        query: &str,
        filter: &ChunkFilter,
    ) -> StoreResult<Vec<ChunkHit>> {
        let Some(fts) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let limit = filter.limit.map(|l| l.max(0)).unwrap_or(-1);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let framework_id = filter.framework_id.map(|id| id.to_string());
        let document_id = filter.framework_document_id.map(|id| id.to_string());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {},
                   knowledge_chunks_fts.rank AS rank_score,
                   snippet(knowledge_chunks_fts, 2, '>>>', '<<<', '...', 48) AS snippet
            FROM knowledge_chunks_fts
            JOIN knowledge_chunks c ON c.id = knowledge_chunks_fts.chunk_id
            WHERE knowledge_chunks_fts MATCH ?
              AND (? IS NULL OR knowledge_chunks_fts.framework_id = ?)
              AND (? IS NULL OR c.framework_document_id = ?)
              AND (? IS NULL OR c.skill_code = ?)
              AND (? IS NULL OR c.level = ?)
            ORDER BY knowledge_chunks_fts.rank
            LIMIT ?
            "#,
            CHUNK_COLUMNS
        ))
        .bind(&fts)
        .bind(&framework_id)
        .bind(&framework_id)
        .bind(&document_id)
        .bind(&document_id)
        .bind(&filter.skill_code)
        .bind(&filter.skill_code)
        .bind(&filter.level)
        .bind(&filter.level)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let rank: f64 = get(row, "rank_score")?;
                Ok(ChunkHit {
                    chunk: chunk_from_row(row)?,
                    // bm25 ranks are negative, lower is better
                    score: -rank,
                    snippet: get(row, "snippet")?,
                })
            })
            .collect()
    }

    async fn delete_chunk(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM knowledge_chunks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_activity(&self, new: &NewActivity) -> StoreResult<Activity> {
        validate::activity(new)?;
        let id = Uuid::new_v4();
        let now = ts(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO activities (id, title, description, project, start_date, end_date,
                                    created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.project)
        .bind(new.start_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(new.end_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_activity(id)
            .await?
            .ok_or_else(|| StoreError::not_found("activity", id))
    }

    async fn get_activity(&self, id: Uuid) -> StoreResult<Option<Activity>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM activities WHERE id = ?",
            ACTIVITY_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(activity_from_row).transpose()
    }

    async fn list_activities(&self) -> StoreResult<Vec<Activity>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM activities ORDER BY rowid DESC",
            ACTIVITY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(activity_from_row).collect()
    }

    async fn delete_activity(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM activities WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_evidence(&self, new: &NewActivityEvidence) -> StoreResult<ActivityEvidence> {
        let supporting = validate::evidence(new)?;
        let framework_id = new.framework_id.to_string();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let activity: Option<String> =
            sqlx::query_scalar("SELECT id FROM activities WHERE id = ?")
                .bind(new.activity_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        if activity.is_none() {
            return Err(StoreError::invalid_reference(format!(
                "activity {} does not exist",
                new.activity_id
            )));
        }

        let framework: Option<String> =
            sqlx::query_scalar("SELECT id FROM frameworks WHERE id = ?")
                .bind(&framework_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        if framework.is_none() {
            return Err(StoreError::invalid_reference(format!(
                "framework {} does not exist",
                new.framework_id
            )));
        }

        for chunk_id in &supporting {
            let owner: Option<String> =
                sqlx::query_scalar("SELECT framework_id FROM knowledge_chunks WHERE id = ?")
                    .bind(chunk_id.to_string())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err)?;
            match owner {
                None => {
                    return Err(StoreError::invalid_reference(format!(
                        "knowledge chunk {} does not exist",
                        chunk_id
                    )))
                }
                Some(fw) if fw != framework_id => {
                    return Err(StoreError::invalid_reference(format!(
                        "knowledge chunk {} belongs to another framework",
                        chunk_id
                    )))
                }
                Some(_) => {}
            }
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO activity_evidence (id, activity_id, framework_id, skill_code, skill_name,
                                           level, confidence, justification, llm_model,
                                           prompt_version, analysis_run_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(new.activity_id.to_string())
        .bind(&framework_id)
        .bind(&new.skill_code)
        .bind(&new.skill_name)
        .bind(&new.level)
        .bind(new.confidence)
        .bind(&new.justification)
        .bind(&new.llm_model)
        .bind(&new.prompt_version)
        .bind(new.analysis_run_id.map(|r| r.to_string()))
        .bind(ts(Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for (position, chunk_id) in supporting.iter().enumerate() {
            sqlx::query(
                "INSERT INTO evidence_chunks (evidence_id, framework_id, chunk_id, position) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id.to_string())
            .bind(&framework_id)
            .bind(chunk_id.to_string())
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;

        self.get_evidence(id)
            .await?
            .ok_or_else(|| StoreError::not_found("activity evidence", id))
    }

    async fn get_evidence(&self, id: Uuid) -> StoreResult<Option<ActivityEvidence>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM activity_evidence WHERE id = ?",
            EVIDENCE_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        let rows: Vec<SqliteRow> = row.into_iter().collect();
        Ok(self.evidence_from_rows(rows).await?.pop())
    }

    async fn list_evidence(&self, filter: &EvidenceFilter) -> StoreResult<Vec<ActivityEvidence>> {
        let activity_id = filter.activity_id.map(|id| id.to_string());
        let framework_id = filter.framework_id.map(|id| id.to_string());
        let run_id = filter.analysis_run_id.map(|id| id.to_string());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM activity_evidence
            WHERE (? IS NULL OR activity_id = ?)
              AND (? IS NULL OR framework_id = ?)
              AND (? IS NULL OR analysis_run_id = ?)
            ORDER BY rowid
            "#,
            EVIDENCE_COLUMNS
        ))
        .bind(&activity_id)
        .bind(&activity_id)
        .bind(&framework_id)
        .bind(&framework_id)
        .bind(&run_id)
        .bind(&run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        self.evidence_from_rows(rows).await
    }

    async fn delete_evidence(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM activity_evidence WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn counts(&self) -> StoreResult<StoreCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM frameworks) AS frameworks,
                (SELECT COUNT(*) FROM framework_documents) AS documents,
                (SELECT COUNT(*) FROM knowledge_chunks) AS chunks,
                (SELECT COUNT(*) FROM activities) AS activities,
                (SELECT COUNT(*) FROM activity_evidence) AS evidence
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(StoreCounts {
            frameworks: get(&row, "frameworks")?,
            documents: get(&row, "documents")?,
            chunks: get(&row, "chunks")?,
            activities: get(&row, "activities")?,
            evidence: get(&row, "evidence")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_query_quotes_terms() {
        assert_eq!(
            fts_query("data modelling").as_deref(),
            Some("\"data\" OR \"modelling\"")
        );
        assert_eq!(
            fts_query("say \"hi\" NEAR").as_deref(),
            Some("\"say\" OR \"\"\"hi\"\"\" OR \"NEAR\"")
        );
    }

    #[test]
    fn fts_query_drops_punctuation_only_terms() {
        assert_eq!(fts_query("  - * ").as_deref(), None);
        assert_eq!(fts_query("").as_deref(), None);
        assert_eq!(fts_query("c++ -").as_deref(), Some("\"c++\""));
    }

    #[test]
    fn timestamps_round_trip_through_text() {
        let now = Utc::now();
        let parsed = parse_ts(&ts(now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }
}
