//! Database schema migrations (idempotent).
//!
//! Tables:
//!
//! | Table | Holds |
//! |-------|-------|
//! | `frameworks` | skills taxonomies |
//! | `framework_documents` | uploaded source documents (storage coordinates) |
//! | `knowledge_chunks` | retrieval units with vector index bookkeeping |
//! | `activities` | user-recorded activities |
//! | `activity_evidence` | activity → skill/level links |
//! | `evidence_chunks` | ordered `supporting_chunk_ids` of each evidence row |
//! | `knowledge_chunks_fts` | FTS5 index over chunk text, kept in sync by triggers |
//!
//! Composite foreign keys carry the framework id down the chain, so the
//! database itself rejects a chunk whose document belongs to another
//! framework and evidence citing another framework's chunk.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS frameworks (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        version TEXT,
        description TEXT NOT NULL,
        license TEXT,
        homepage_url TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS framework_documents (
        id TEXT PRIMARY KEY,
        framework_id TEXT NOT NULL REFERENCES frameworks(id) ON DELETE CASCADE,
        title TEXT,
        description TEXT,
        doc_type TEXT NOT NULL,
        content_type TEXT,
        storage_backend TEXT NOT NULL DEFAULT 'minio',
        bucket TEXT NOT NULL,
        object_key TEXT NOT NULL,
        size_bytes INTEGER CHECK (size_bytes IS NULL OR size_bytes >= 0),
        checksum TEXT,
        created_at TEXT NOT NULL,
        uploaded_at TEXT,
        UNIQUE (id, framework_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS knowledge_chunks (
        id TEXT PRIMARY KEY,
        framework_id TEXT NOT NULL REFERENCES frameworks(id) ON DELETE CASCADE,
        framework_document_id TEXT NOT NULL,
        source_locator TEXT,
        source_path TEXT,
        skill_code TEXT,
        skill_name TEXT,
        level TEXT,
        title TEXT,
        raw_text TEXT NOT NULL,
        summary_text TEXT,
        vector_backend TEXT NOT NULL DEFAULT 'qdrant',
        vector_collection TEXT NOT NULL,
        vector_id TEXT NOT NULL UNIQUE,
        embedding_model TEXT,
        embedding_dim INTEGER CHECK (embedding_dim IS NULL OR embedding_dim > 0),
        extra_metadata TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (id, framework_id),
        FOREIGN KEY (framework_document_id, framework_id)
            REFERENCES framework_documents(id, framework_id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activities (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        project TEXT,
        start_date TEXT,
        end_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (start_date IS NULL OR end_date IS NULL OR end_date >= start_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activity_evidence (
        id TEXT PRIMARY KEY,
        activity_id TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
        framework_id TEXT NOT NULL REFERENCES frameworks(id) ON DELETE CASCADE,
        skill_code TEXT,
        skill_name TEXT NOT NULL,
        level TEXT,
        confidence REAL CHECK (confidence IS NULL OR (confidence >= 0.0 AND confidence <= 1.0)),
        justification TEXT NOT NULL,
        llm_model TEXT,
        prompt_version TEXT,
        analysis_run_id TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (id, framework_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS evidence_chunks (
        evidence_id TEXT NOT NULL,
        framework_id TEXT NOT NULL,
        chunk_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (evidence_id, chunk_id),
        FOREIGN KEY (evidence_id, framework_id)
            REFERENCES activity_evidence(id, framework_id) ON DELETE CASCADE,
        FOREIGN KEY (chunk_id, framework_id)
            REFERENCES knowledge_chunks(id, framework_id) ON DELETE CASCADE
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_framework_documents_framework ON framework_documents(framework_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_framework_documents_checksum ON framework_documents(framework_id, checksum) WHERE checksum IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_framework ON knowledge_chunks(framework_id)",
    "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_document ON knowledge_chunks(framework_document_id, framework_id)",
    "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_skill_code ON knowledge_chunks(skill_code)",
    "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_skill_name ON knowledge_chunks(skill_name)",
    "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_level ON knowledge_chunks(level)",
    "CREATE INDEX IF NOT EXISTS idx_activity_evidence_activity ON activity_evidence(activity_id)",
    "CREATE INDEX IF NOT EXISTS idx_activity_evidence_framework ON activity_evidence(framework_id)",
    "CREATE INDEX IF NOT EXISTS idx_activity_evidence_skill_code ON activity_evidence(skill_code)",
    "CREATE INDEX IF NOT EXISTS idx_activity_evidence_run ON activity_evidence(analysis_run_id)",
    "CREATE INDEX IF NOT EXISTS idx_evidence_chunks_chunk ON evidence_chunks(chunk_id, framework_id)",
];

// Cascaded deletes fire these too, so the FTS index never outlives a chunk.
const FTS_TRIGGERS: &[&str] = &[
    r#"
    CREATE TRIGGER IF NOT EXISTS knowledge_chunks_fts_insert
    AFTER INSERT ON knowledge_chunks
    BEGIN
        INSERT INTO knowledge_chunks_fts (chunk_id, framework_id, raw_text)
        VALUES (new.id, new.framework_id, new.raw_text);
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS knowledge_chunks_fts_delete
    AFTER DELETE ON knowledge_chunks
    BEGIN
        DELETE FROM knowledge_chunks_fts WHERE chunk_id = old.id;
    END
    "#,
];

/// Open the configured database and bring its schema up to date.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = migrate_pool(&pool).await;
    pool.close().await;
    result
}

/// Create every table, index and trigger that does not exist yet.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    for ddl in TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='knowledge_chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE knowledge_chunks_fts USING fts5(
                chunk_id UNINDEXED,
                framework_id UNINDEXED,
                raw_text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    for ddl in FTS_TRIGGERS.iter().chain(INDEXES) {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::debug!("schema migrations applied");
    Ok(())
}
