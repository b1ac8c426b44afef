//! Document ingestion: file → extracted text → chunks → store.
//!
//! A file is registered as a [`FrameworkDocument`] under an existing
//! framework and its text becomes [`KnowledgeChunk`]s. Embedding and vector
//! upserts happen out of band; chunks are stamped with the collection and
//! vector id they will be indexed under.
//!
//! Re-ingesting a file whose SHA-256 already exists under the framework is a
//! no-op.
//!
//! [`FrameworkDocument`]: skillbucket_core::models::FrameworkDocument
//! [`KnowledgeChunk`]: skillbucket_core::models::KnowledgeChunk

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use skillbucket_core::chunk::{chunk_text, content_hash};
use skillbucket_core::error::StoreError;
use skillbucket_core::models::{
    default_collection_name, DocType, NewFrameworkDocument, NewKnowledgeChunk,
};
use skillbucket_core::store::Store;

use crate::config::Config;
use crate::extract::extract_text;

/// Per-call overrides for [`ingest_document`].
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub title: Option<String>,
    /// Defaults to `storage.bucket` from config.
    pub bucket: Option<String>,
    /// Defaults to `<framework_id>/<file name>`.
    pub object_key: Option<String>,
    /// Defaults to `vector.collection` from config, then the framework's
    /// own collection name.
    pub collection: Option<String>,
    pub dry_run: bool,
}

/// Outcome of one ingest call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub framework_id: Uuid,
    /// The new document, or the existing one when `skipped` is set.
    /// `None` on a dry run.
    pub document_id: Option<Uuid>,
    pub doc_type: DocType,
    pub checksum: String,
    pub size_bytes: i64,
    pub chunks: usize,
    pub vector_collection: String,
    /// A document with the same checksum was already registered.
    pub skipped: bool,
    pub dry_run: bool,
}

/// Ingest one file into `framework_id`.
pub async fn ingest_document(
    store: &dyn Store,
    config: &Config,
    framework_id: Uuid,
    path: &Path,
    opts: &IngestOptions,
) -> Result<IngestReport> {
    let framework = store
        .get_framework(framework_id)
        .await?
        .ok_or_else(|| anyhow!("framework not found: {}", framework_id))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let doc_type = DocType::from_extension(ext).ok_or_else(|| {
        anyhow!(
            "unsupported file type '{}' (expected .pdf, .docx, .txt or .md)",
            path.display()
        )
    })?;

    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let checksum = content_hash(&bytes);
    let size_bytes = bytes.len() as i64;

    let vector_collection = opts
        .collection
        .clone()
        .or_else(|| config.vector.collection.clone())
        .unwrap_or_else(|| {
            default_collection_name(&framework.name, framework.version.as_deref())
        });

    let mut report = IngestReport {
        framework_id,
        document_id: None,
        doc_type,
        checksum: checksum.clone(),
        size_bytes,
        chunks: 0,
        vector_collection: vector_collection.clone(),
        skipped: false,
        dry_run: opts.dry_run,
    };

    if let Some(existing) = store
        .find_document_by_checksum(framework_id, &checksum)
        .await?
    {
        tracing::info!(
            framework_id = %framework_id,
            document_id = %existing.id,
            path = %path.display(),
            "document already ingested, skipping"
        );
        report.document_id = Some(existing.id);
        report.skipped = true;
        return Ok(report);
    }

    let text = extract_text(&bytes, doc_type)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;
    if text.trim().is_empty() {
        bail!("no text could be extracted from {}", path.display());
    }

    let pieces = chunk_text(&text, config.chunking.max_tokens);
    report.chunks = pieces.len();

    if opts.dry_run {
        tracing::info!(
            framework_id = %framework_id,
            path = %path.display(),
            chunks = pieces.len(),
            "dry run, nothing written"
        );
        return Ok(report);
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| checksum.clone());

    let created = store
        .create_document(&NewFrameworkDocument {
            framework_id,
            title: opts.title.clone().or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            }),
            description: None,
            doc_type,
            content_type: Some(doc_type.content_type().to_string()),
            storage_backend: config.storage.backend.clone(),
            bucket: opts
                .bucket
                .clone()
                .unwrap_or_else(|| config.storage.bucket.clone()),
            object_key: opts
                .object_key
                .clone()
                .unwrap_or_else(|| format!("{}/{}", framework_id, file_name)),
            size_bytes: Some(size_bytes),
            checksum: Some(checksum.clone()),
            uploaded_at: Some(Utc::now()),
        })
        .await;
    let document = match created {
        Ok(document) => document,
        // A concurrent ingest of the same bytes registered it first.
        Err(StoreError::Duplicate {
            field: "checksum", ..
        }) => {
            let existing = store
                .find_document_by_checksum(framework_id, &checksum)
                .await?
                .ok_or_else(|| anyhow!("document with checksum {} vanished", checksum))?;
            tracing::info!(
                framework_id = %framework_id,
                document_id = %existing.id,
                path = %path.display(),
                "document registered concurrently, skipping"
            );
            report.document_id = Some(existing.id);
            report.chunks = 0;
            report.skipped = true;
            return Ok(report);
        }
        Err(e) => return Err(e.into()),
    };

    let new_chunks: Vec<NewKnowledgeChunk> = pieces
        .iter()
        .map(|piece| {
            let mut chunk = NewKnowledgeChunk::new(
                framework_id,
                document.id,
                piece.text.clone(),
                vector_collection.clone(),
            );
            chunk.vector_backend = config.vector.backend.clone();
            chunk.title = document.title.clone();
            chunk.source_locator = Some(format!("chunk {}", piece.index));
            chunk.embedding_model = config.vector.embedding_model.clone();
            chunk.embedding_dim = config.vector.embedding_dim;
            chunk.extra_metadata = Some(serde_json::json!({
                "chunk_index": piece.index,
                "content_hash": piece.hash,
            }));
            chunk
        })
        .collect();

    if let Err(e) = store.insert_chunks(&new_chunks).await {
        tracing::warn!(
            document_id = %document.id,
            error = %e,
            "chunk insert failed, removing document"
        );
        if let Err(rollback) = store.delete_document(document.id).await {
            tracing::error!(
                document_id = %document.id,
                error = %rollback,
                "failed to remove document after chunk insert failure"
            );
        }
        return Err(e).context("Failed to store chunks");
    }

    tracing::info!(
        framework_id = %framework_id,
        document_id = %document.id,
        chunks = new_chunks.len(),
        collection = %vector_collection,
        "document ingested"
    );

    report.document_id = Some(document.id);
    Ok(report)
}

/// CLI entry point: ingest and print a summary.
pub async fn run_ingest(
    store: &dyn Store,
    config: &Config,
    framework_id: Uuid,
    path: &Path,
    opts: &IngestOptions,
) -> Result<()> {
    let report = ingest_document(store, config, framework_id, path, opts).await?;

    if report.dry_run {
        println!("ingest {} (dry-run)", path.display());
    } else {
        println!("ingest {}", path.display());
    }
    println!("  type:       {}", report.doc_type);
    println!("  size:       {} bytes", report.size_bytes);
    println!("  checksum:   {}", report.checksum);
    if report.skipped {
        if let Some(id) = report.document_id {
            println!("  skipped:    already ingested as document {}", id);
        }
        println!("ok");
        return Ok(());
    }
    if let Some(id) = report.document_id {
        println!("  document:   {}", id);
    }
    println!("  chunks:     {}", report.chunks);
    println!("  collection: {}", report.vector_collection);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use skillbucket_core::error::StoreResult;
    use skillbucket_core::models::*;
    use skillbucket_core::store::InMemoryStore;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Wraps [`InMemoryStore`] to stage the failures a shared database can
    /// produce between two calls.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        /// The next checksum lookup misses, as if another writer had not
        /// committed yet.
        miss_next_lookup: AtomicBool,
        fail_chunks: bool,
        fail_delete: bool,
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn create_framework(&self, new: &NewFramework) -> StoreResult<Framework> {
            self.inner.create_framework(new).await
        }
        async fn get_framework(&self, id: Uuid) -> StoreResult<Option<Framework>> {
            self.inner.get_framework(id).await
        }
        async fn list_frameworks(&self) -> StoreResult<Vec<Framework>> {
            self.inner.list_frameworks().await
        }
        async fn update_framework(&self, id: Uuid, new: &NewFramework) -> StoreResult<Framework> {
            self.inner.update_framework(id, new).await
        }
        async fn delete_framework(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_framework(id).await
        }
        async fn create_document(
            &self,
            new: &NewFrameworkDocument,
        ) -> StoreResult<FrameworkDocument> {
            self.inner.create_document(new).await
        }
        async fn get_document(&self, id: Uuid) -> StoreResult<Option<FrameworkDocument>> {
            self.inner.get_document(id).await
        }
        async fn list_documents(&self, framework_id: Uuid) -> StoreResult<Vec<FrameworkDocument>> {
            self.inner.list_documents(framework_id).await
        }
        async fn find_document_by_checksum(
            &self,
            framework_id: Uuid,
            checksum: &str,
        ) -> StoreResult<Option<FrameworkDocument>> {
            if self.miss_next_lookup.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_document_by_checksum(framework_id, checksum).await
        }
        async fn delete_document(&self, id: Uuid) -> StoreResult<bool> {
            if self.fail_delete {
                return Err(StoreError::backend("delete refused"));
            }
            self.inner.delete_document(id).await
        }
        async fn insert_chunks(
            &self,
            chunks: &[NewKnowledgeChunk],
        ) -> StoreResult<Vec<KnowledgeChunk>> {
            if self.fail_chunks {
                return Err(StoreError::backend("chunk insert refused"));
            }
            self.inner.insert_chunks(chunks).await
        }
        async fn get_chunk(&self, id: Uuid) -> StoreResult<Option<KnowledgeChunk>> {
            self.inner.get_chunk(id).await
        }
        async fn list_chunks(&self, filter: &ChunkFilter) -> StoreResult<Vec<KnowledgeChunk>> {
            self.inner.list_chunks(filter).await
        }
        async fn annotate_chunk(
            &self,
            id: Uuid,
            annotation: &ChunkAnnotation,
        ) -> StoreResult<KnowledgeChunk> {
            self.inner.annotate_chunk(id, annotation).await
        }
        async fn search_chunks_matching(
            &self,
            query: &str,
            filter: &ChunkFilter,
        ) -> StoreResult<Vec<ChunkHit>> {
            self.inner.search_chunks_matching(query, filter).await
        }
        async fn delete_chunk(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_chunk(id).await
        }
        async fn create_activity(&self, new: &NewActivity) -> StoreResult<Activity> {
            self.inner.create_activity(new).await
        }
        async fn get_activity(&self, id: Uuid) -> StoreResult<Option<Activity>> {
            self.inner.get_activity(id).await
        }
        async fn list_activities(&self) -> StoreResult<Vec<Activity>> {
            self.inner.list_activities().await
        }
        async fn delete_activity(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_activity(id).await
        }
        async fn record_evidence(
            &self,
            new: &NewActivityEvidence,
        ) -> StoreResult<ActivityEvidence> {
            self.inner.record_evidence(new).await
        }
        async fn get_evidence(&self, id: Uuid) -> StoreResult<Option<ActivityEvidence>> {
            self.inner.get_evidence(id).await
        }
        async fn list_evidence(
            &self,
            filter: &EvidenceFilter,
        ) -> StoreResult<Vec<ActivityEvidence>> {
            self.inner.list_evidence(filter).await
        }
        async fn delete_evidence(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_evidence(id).await
        }
        async fn counts(&self) -> StoreResult<StoreCounts> {
            self.inner.counts().await
        }
    }

    fn test_config(max_tokens: usize) -> Config {
        let toml = format!(
            r#"
[db]
path = "unused.sqlite"
[server]
bind = "127.0.0.1:0"
[chunking]
max_tokens = {}
"#,
            max_tokens
        );
        toml::from_str(&toml).unwrap()
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    async fn sfia(store: &dyn Store) -> Uuid {
        store
            .create_framework(&NewFramework {
                name: "SFIA".into(),
                version: Some("8".into()),
                description: "Skills Framework for the Information Age".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn ingest_registers_document_and_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "prog.md",
            "Programming/software development\n\nLevel 4: Designs, codes, tests.",
        );
        let store = InMemoryStore::new();
        let fw = sfia(&store).await;

        let report = ingest_document(&store, &test_config(700), fw, &path, &IngestOptions::default())
            .await
            .unwrap();

        assert!(!report.skipped);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.vector_collection, "sfia_v8");

        let doc_id = report.document_id.unwrap();
        let doc = store.get_document(doc_id).await.unwrap().unwrap();
        assert_eq!(doc.doc_type, DocType::Text);
        assert_eq!(doc.bucket, "frameworks");
        assert_eq!(doc.object_key, format!("{}/prog.md", fw));
        assert_eq!(doc.title.as_deref(), Some("prog"));
        assert!(doc.uploaded_at.is_some());

        let chunks = store
            .list_chunks(&ChunkFilter {
                framework_document_id: Some(doc_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].vector_id, chunks[0].id.to_string());
        assert_eq!(chunks[0].extra_metadata.as_ref().unwrap()["chunk_index"], 0);
    }

    #[tokio::test]
    async fn same_file_twice_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.txt", "Data modelling and design");
        let store = InMemoryStore::new();
        let fw = sfia(&store).await;
        let config = test_config(700);

        let first = ingest_document(&store, &config, fw, &path, &IngestOptions::default())
            .await
            .unwrap();
        let second = ingest_document(&store, &config, fw, &path, &IngestOptions::default())
            .await
            .unwrap();

        assert!(second.skipped);
        assert_eq!(second.document_id, first.document_id);
        assert_eq!(store.counts().await.unwrap().documents, 1);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.txt", "one\n\ntwo\n\nthree");
        let store = InMemoryStore::new();
        let fw = sfia(&store).await;

        let opts = IngestOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = ingest_document(&store, &test_config(1), fw, &path, &opts)
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.chunks, 3);
        assert!(report.document_id.is_none());
        let counts = store.counts().await.unwrap();
        assert_eq!(counts.documents, 0);
        assert_eq!(counts.chunks, 0);
    }

    #[tokio::test]
    async fn unknown_framework_and_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let config = test_config(700);

        let txt = write_file(dir.path(), "a.txt", "text");
        let err = ingest_document(&store, &config, Uuid::new_v4(), &txt, &IngestOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("framework not found"));

        let fw = sfia(&store).await;
        let xlsx = write_file(dir.path(), "a.xlsx", "text");
        let err = ingest_document(&store, &config, fw, &xlsx, &IngestOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported file type"));
    }

    #[tokio::test]
    async fn blank_text_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "blank.txt", "  \n\n  ");
        let store = InMemoryStore::new();
        let fw = sfia(&store).await;

        let err = ingest_document(&store, &test_config(700), fw, &path, &IngestOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no text"));
        assert_eq!(store.counts().await.unwrap().documents, 0);
    }

    #[tokio::test]
    async fn concurrent_registration_counts_as_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.txt", "Data modelling and design");
        let store = FlakyStore::default();
        let fw = sfia(&store).await;

        let winner = store
            .create_document(&NewFrameworkDocument {
                framework_id: fw,
                title: None,
                description: None,
                doc_type: DocType::Text,
                content_type: None,
                storage_backend: "local".into(),
                bucket: "frameworks".into(),
                object_key: "other-writer/a.txt".into(),
                size_bytes: None,
                checksum: Some(content_hash(b"Data modelling and design")),
                uploaded_at: None,
            })
            .await
            .unwrap();
        store.miss_next_lookup.store(true, Ordering::SeqCst);

        let report = ingest_document(&store, &test_config(700), fw, &path, &IngestOptions::default())
            .await
            .unwrap();

        assert!(report.skipped);
        assert_eq!(report.document_id, Some(winner.id));
        assert_eq!(report.chunks, 0);
        let counts = store.counts().await.unwrap();
        assert_eq!(counts.documents, 1);
        assert_eq!(counts.chunks, 0);
    }

    #[tokio::test]
    async fn chunk_failure_reports_insert_error_even_if_rollback_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.txt", "Data modelling and design");
        let store = FlakyStore {
            fail_chunks: true,
            fail_delete: true,
            ..Default::default()
        };
        let fw = sfia(&store).await;

        let err = ingest_document(&store, &test_config(700), fw, &path, &IngestOptions::default())
            .await
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to store chunks"));
        assert!(message.contains("chunk insert refused"));
        assert!(!message.contains("delete refused"));
    }

    #[tokio::test]
    async fn chunk_failure_removes_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.txt", "Data modelling and design");
        let store = FlakyStore {
            fail_chunks: true,
            ..Default::default()
        };
        let fw = sfia(&store).await;

        assert!(ingest_document(&store, &test_config(700), fw, &path, &IngestOptions::default())
            .await
            .is_err());
        assert_eq!(store.counts().await.unwrap().documents, 0);
    }
}
