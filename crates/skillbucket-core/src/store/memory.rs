//! In-memory [`Store`] implementation for testing and embedding.
//!
//! All tables sit behind one `std::sync::RwLock`, so every operation,
//! cascades included, is atomic. Keyword search counts query-term
//! occurrences in chunk text (no FTS index).

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    Activity, ActivityEvidence, ChunkAnnotation, ChunkFilter, ChunkHit, EvidenceFilter,
    Framework, FrameworkDocument, KnowledgeChunk, NewActivity, NewActivityEvidence, NewFramework,
    NewFrameworkDocument, NewKnowledgeChunk, StoreCounts,
};
use crate::validate;

use super::{snippet, Store};

#[derive(Default)]
struct Tables {
    frameworks: Vec<Framework>,
    documents: Vec<FrameworkDocument>,
    chunks: Vec<KnowledgeChunk>,
    activities: Vec<Activity>,
    evidence: Vec<ActivityEvidence>,
}

impl Tables {
    fn framework(&self, id: Uuid) -> Option<&Framework> {
        self.frameworks.iter().find(|f| f.id == id)
    }

    fn document(&self, id: Uuid) -> Option<&FrameworkDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    fn chunk(&self, id: Uuid) -> Option<&KnowledgeChunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    /// Remove chunks matching `pred` and drop them from evidence citations.
    fn remove_chunks(&mut self, pred: impl Fn(&KnowledgeChunk) -> bool) -> usize {
        let removed: HashSet<Uuid> = self
            .chunks
            .iter()
            .filter(|c| pred(c))
            .map(|c| c.id)
            .collect();
        if removed.is_empty() {
            return 0;
        }
        self.chunks.retain(|c| !removed.contains(&c.id));
        for ev in &mut self.evidence {
            ev.supporting_chunk_ids.retain(|id| !removed.contains(id));
        }
        removed.len()
    }
}

/// In-memory store for tests and embedders.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::backend("in-memory store lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::backend("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_framework(&self, new: &NewFramework) -> StoreResult<Framework> {
        validate::framework(new)?;
        let now = Utc::now();
        let framework = Framework {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            version: new.version.clone(),
            description: new.description.clone(),
            license: new.license.clone(),
            homepage_url: new.homepage_url.clone(),
            created_at: now,
            updated_at: now,
        };
        self.write()?.frameworks.push(framework.clone());
        Ok(framework)
    }

    async fn get_framework(&self, id: Uuid) -> StoreResult<Option<Framework>> {
        Ok(self.read()?.framework(id).cloned())
    }

    async fn list_frameworks(&self) -> StoreResult<Vec<Framework>> {
        let mut frameworks = self.read()?.frameworks.clone();
        frameworks.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(frameworks)
    }

    async fn update_framework(&self, id: Uuid, new: &NewFramework) -> StoreResult<Framework> {
        validate::framework(new)?;
        let mut tables = self.write()?;
        let framework = tables
            .frameworks
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| StoreError::not_found("framework", id))?;
        framework.name = new.name.clone();
        framework.version = new.version.clone();
        framework.description = new.description.clone();
        framework.license = new.license.clone();
        framework.homepage_url = new.homepage_url.clone();
        framework.updated_at = Utc::now();
        Ok(framework.clone())
    }

    async fn delete_framework(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.write()?;
        let before = tables.frameworks.len();
        tables.frameworks.retain(|f| f.id != id);
        if tables.frameworks.len() == before {
            return Ok(false);
        }
        tables.documents.retain(|d| d.framework_id != id);
        tables.remove_chunks(|c| c.framework_id == id);
        tables.evidence.retain(|e| e.framework_id != id);
        Ok(true)
    }

    async fn create_document(
        &self,
        new: &NewFrameworkDocument,
    ) -> StoreResult<FrameworkDocument> {
        validate::document(new)?;
        let mut tables = self.write()?;
        if tables.framework(new.framework_id).is_none() {
            return Err(StoreError::invalid_reference(format!(
                "framework {} does not exist",
                new.framework_id
            )));
        }
        if let Some(ref checksum) = new.checksum {
            let taken = tables.documents.iter().any(|d| {
                d.framework_id == new.framework_id && d.checksum.as_ref() == Some(checksum)
            });
            if taken {
                return Err(StoreError::Duplicate {
                    field: "checksum",
                    value: checksum.clone(),
                });
            }
        }
        let document = FrameworkDocument {
            id: Uuid::new_v4(),
            framework_id: new.framework_id,
            title: new.title.clone(),
            description: new.description.clone(),
            doc_type: new.doc_type,
            content_type: new.content_type.clone(),
            storage_backend: new.storage_backend.clone(),
            bucket: new.bucket.clone(),
            object_key: new.object_key.clone(),
            size_bytes: new.size_bytes,
            checksum: new.checksum.clone(),
            created_at: Utc::now(),
            uploaded_at: new.uploaded_at,
        };
        tables.documents.push(document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: Uuid) -> StoreResult<Option<FrameworkDocument>> {
        Ok(self.read()?.document(id).cloned())
    }

    async fn list_documents(&self, framework_id: Uuid) -> StoreResult<Vec<FrameworkDocument>> {
        Ok(self
            .read()?
            .documents
            .iter()
            .filter(|d| d.framework_id == framework_id)
            .cloned()
            .collect())
    }

    async fn find_document_by_checksum(
        &self,
        framework_id: Uuid,
        checksum: &str,
    ) -> StoreResult<Option<FrameworkDocument>> {
        Ok(self
            .read()?
            .documents
            .iter()
            .find(|d| d.framework_id == framework_id && d.checksum.as_deref() == Some(checksum))
            .cloned())
    }

    async fn delete_document(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.write()?;
        let before = tables.documents.len();
        tables.documents.retain(|d| d.id != id);
        if tables.documents.len() == before {
            return Ok(false);
        }
        tables.remove_chunks(|c| c.framework_document_id == id);
        Ok(true)
    }

    async fn insert_chunks(
        &self,
        chunks: &[NewKnowledgeChunk],
    ) -> StoreResult<Vec<KnowledgeChunk>> {
        let mut tables = self.write()?;
        let mut vector_ids: HashSet<String> =
            tables.chunks.iter().map(|c| c.vector_id.clone()).collect();
        let now = Utc::now();
        let mut created = Vec::with_capacity(chunks.len());

        for new in chunks {
            validate::chunk(new)?;
            let document = tables.document(new.framework_document_id).ok_or_else(|| {
                StoreError::invalid_reference(format!(
                    "framework document {} does not exist",
                    new.framework_document_id
                ))
            })?;
            if document.framework_id != new.framework_id {
                return Err(StoreError::invalid_reference(format!(
                    "framework document {} does not belong to framework {}",
                    new.framework_document_id, new.framework_id
                )));
            }

            let id = Uuid::new_v4();
            let vector_id = new.vector_id.clone().unwrap_or_else(|| id.to_string());
            if !vector_ids.insert(vector_id.clone()) {
                return Err(StoreError::Duplicate {
                    field: "vector_id",
                    value: vector_id,
                });
            }

            created.push(KnowledgeChunk {
                id,
                framework_id: new.framework_id,
                framework_document_id: new.framework_document_id,
                source_locator: new.source_locator.clone(),
                source_path: new.source_path.clone(),
                skill_code: new.skill_code.clone(),
                skill_name: new.skill_name.clone(),
                level: new.level.clone(),
                title: new.title.clone(),
                raw_text: new.raw_text.clone(),
                summary_text: new.summary_text.clone(),
                vector_backend: new.vector_backend.clone(),
                vector_collection: new.vector_collection.clone(),
                vector_id,
                embedding_model: new.embedding_model.clone(),
                embedding_dim: new.embedding_dim,
                extra_metadata: new.extra_metadata.clone(),
                created_at: now,
                updated_at: now,
            });
        }

        tables.chunks.extend(created.iter().cloned());
        Ok(created)
    }

    async fn get_chunk(&self, id: Uuid) -> StoreResult<Option<KnowledgeChunk>> {
        Ok(self.read()?.chunk(id).cloned())
    }

    async fn list_chunks(&self, filter: &ChunkFilter) -> StoreResult<Vec<KnowledgeChunk>> {
        let tables = self.read()?;
        let limit = filter.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(tables
            .chunks
            .iter()
            .filter(|c| filter.matches(c))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn annotate_chunk(
        &self,
        id: Uuid,
        annotation: &ChunkAnnotation,
    ) -> StoreResult<KnowledgeChunk> {
        validate::embedding_dim(annotation.embedding_dim)?;
        let mut tables = self.write()?;
        let chunk = tables
            .chunks
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::not_found("knowledge chunk", id))?;
        if let Some(ref v) = annotation.summary_text {
            chunk.summary_text = Some(v.clone());
        }
        if let Some(ref v) = annotation.skill_code {
            chunk.skill_code = Some(v.clone());
        }
        if let Some(ref v) = annotation.skill_name {
            chunk.skill_name = Some(v.clone());
        }
        if let Some(ref v) = annotation.level {
            chunk.level = Some(v.clone());
        }
        if let Some(ref v) = annotation.embedding_model {
            chunk.embedding_model = Some(v.clone());
        }
        if let Some(v) = annotation.embedding_dim {
            chunk.embedding_dim = Some(v);
        }
        chunk.updated_at = Utc::now();
        Ok(chunk.clone())
    }

    async fn search_chunks_matching(
        &self,
        query: &str,
        filter: &ChunkFilter,
    ) -> StoreResult<Vec<ChunkHit>> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        let limit = filter.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let tables = self.read()?;
        let mut hits: Vec<ChunkHit> = tables
            .chunks
            .iter()
            .filter(|c| filter.matches(c))
            .filter_map(|c| {
                let text_lower = c.raw_text.to_lowercase();
                let matches = terms.iter().filter(|t| text_lower.contains(*t)).count();
                (matches > 0).then(|| ChunkHit {
                    chunk: c.clone(),
                    score: matches as f64,
                    snippet: snippet(&c.raw_text, 240),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_chunk(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.write()?.remove_chunks(|c| c.id == id) > 0)
    }

    async fn create_activity(&self, new: &NewActivity) -> StoreResult<Activity> {
        validate::activity(new)?;
        let now = Utc::now();
        let activity = Activity {
            id: Uuid::new_v4(),
            title: new.title.clone(),
            description: new.description.clone(),
            project: new.project.clone(),
            start_date: new.start_date,
            end_date: new.end_date,
            created_at: now,
            updated_at: now,
        };
        self.write()?.activities.push(activity.clone());
        Ok(activity)
    }

    async fn get_activity(&self, id: Uuid) -> StoreResult<Option<Activity>> {
        Ok(self
            .read()?
            .activities
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn list_activities(&self) -> StoreResult<Vec<Activity>> {
        Ok(self.read()?.activities.iter().rev().cloned().collect())
    }

    async fn delete_activity(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.write()?;
        let before = tables.activities.len();
        tables.activities.retain(|a| a.id != id);
        if tables.activities.len() == before {
            return Ok(false);
        }
        tables.evidence.retain(|e| e.activity_id != id);
        Ok(true)
    }

    async fn record_evidence(&self, new: &NewActivityEvidence) -> StoreResult<ActivityEvidence> {
        let supporting = validate::evidence(new)?;
        let mut tables = self.write()?;
        if !tables.activities.iter().any(|a| a.id == new.activity_id) {
            return Err(StoreError::invalid_reference(format!(
                "activity {} does not exist",
                new.activity_id
            )));
        }
        if tables.framework(new.framework_id).is_none() {
            return Err(StoreError::invalid_reference(format!(
                "framework {} does not exist",
                new.framework_id
            )));
        }
        for chunk_id in &supporting {
            match tables.chunk(*chunk_id) {
                Some(c) if c.framework_id == new.framework_id => {}
                Some(_) => {
                    return Err(StoreError::invalid_reference(format!(
                        "knowledge chunk {} belongs to another framework",
                        chunk_id
                    )))
                }
                None => {
                    return Err(StoreError::invalid_reference(format!(
                        "knowledge chunk {} does not exist",
                        chunk_id
                    )))
                }
            }
        }

        let evidence = ActivityEvidence {
            id: Uuid::new_v4(),
            activity_id: new.activity_id,
            framework_id: new.framework_id,
            skill_code: new.skill_code.clone(),
            skill_name: new.skill_name.clone(),
            level: new.level.clone(),
            confidence: new.confidence,
            justification: new.justification.clone(),
            supporting_chunk_ids: supporting,
            llm_model: new.llm_model.clone(),
            prompt_version: new.prompt_version.clone(),
            analysis_run_id: new.analysis_run_id,
            created_at: Utc::now(),
        };
        tables.evidence.push(evidence.clone());
        Ok(evidence)
    }

    async fn get_evidence(&self, id: Uuid) -> StoreResult<Option<ActivityEvidence>> {
        Ok(self.read()?.evidence.iter().find(|e| e.id == id).cloned())
    }

    async fn list_evidence(&self, filter: &EvidenceFilter) -> StoreResult<Vec<ActivityEvidence>> {
        Ok(self
            .read()?
            .evidence
            .iter()
            .filter(|e| filter.activity_id.map_or(true, |id| e.activity_id == id))
            .filter(|e| filter.framework_id.map_or(true, |id| e.framework_id == id))
            .filter(|e| {
                filter
                    .analysis_run_id
                    .map_or(true, |id| e.analysis_run_id == Some(id))
            })
            .cloned()
            .collect())
    }

    async fn delete_evidence(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.write()?;
        let before = tables.evidence.len();
        tables.evidence.retain(|e| e.id != id);
        Ok(tables.evidence.len() != before)
    }

    async fn counts(&self) -> StoreResult<StoreCounts> {
        let tables = self.read()?;
        Ok(StoreCounts {
            frameworks: tables.frameworks.len() as i64,
            documents: tables.documents.len() as i64,
            chunks: tables.chunks.len() as i64,
            activities: tables.activities.len() as i64,
            evidence: tables.evidence.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;

    async fn seed(store: &InMemoryStore, name: &str) -> (Framework, FrameworkDocument) {
        let framework = store
            .create_framework(&NewFramework {
                name: name.into(),
                version: Some("8".into()),
                description: "Skills Framework for the Information Age".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let document = store
            .create_document(&NewFrameworkDocument {
                framework_id: framework.id,
                title: Some("Reference guide".into()),
                description: None,
                doc_type: DocType::Pdf,
                content_type: None,
                storage_backend: "minio".into(),
                bucket: "frameworks".into(),
                object_key: format!("{}/guide.pdf", framework.id),
                size_bytes: Some(1024),
                checksum: Some(format!("sum-{}", name)),
                uploaded_at: None,
            })
            .await
            .unwrap();
        (framework, document)
    }

    async fn activity(store: &InMemoryStore) -> Activity {
        store
            .create_activity(&NewActivity {
                title: "Rewrote ingest".into(),
                description: "Ported the ingest service to async".into(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    fn evidence(activity: &Activity, framework: &Framework, chunks: Vec<Uuid>) -> NewActivityEvidence {
        NewActivityEvidence {
            activity_id: activity.id,
            framework_id: framework.id,
            skill_code: Some("PROG".into()),
            skill_name: "Programming/software development".into(),
            level: Some("4".into()),
            confidence: Some(0.8),
            justification: "Designed and built a service".into(),
            supporting_chunk_ids: chunks,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn duplicate_checksum_rejected_within_framework() {
        let store = InMemoryStore::new();
        let (fw, doc) = seed(&store, "SFIA").await;
        let (other, _) = seed(&store, "Other").await;
        let mut copy = NewFrameworkDocument {
            framework_id: fw.id,
            title: None,
            description: None,
            doc_type: DocType::Pdf,
            content_type: None,
            storage_backend: "minio".into(),
            bucket: "frameworks".into(),
            object_key: "copy.pdf".into(),
            size_bytes: None,
            checksum: doc.checksum.clone(),
            uploaded_at: None,
        };
        let err = store.create_document(&copy).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "checksum", .. }));

        copy.framework_id = other.id;
        store.create_document(&copy).await.unwrap();
        copy.checksum = None;
        store.create_document(&copy).await.unwrap();
        store.create_document(&copy).await.unwrap();
        assert_eq!(store.counts().await.unwrap().documents, 5);
    }

    #[tokio::test]
    async fn duplicate_vector_id_rejected_across_batches() {
        let store = InMemoryStore::new();
        let (fw, doc) = seed(&store, "SFIA").await;
        let first = NewKnowledgeChunk::new(fw.id, doc.id, "PROG level 4", "sfia_v8")
            .with_vector_id("v-1");
        store.insert_chunks(&[first.clone()]).await.unwrap();

        let err = store.insert_chunks(&[first]).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "vector_id", .. }));
        assert_eq!(store.counts().await.unwrap().chunks, 1);
    }

    #[tokio::test]
    async fn duplicate_vector_id_within_batch_stores_nothing() {
        let store = InMemoryStore::new();
        let (fw, doc) = seed(&store, "SFIA").await;
        let a = NewKnowledgeChunk::new(fw.id, doc.id, "one", "sfia_v8").with_vector_id("same");
        let b = NewKnowledgeChunk::new(fw.id, doc.id, "two", "sfia_v8").with_vector_id("same");
        assert!(store.insert_chunks(&[a, b]).await.is_err());
        assert_eq!(store.counts().await.unwrap().chunks, 0);
    }

    #[tokio::test]
    async fn default_vector_id_is_chunk_id() {
        let store = InMemoryStore::new();
        let (fw, doc) = seed(&store, "SFIA").await;
        let chunks = store
            .insert_chunks(&[
                NewKnowledgeChunk::new(fw.id, doc.id, "one", "sfia_v8"),
                NewKnowledgeChunk::new(fw.id, doc.id, "two", "sfia_v8"),
            ])
            .await
            .unwrap();
        assert_eq!(chunks[0].vector_id, chunks[0].id.to_string());
        assert_ne!(chunks[0].vector_id, chunks[1].vector_id);
    }

    #[tokio::test]
    async fn chunk_must_match_document_framework() {
        let store = InMemoryStore::new();
        let (fw_a, _) = seed(&store, "A").await;
        let (_, doc_b) = seed(&store, "B").await;
        let err = store
            .insert_chunks(&[NewKnowledgeChunk::new(fw_a.id, doc_b.id, "x", "a")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn delete_framework_cascades() {
        let store = InMemoryStore::new();
        let (fw, doc) = seed(&store, "SFIA").await;
        let (other_fw, other_doc) = seed(&store, "Other").await;
        let chunks = store
            .insert_chunks(&[NewKnowledgeChunk::new(fw.id, doc.id, "PROG", "sfia_v8")])
            .await
            .unwrap();
        store
            .insert_chunks(&[NewKnowledgeChunk::new(
                other_fw.id,
                other_doc.id,
                "unrelated",
                "other",
            )])
            .await
            .unwrap();
        let act = activity(&store).await;
        store
            .record_evidence(&evidence(&act, &fw, vec![chunks[0].id]))
            .await
            .unwrap();

        assert!(store.delete_framework(fw.id).await.unwrap());
        let counts = store.counts().await.unwrap();
        assert_eq!(counts.frameworks, 1);
        assert_eq!(counts.documents, 1);
        assert_eq!(counts.chunks, 1);
        assert_eq!(counts.evidence, 0);
        assert_eq!(counts.activities, 1);
        assert!(!store.delete_framework(fw.id).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_document_prunes_evidence_citations() {
        let store = InMemoryStore::new();
        let (fw, doc) = seed(&store, "SFIA").await;
        let chunks = store
            .insert_chunks(&[NewKnowledgeChunk::new(fw.id, doc.id, "PROG", "sfia_v8")])
            .await
            .unwrap();
        let act = activity(&store).await;
        let ev = store
            .record_evidence(&evidence(&act, &fw, vec![chunks[0].id]))
            .await
            .unwrap();

        assert!(store.delete_document(doc.id).await.unwrap());
        let ev = store.get_evidence(ev.id).await.unwrap().unwrap();
        assert!(ev.supporting_chunk_ids.is_empty());
    }

    #[tokio::test]
    async fn evidence_rejects_cross_framework_chunks() {
        let store = InMemoryStore::new();
        let (fw_a, _) = seed(&store, "A").await;
        let (fw_b, doc_b) = seed(&store, "B").await;
        let chunks = store
            .insert_chunks(&[NewKnowledgeChunk::new(fw_b.id, doc_b.id, "B text", "b")])
            .await
            .unwrap();
        let act = activity(&store).await;
        let err = store
            .record_evidence(&evidence(&act, &fw_a, vec![chunks[0].id]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn deleting_activity_removes_its_evidence() {
        let store = InMemoryStore::new();
        let (fw, _) = seed(&store, "SFIA").await;
        let act = activity(&store).await;
        store.record_evidence(&evidence(&act, &fw, vec![])).await.unwrap();
        assert!(store.delete_activity(act.id).await.unwrap());
        assert_eq!(store.counts().await.unwrap().evidence, 0);
    }

    #[tokio::test]
    async fn search_is_scoped_to_framework() {
        let store = InMemoryStore::new();
        let (fw_a, doc_a) = seed(&store, "A").await;
        let (fw_b, doc_b) = seed(&store, "B").await;
        store
            .insert_chunks(&[
                NewKnowledgeChunk::new(fw_a.id, doc_a.id, "data modelling level 4", "a"),
                NewKnowledgeChunk::new(fw_a.id, doc_a.id, "testing level 2", "a"),
            ])
            .await
            .unwrap();
        store
            .insert_chunks(&[NewKnowledgeChunk::new(fw_b.id, doc_b.id, "data modelling", "b")])
            .await
            .unwrap();

        let hits = store.search_chunks(fw_a.id, "data modelling", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.framework_id, fw_a.id);
        assert!(store.search_chunks(fw_a.id, "   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filtered_search_applies_filter_before_limit() {
        let store = InMemoryStore::new();
        let (fw, doc) = seed(&store, "SFIA").await;
        store
            .insert_chunks(&[
                NewKnowledgeChunk::new(fw.id, doc.id, "data design and data models", "s")
                    .with_skill(Some("DTAN"), None, Some("4")),
                NewKnowledgeChunk::new(fw.id, doc.id, "program design", "s")
                    .with_skill(Some("PROG"), None, Some("4")),
            ])
            .await
            .unwrap();

        let filter = ChunkFilter {
            framework_id: Some(fw.id),
            skill_code: Some("PROG".into()),
            limit: Some(1),
            ..Default::default()
        };
        let hits = store
            .search_chunks_matching("data design", &filter)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.skill_code.as_deref(), Some("PROG"));
    }

    #[tokio::test]
    async fn annotate_chunk_fills_late_fields() {
        let store = InMemoryStore::new();
        let (fw, doc) = seed(&store, "SFIA").await;
        let chunk = store
            .insert_chunks(&[NewKnowledgeChunk::new(fw.id, doc.id, "PROG", "sfia_v8")])
            .await
            .unwrap()
            .remove(0);
        let updated = store
            .annotate_chunk(
                chunk.id,
                &ChunkAnnotation {
                    skill_code: Some("PROG".into()),
                    embedding_model: Some("text-embedding-3-small".into()),
                    embedding_dim: Some(1536),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.skill_code.as_deref(), Some("PROG"));
        assert_eq!(updated.embedding_dim, Some(1536));
        assert!(updated.updated_at >= chunk.updated_at);

        let listed = store
            .list_chunks(&ChunkFilter {
                skill_code: Some("PROG".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
