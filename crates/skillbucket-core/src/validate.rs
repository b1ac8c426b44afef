//! Field-level validation shared by every store backend.
//!
//! These checks run before any write. Cross-record checks (parent existence,
//! same-framework chunk references, `vector_id` uniqueness) need the store
//! and live in the backends.

use crate::error::{StoreError, StoreResult};
use crate::models::{
    NewActivity, NewActivityEvidence, NewFramework, NewFrameworkDocument, NewKnowledgeChunk,
};

fn require_text(field: &'static str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(field, "must not be empty"));
    }
    Ok(())
}

pub fn framework(new: &NewFramework) -> StoreResult<()> {
    require_text("name", &new.name)?;
    require_text("description", &new.description)?;
    Ok(())
}

pub fn document(new: &NewFrameworkDocument) -> StoreResult<()> {
    require_text("storage_backend", &new.storage_backend)?;
    require_text("bucket", &new.bucket)?;
    require_text("object_key", &new.object_key)?;
    if let Some(size) = new.size_bytes {
        if size < 0 {
            return Err(StoreError::validation("size_bytes", "must be >= 0"));
        }
    }
    Ok(())
}

pub fn chunk(new: &NewKnowledgeChunk) -> StoreResult<()> {
    require_text("raw_text", &new.raw_text)?;
    require_text("vector_backend", &new.vector_backend)?;
    require_text("vector_collection", &new.vector_collection)?;
    if let Some(ref vector_id) = new.vector_id {
        require_text("vector_id", vector_id)?;
    }
    embedding_dim(new.embedding_dim)
}

pub fn embedding_dim(dim: Option<i32>) -> StoreResult<()> {
    match dim {
        Some(d) if d <= 0 => Err(StoreError::validation("embedding_dim", "must be > 0")),
        _ => Ok(()),
    }
}

pub fn activity(new: &NewActivity) -> StoreResult<()> {
    require_text("title", &new.title)?;
    require_text("description", &new.description)?;
    if let (Some(start), Some(end)) = (new.start_date, new.end_date) {
        if end < start {
            return Err(StoreError::validation(
                "end_date",
                format!("{} is before start_date {}", end, start),
            ));
        }
    }
    Ok(())
}

/// Validates an evidence row and returns its supporting chunk ids with
/// duplicates removed, first occurrence kept.
pub fn evidence(new: &NewActivityEvidence) -> StoreResult<Vec<uuid::Uuid>> {
    require_text("skill_name", &new.skill_name)?;
    require_text("justification", &new.justification)?;
    confidence(new.confidence)?;

    let mut seen = std::collections::HashSet::new();
    Ok(new
        .supporting_chunk_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect())
}

pub fn confidence(value: Option<f64>) -> StoreResult<()> {
    match value {
        Some(c) if !c.is_finite() || !(0.0..=1.0).contains(&c) => Err(StoreError::validation(
            "confidence",
            format!("{} is outside [0, 1]", c),
        )),
        _ => Ok(()),
    }
}
