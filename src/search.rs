//! Chunk listing and keyword search for `skillbucket chunks`.

use anyhow::{anyhow, Result};
use uuid::Uuid;

use skillbucket_core::models::{ChunkFilter, ChunkHit, KnowledgeChunk};
use skillbucket_core::store::{snippet, Store};

/// Default result count when `--limit` is not given.
const DEFAULT_LIMIT: i64 = 20;

/// Either a ranked keyword search or a filtered listing, depending on
/// whether `query` is set.
pub enum ChunkResults {
    Hits(Vec<ChunkHit>),
    Chunks(Vec<KnowledgeChunk>),
}

#[derive(Debug, Clone, Default)]
pub struct ChunkQuery {
    pub query: Option<String>,
    pub skill_code: Option<String>,
    pub level: Option<String>,
    pub limit: Option<i64>,
}

pub async fn find_chunks(
    store: &dyn Store,
    framework_id: Uuid,
    q: &ChunkQuery,
) -> Result<ChunkResults> {
    if store.get_framework(framework_id).await?.is_none() {
        return Err(anyhow!("framework not found: {}", framework_id));
    }
    let filter = ChunkFilter {
        framework_id: Some(framework_id),
        framework_document_id: None,
        skill_code: q.skill_code.clone(),
        level: q.level.clone(),
        limit: Some(q.limit.unwrap_or(DEFAULT_LIMIT)),
    };

    if let Some(query) = q.query.as_deref().filter(|s| !s.trim().is_empty()) {
        let hits = store.search_chunks_matching(query, &filter).await?;
        return Ok(ChunkResults::Hits(hits));
    }

    Ok(ChunkResults::Chunks(store.list_chunks(&filter).await?))
}

/// CLI entry point: print matching chunks.
pub async fn run_chunks(store: &dyn Store, framework_id: Uuid, q: &ChunkQuery) -> Result<()> {
    match find_chunks(store, framework_id, q).await? {
        ChunkResults::Hits(hits) if hits.is_empty() => println!("No results."),
        ChunkResults::Chunks(chunks) if chunks.is_empty() => println!("No chunks."),
        ChunkResults::Hits(hits) => {
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. [{:.2}] {}", i + 1, hit.score, describe(&hit.chunk));
                println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
                println!("    id: {}", hit.chunk.id);
                println!();
            }
        }
        ChunkResults::Chunks(chunks) => {
            for chunk in &chunks {
                println!("{}", describe(chunk));
                println!("    excerpt: \"{}\"", snippet(&chunk.raw_text, 160).replace('\n', " "));
                println!("    id: {}  vector: {}/{}", chunk.id, chunk.vector_collection, chunk.vector_id);
                println!();
            }
        }
    }
    Ok(())
}

fn describe(chunk: &KnowledgeChunk) -> String {
    let skill = match (&chunk.skill_code, &chunk.skill_name) {
        (Some(code), Some(name)) => format!("{} {}", code, name),
        (Some(code), None) => code.clone(),
        (None, Some(name)) => name.clone(),
        (None, None) => "(no skill)".to_string(),
    };
    match chunk.level {
        Some(ref level) => format!("{} / level {}", skill, level),
        None => skill,
    }
}
