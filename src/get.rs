//! Framework retrieval for `skillbucket framework show`.
//!
//! Gathers a framework together with its documents and per-document chunk
//! counts.

use anyhow::{anyhow, Result};
use serde::Serialize;
use uuid::Uuid;

use skillbucket_core::models::{ChunkFilter, Framework, FrameworkDocument};
use skillbucket_core::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct FrameworkOverview {
    pub framework: Framework,
    pub documents: Vec<DocumentOverview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentOverview {
    pub document: FrameworkDocument,
    pub chunk_count: usize,
}

pub async fn framework_overview(store: &dyn Store, id: Uuid) -> Result<FrameworkOverview> {
    let framework = store
        .get_framework(id)
        .await?
        .ok_or_else(|| anyhow!("framework not found: {}", id))?;

    let mut documents = Vec::new();
    for document in store.list_documents(id).await? {
        let chunks = store
            .list_chunks(&ChunkFilter {
                framework_document_id: Some(document.id),
                ..Default::default()
            })
            .await?;
        documents.push(DocumentOverview {
            document,
            chunk_count: chunks.len(),
        });
    }

    Ok(FrameworkOverview {
        framework,
        documents,
    })
}

/// CLI entry point: print a framework and its documents.
pub async fn run_show(store: &dyn Store, id: Uuid) -> Result<()> {
    let overview = framework_overview(store, id).await?;
    let fw = &overview.framework;

    println!("--- Framework ---");
    println!("id:          {}", fw.id);
    println!("name:        {}", fw.name);
    println!("version:     {}", fw.version.as_deref().unwrap_or("-"));
    println!("description: {}", fw.description);
    if let Some(ref license) = fw.license {
        println!("license:     {}", license);
    }
    if let Some(ref url) = fw.homepage_url {
        println!("homepage:    {}", url);
    }
    println!("created_at:  {}", fw.created_at.to_rfc3339());
    println!("updated_at:  {}", fw.updated_at.to_rfc3339());
    println!();

    println!("--- Documents ({}) ---", overview.documents.len());
    for d in &overview.documents {
        let doc = &d.document;
        println!(
            "{}  {:<5} {:>4} chunks  {}/{}  {}",
            doc.id,
            doc.doc_type,
            d.chunk_count,
            doc.bucket,
            doc.object_key,
            doc.title.as_deref().unwrap_or("(untitled)")
        );
    }

    Ok(())
}
