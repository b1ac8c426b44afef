//! `skillbucket framework add|list|delete`.

use anyhow::{anyhow, Result};
use uuid::Uuid;

use skillbucket_core::models::{default_collection_name, NewFramework};
use skillbucket_core::store::Store;

pub async fn run_add(store: &dyn Store, new: &NewFramework) -> Result<()> {
    let framework = store.create_framework(new).await?;
    tracing::info!(framework_id = %framework.id, name = %framework.name, "framework created");
    println!("{}", framework.id);
    Ok(())
}

pub async fn run_list(store: &dyn Store) -> Result<()> {
    let frameworks = store.list_frameworks().await?;
    if frameworks.is_empty() {
        println!("No frameworks.");
        return Ok(());
    }

    println!("{:<36}  {:<24} {:<8} COLLECTION", "ID", "NAME", "VERSION");
    for fw in &frameworks {
        println!(
            "{:<36}  {:<24} {:<8} {}",
            fw.id,
            fw.name,
            fw.version.as_deref().unwrap_or("-"),
            default_collection_name(&fw.name, fw.version.as_deref())
        );
    }
    Ok(())
}

/// Deletes the framework with everything under it.
pub async fn run_delete(store: &dyn Store, id: Uuid) -> Result<()> {
    if !store.delete_framework(id).await? {
        return Err(anyhow!("framework not found: {}", id));
    }
    tracing::info!(framework_id = %id, "framework deleted");
    println!("Deleted framework {} and its documents, chunks and evidence.", id);
    Ok(())
}
