//! Database statistics overview.
//!
//! Row counts per record kind plus the database file size. Used by
//! `skillbucket stats` to confirm that ingests and evidence runs landed.

use anyhow::Result;
use serde::Serialize;

use skillbucket_core::models::StoreCounts;
use skillbucket_core::store::Store;

use crate::config::Config;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub counts: StoreCounts,
    pub db_size_bytes: u64,
}

pub async fn collect_stats(store: &dyn Store, config: &Config) -> Result<Stats> {
    let counts = store.counts().await?;
    let db_size_bytes = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    Ok(Stats {
        counts,
        db_size_bytes,
    })
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(store: &dyn Store, config: &Config) -> Result<()> {
    let stats = collect_stats(store, config).await?;
    let c = &stats.counts;

    println!("SkillBucket: Database Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(stats.db_size_bytes));
    println!();
    println!("  Frameworks:  {}", c.frameworks);
    println!("  Documents:   {}", c.documents);
    println!("  Chunks:      {}", c.chunks);
    println!("  Activities:  {}", c.activities);
    println!("  Evidence:    {}", c.evidence);
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
