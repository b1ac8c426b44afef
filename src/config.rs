//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/skillbucket.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [chunking]
//! max_tokens = 700
//!
//! [storage]
//! backend = "minio"
//! bucket = "frameworks"
//!
//! [vector]
//! backend = "qdrant"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```
//!
//! Only `[db]` and `[server]` are required; every other section has defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use skillbucket_core::models::{DEFAULT_STORAGE_BACKEND, DEFAULT_VECTOR_BACKEND};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    700
}

/// Object storage coordinates recorded for ingested documents.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            bucket: default_bucket(),
        }
    }
}

fn default_storage_backend() -> String {
    DEFAULT_STORAGE_BACKEND.to_string()
}

fn default_bucket() -> String {
    "frameworks".to_string()
}

/// Vector index bookkeeping stamped onto new chunks.
#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_vector_backend")]
    pub backend: String,
    /// Overrides the per-framework collection name when set.
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub embedding_dim: Option<i32>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            collection: None,
            embedding_model: None,
            embedding_dim: None,
        }
    }
}

fn default_vector_backend() -> String {
    DEFAULT_VECTOR_BACKEND.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.storage.backend.trim().is_empty() || config.storage.bucket.trim().is_empty() {
        anyhow::bail!("storage.backend and storage.bucket must not be empty");
    }

    if config.vector.backend.trim().is_empty() {
        anyhow::bail!("vector.backend must not be empty");
    }

    if let Some(ref collection) = config.vector.collection {
        if collection.trim().is_empty() {
            anyhow::bail!("vector.collection must not be empty when set");
        }
    }

    if matches!(config.vector.embedding_dim, Some(d) if d <= 0) {
        anyhow::bail!("vector.embedding_dim must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse(
            r#"
[db]
path = "./data/skillbucket.sqlite"

[server]
bind = "127.0.0.1:8000"
"#,
        )
        .unwrap();
        assert_eq!(cfg.db.max_connections, 5);
        assert_eq!(cfg.chunking.max_tokens, 700);
        assert_eq!(cfg.storage.backend, "minio");
        assert_eq!(cfg.storage.bucket, "frameworks");
        assert_eq!(cfg.vector.backend, "qdrant");
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn json_log_format_parses() {
        let cfg = parse(
            r#"
[db]
path = "x.sqlite"
[server]
bind = "127.0.0.1:0"
[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn zero_max_tokens_rejected() {
        let err = parse(
            r#"
[db]
path = "x.sqlite"
[server]
bind = "127.0.0.1:0"
[chunking]
max_tokens = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_tokens"));
    }

    #[test]
    fn bad_embedding_dim_rejected() {
        let err = parse(
            r#"
[db]
path = "x.sqlite"
[server]
bind = "127.0.0.1:0"
[vector]
embedding_dim = -3
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding_dim"));
    }
}
