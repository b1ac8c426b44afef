//! # SkillBucket CLI (`skillbucket`)
//!
//! ## Usage
//!
//! ```bash
//! skillbucket --config ./config/skillbucket.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `skillbucket init` | Create the SQLite database and run schema migrations |
//! | `skillbucket serve` | Start the HTTP API |
//! | `skillbucket framework add\|list\|show\|delete` | Manage frameworks |
//! | `skillbucket ingest <framework-id> <path>` | Register a document and chunk it |
//! | `skillbucket chunks <framework-id>` | List or keyword-search chunks |
//! | `skillbucket stats` | Row counts and database size |
//!
//! ## Examples
//!
//! ```bash
//! skillbucket init
//! skillbucket framework add --name SFIA --version 8 --description "Skills Framework for the Information Age"
//! skillbucket ingest 6f1c... ./docs/sfia-8.pdf
//! skillbucket chunks 6f1c... --query "data modelling" --limit 5
//! skillbucket serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use skillbucket::config;
use skillbucket::ingest::IngestOptions;
use skillbucket::logging::init_logging;
use skillbucket::search::ChunkQuery;
use skillbucket::sqlite_store::SqliteStore;
use skillbucket::{framework_cmd, get, ingest, migrate, search, server, stats};
use skillbucket_core::models::NewFramework;

/// SkillBucket: a store for skills-framework documents, their knowledge
/// chunks, and the evidence linking user activities to framework skills.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/skillbucket.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "skillbucket",
    about = "SkillBucket: skills framework knowledge store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/skillbucket.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Running it
    /// again is safe.
    Init,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Manage frameworks.
    Framework {
        #[command(subcommand)]
        action: FrameworkAction,
    },

    /// Ingest a PDF, DOCX or text document into a framework.
    ///
    /// Extracts the text, splits it into chunks and stores both the document
    /// coordinates and the chunks. A file already ingested into the same
    /// framework (same SHA-256) is skipped.
    Ingest {
        /// Framework UUID.
        framework_id: Uuid,

        /// Path to the document.
        path: PathBuf,

        /// Document title (defaults to the file name without extension).
        #[arg(long)]
        title: Option<String>,

        /// Object storage bucket (defaults to `[storage].bucket`).
        #[arg(long)]
        bucket: Option<String>,

        /// Object key (defaults to `<framework-id>/<file name>`).
        #[arg(long)]
        object_key: Option<String>,

        /// Vector collection for the chunks.
        #[arg(long)]
        collection: Option<String>,

        /// Show chunk counts without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// List chunks of a framework, or keyword-search them with `--query`.
    Chunks {
        /// Framework UUID.
        framework_id: Uuid,

        #[arg(long)]
        query: Option<String>,

        /// Skill code, e.g. `PROG`.
        #[arg(long)]
        skill: Option<String>,

        #[arg(long)]
        level: Option<String>,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show database statistics.
    Stats,
}

#[derive(Subcommand)]
enum FrameworkAction {
    /// Create a framework and print its id.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        description: String,
        #[arg(long)]
        license: Option<String>,
        #[arg(long)]
        homepage_url: Option<String>,
    },
    /// List all frameworks.
    List,
    /// Show a framework with its documents.
    Show { id: Uuid },
    /// Delete a framework with all its documents, chunks and evidence.
    Delete { id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Framework { action } => {
            let store = SqliteStore::open(&cfg).await?;
            match action {
                FrameworkAction::Add {
                    name,
                    version,
                    description,
                    license,
                    homepage_url,
                } => {
                    let new = NewFramework {
                        name,
                        version,
                        description,
                        license,
                        homepage_url,
                    };
                    framework_cmd::run_add(&store, &new).await?;
                }
                FrameworkAction::List => framework_cmd::run_list(&store).await?,
                FrameworkAction::Show { id } => get::run_show(&store, id).await?,
                FrameworkAction::Delete { id } => framework_cmd::run_delete(&store, id).await?,
            }
        }
        Commands::Ingest {
            framework_id,
            path,
            title,
            bucket,
            object_key,
            collection,
            dry_run,
        } => {
            let store = SqliteStore::open(&cfg).await?;
            let opts = IngestOptions {
                title,
                bucket,
                object_key,
                collection,
                dry_run,
            };
            ingest::run_ingest(&store, &cfg, framework_id, &path, &opts).await?;
        }
        Commands::Chunks {
            framework_id,
            query,
            skill,
            level,
            limit,
        } => {
            let store = SqliteStore::open(&cfg).await?;
            let q = ChunkQuery {
                query,
                skill_code: skill,
                level,
                limit,
            };
            search::run_chunks(&store, framework_id, &q).await?;
        }
        Commands::Stats => {
            let store = SqliteStore::open(&cfg).await?;
            stats::run_stats(&store, &cfg).await?;
        }
    }

    Ok(())
}
