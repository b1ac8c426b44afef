//! # SkillBucket
//!
//! Storage for skills frameworks (such as SFIA), the documents that define
//! them, the knowledge chunks extracted from those documents, user
//! activities, and the evidence linking an activity to a framework skill.
//!
//! The data model, validation, chunker and [`Store`] trait live in
//! `skillbucket-core`; this crate adds the SQLite backend, document
//! ingestion, the HTTP API and the `skillbucket` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ PDF / DOCX │──▶│ extract +    │──▶│ SQLite           │
//! │ / text     │   │ chunk        │   │ FK cascades, FTS5│
//! └────────────┘   └──────────────┘   └────────┬─────────┘
//!                                              │ Store
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                   ┌──────────┐         ┌──────────┐
//!                   │   CLI    │         │   HTTP   │
//!                   └──────────┘         └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite [`Store`] backend |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`ingest`] | Document → chunks pipeline |
//! | [`search`] | Chunk listing and keyword search |
//! | [`framework_cmd`] | Framework CLI commands |
//! | [`get`] | Framework overview |
//! | [`stats`] | Database statistics |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing subscriber setup |
//!
//! [`Store`]: skillbucket_core::store::Store

pub mod config;
pub mod db;
pub mod extract;
pub mod framework_cmd;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;
