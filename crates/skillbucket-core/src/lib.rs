//! # SkillBucket Core
//!
//! Backend-independent logic for SkillBucket: the framework / document /
//! knowledge-chunk / activity / evidence data model, field validation, the
//! typed store error, the [`store::Store`] repository trait with an
//! in-memory implementation, and the paragraph chunker.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O.

pub mod chunk;
pub mod error;
pub mod models;
pub mod store;
pub mod validate;

pub use error::{StoreError, StoreResult};
