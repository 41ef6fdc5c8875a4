//! # Mnemo Store
//!
//! PostgreSQL data access for the mnemo server. One [`Store`] wraps an
//! optional connection pool; every operation fails with
//! [`StoreError::Unavailable`] when no pool is configured — there is no
//! in-memory fallback.
//!
//! Modules:
//!
//! - `memory` — memory entries (insert, lookup, substring and vector search)
//! - `tasks` — durable task queue (atomic claim, status updates, stale recovery)
//! - `records` — append-only diffs and error records
//! - `token_metrics` — governance token effectiveness accumulation
//! - `embedding` — semantic-search configuration and the mock embedder

pub mod embedding;
mod error;
pub mod memory;
pub mod records;
pub mod store;
pub mod tasks;
pub mod token_metrics;
pub mod types;

pub use error::StoreError;
pub use store::Store;

/// Embedded migrations, also used by `#[sqlx::test(migrator = ...)]`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
