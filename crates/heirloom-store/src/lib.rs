//! Heirloom Store
//!
//! SQLite persistence for vaults, parties, fragments, recovery attempts,
//! attestations and outcome metrics.
//!
//! The "at most one open attempt per vault" invariant is also enforced by a
//! partial unique index, so it holds even against a writer that bypasses the
//! orchestrator.

mod schema;
mod sqlite;

pub use schema::SCHEMA_VERSION;
pub use sqlite::SqliteStore;
