//! ombindex-storage — the SQLite indexing store and query engine.
//!
//! - [`sqlite`]: schema, peg seeding, atomic block ingestion, and rollback
//! - [`queries`]: bulletin, endorsement, tag, author, and page lookups
//! - [`readonly`]: caller-supplied `SELECT`s under SQLite's `query_only` mode

pub mod queries;
pub mod readonly;
pub mod sqlite;

#[cfg(test)]
mod testutil;

pub use sqlite::SqliteStorage;
