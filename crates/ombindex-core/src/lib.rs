//! ombindex-core — foundation for the Ombuds record index.
//!
//! # Architecture
//!
//! ```text
//! SyncBuilder → Synchronizer
//!                   ├── BlockSource     (best height, hashes, full blocks)
//!                   ├── ReorgDetector   (short vs deep rollback)
//!                   ├── index_block     (sniff → extract → records)
//!                   └── RecordStore     (SQLite: atomic inserts, tip deletes, queries)
//! ```

pub mod config;
pub mod error;
pub mod geo;
pub mod indexer;
pub mod reorg;
pub mod store;
pub mod tags;
pub mod types;

pub use config::{PegBlock, StoreConfig};
pub use error::IndexerError;
pub use indexer::{IndexerState, SyncConfig};
pub use reorg::{ReorgDetector, ReorgEvent, ReorgType};
pub use store::RecordStore;
pub use types::{
    AuthorSummary, AuthorView, BlockRecord, BlockRef, BlockView, BulletinDetail, BulletinRecord,
    BulletinView, EndorsedBulletin, EndorsementRecord, EndorsementView, IndexedBlock, Page,
    Statistics, TagSummary,
};
