//! ombindex-sync — turns blocks from a [`BlockSource`] into stored records.
//!
//! - [`process`]: per-block extraction (sniff → extract → records)
//! - [`source`]: the block source seam and an in-memory chain
//! - [`sync_loop`]: the synchroniser, with short and deep reorg recovery
//! - [`builder`]: fluent configuration

pub mod builder;
pub mod process;
pub mod source;
pub mod sync_loop;

pub use builder::SyncBuilder;
pub use process::index_block;
pub use source::{BlockSource, MemorySource};
pub use sync_loop::{SyncEvent, Synchronizer};
