//! The write-side contract the synchroniser drives.

use async_trait::async_trait;
use bitcoin::Network;

use crate::error::IndexerError;
use crate::types::{BlockRecord, IndexedBlock};

/// A chain-consistent record store.
///
/// Implementations must keep a single gapless chain rooted at the peg block
/// and apply every method atomically.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// The block with the greatest height. The peg block on a fresh store.
    async fn current_tip(&self) -> Result<BlockRecord, IndexerError>;

    /// The stored block at `height`, if any.
    async fn block_at(&self, height: u64) -> Result<Option<BlockRecord>, IndexerError>;

    /// Insert a block header and all its records as one unit.
    async fn insert_block_with_records(&self, block: &IndexedBlock) -> Result<(), IndexerError>;

    /// Remove the tip block and everything it contains.
    async fn delete_tip(&self, hash: &str) -> Result<(), IndexerError>;

    /// Remove every block above `height`. Returns the number removed.
    async fn drop_after_height(&self, height: u64) -> Result<u64, IndexerError>;

    /// Height of the peg block; nothing at or below it is ever removed.
    fn peg_height(&self) -> u64;

    /// Network the stored chain belongs to.
    fn network(&self) -> Network;
}
