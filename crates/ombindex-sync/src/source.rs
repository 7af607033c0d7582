//! Where blocks come from.
//!
//! A [`BlockSource`] answers three questions about its best chain: how tall
//! it is, which block sits at a height, and what a block contains. A node RPC
//! client, a block-file reader, or the in-memory [`MemorySource`] all fit.

use async_trait::async_trait;
use bitcoin::{Block, BlockHash};
use tokio::sync::RwLock;

use ombindex_core::error::IndexerError;

/// Trait for reading blocks from a Bitcoin-like chain.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Height of the source's best block.
    async fn best_height(&self) -> Result<u64, IndexerError>;

    /// Hash of the best-chain block at `height`, or `None` above the tip.
    async fn block_hash(&self, height: u64) -> Result<Option<BlockHash>, IndexerError>;

    /// The full block `hash`.
    async fn block(&self, hash: &BlockHash) -> Result<Block, IndexerError>;
}

/// A best chain held in memory, starting at `base_height`.
///
/// Blocks can be appended and the chain cut back, which is enough to replay
/// a recorded chain or stage a reorg.
pub struct MemorySource {
    base_height: u64,
    chain: RwLock<Vec<Block>>,
}

impl MemorySource {
    pub fn new(base: Block, base_height: u64) -> Self {
        Self {
            base_height,
            chain: RwLock::new(vec![base]),
        }
    }

    /// Append a block to the best chain.
    pub async fn push(&self, block: Block) {
        self.chain.write().await.push(block);
    }

    /// Drop every block above `height`. The base block is always kept.
    pub async fn truncate(&self, height: u64) {
        let keep = height.saturating_sub(self.base_height) as usize + 1;
        self.chain.write().await.truncate(keep.max(1));
    }
}

#[async_trait]
impl BlockSource for MemorySource {
    async fn best_height(&self) -> Result<u64, IndexerError> {
        let len = self.chain.read().await.len() as u64;
        Ok(self.base_height + len.saturating_sub(1))
    }

    async fn block_hash(&self, height: u64) -> Result<Option<BlockHash>, IndexerError> {
        let Some(offset) = height.checked_sub(self.base_height) else {
            return Ok(None);
        };
        Ok(self
            .chain
            .read()
            .await
            .get(offset as usize)
            .map(Block::block_hash))
    }

    async fn block(&self, hash: &BlockHash) -> Result<Block, IndexerError> {
        self.chain
            .read()
            .await
            .iter()
            .find(|b| b.block_hash() == *hash)
            .cloned()
            .ok_or_else(|| IndexerError::Source(format!("unknown block {hash}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::blockdata::constants::genesis_block;
    use bitcoin::Network;

    fn next(parent: &Block, nonce: u32) -> Block {
        let mut header = parent.header;
        header.prev_blockhash = parent.block_hash();
        header.nonce = nonce;
        Block {
            header,
            txdata: Vec::new(),
        }
    }

    #[tokio::test]
    async fn heights_are_offset_from_base() {
        let base = genesis_block(Network::Regtest);
        let source = MemorySource::new(base.clone(), 10);
        assert_eq!(source.best_height().await.unwrap(), 10);
        assert_eq!(source.block_hash(9).await.unwrap(), None);
        assert_eq!(source.block_hash(10).await.unwrap(), Some(base.block_hash()));

        let child = next(&base, 1);
        source.push(child.clone()).await;
        assert_eq!(source.best_height().await.unwrap(), 11);
        assert_eq!(source.block(&child.block_hash()).await.unwrap(), child);

        source.truncate(10).await;
        assert_eq!(source.best_height().await.unwrap(), 10);
        assert!(matches!(
            source.block(&child.block_hash()).await,
            Err(IndexerError::Source(_))
        ));
    }
}
