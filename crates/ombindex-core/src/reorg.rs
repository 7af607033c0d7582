//! Reorg detection and classification.
//!
//! A reorg shows up as a source block that does not extend the stored tip.
//! The synchroniser walks back to the fork point and hands the blocks it had
//! to abandon to [`ReorgDetector::event`], which decides how to unwind them:
//!
//! 1. **Short reorg**: unwound one tip at a time, each delete re-checking the
//!    tip invariant.
//! 2. **Deep reorg**: everything above the fork height is dropped in bulk.

use crate::types::BlockRecord;

/// Describes a detected chain reorganization.
#[derive(Debug, Clone)]
pub struct ReorgEvent {
    /// Height of the source block that failed to extend the tip.
    pub detected_at: u64,
    /// Highest height both chains agree on.
    pub fork_height: u64,
    /// The blocks to roll back, most recent first.
    pub dropped_blocks: Vec<BlockRecord>,
    /// Number of blocks rolled back.
    pub depth: u64,
    pub reorg_type: ReorgType,
}

/// Classification of the reorg type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorgType {
    ShortReorg,
    DeepReorg,
}

impl std::fmt::Display for ReorgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortReorg => write!(f, "short reorg"),
            Self::DeepReorg => write!(f, "deep reorg"),
        }
    }
}

/// Detects and classifies chain reorganizations.
pub struct ReorgDetector {
    short_reorg_depth: u64,
}

impl ReorgDetector {
    pub fn new(short_reorg_depth: u64) -> Self {
        Self { short_reorg_depth }
    }

    /// Returns `true` if `new_block` does not extend `head`.
    pub fn check(&self, new_block: &BlockRecord, head: &BlockRecord) -> bool {
        if new_block.extends(head) {
            return false;
        }
        tracing::warn!(
            height = new_block.height,
            prev_hash = %new_block.prev_hash,
            tip = %head.hash,
            "Source block does not extend the stored tip"
        );
        true
    }

    pub fn classify(&self, depth: u64) -> ReorgType {
        if depth <= self.short_reorg_depth {
            ReorgType::ShortReorg
        } else {
            ReorgType::DeepReorg
        }
    }

    /// Build the event for `dropped` (most recent first).
    pub fn event(&self, detected_at: u64, dropped_blocks: Vec<BlockRecord>) -> ReorgEvent {
        let depth = dropped_blocks.len() as u64;
        let fork_height = dropped_blocks
            .last()
            .map_or(detected_at.saturating_sub(1), |b| b.height.saturating_sub(1));
        let reorg_type = self.classify(depth);
        tracing::warn!(depth, fork_height, reorg_type = %reorg_type, "Reorg detected");
        ReorgEvent {
            detected_at,
            fork_height,
            dropped_blocks,
            depth,
            reorg_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(height: u64, hash: &str, prev: &str) -> BlockRecord {
        BlockRecord {
            hash: hash.into(),
            prev_hash: prev.into(),
            height,
            timestamp: (height * 600) as i64,
            version: 4,
            merkle_root: "00".into(),
            bits: 0x1d00ffff,
            nonce: 0,
        }
    }

    #[test]
    fn no_reorg_on_normal_chain() {
        let det = ReorgDetector::new(3);
        let head = b(100, "a", "0");
        assert!(!det.check(&b(101, "b", "a"), &head));
    }

    #[test]
    fn detects_fork() {
        let det = ReorgDetector::new(3);
        let head = b(100, "a", "99");
        assert!(det.check(&b(101, "c", "a2"), &head));
    }

    #[test]
    fn classifies_by_depth() {
        let det = ReorgDetector::new(3);
        let dropped = vec![b(102, "x", "w"), b(101, "w", "v"), b(100, "v", "u")];
        let event = det.event(103, dropped);
        assert_eq!(event.depth, 3);
        assert_eq!(event.fork_height, 99);
        assert_eq!(event.reorg_type, ReorgType::ShortReorg);

        let deep: Vec<_> = (0..5).rev().map(|i| b(200 + i, "h", "p")).collect();
        let event = det.event(205, deep);
        assert_eq!(event.fork_height, 199);
        assert_eq!(event.reorg_type, ReorgType::DeepReorg);
    }
}
