//! The synchroniser: keeps a [`RecordStore`] on the source's best chain.
//!
//! # Catch-up
//! Starting from the stored tip, fetch the source block at `tip + 1`, check
//! it extends the tip, extract its records, and commit block and records as
//! one unit. Repeat until the source's best height (or `to_height`).
//!
//! # Reorg recovery
//! When the next source block does not extend the stored tip, walk back
//! comparing stored hashes with the source's until they agree. The blocks
//! above that fork point are unwound one `delete_tip` at a time for a short
//! reorg, or with a single `drop_after_height` for a deep one, and catch-up
//! resumes from the fork.
//!
//! # Live
//! Once caught up, poll every `poll_interval_ms` and repeat.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ombindex_core::error::IndexerError;
use ombindex_core::indexer::{IndexerState, SyncConfig};
use ombindex_core::reorg::{ReorgDetector, ReorgEvent, ReorgType};
use ombindex_core::store::RecordStore;
use ombindex_core::types::BlockRecord;

use crate::process::index_block;
use crate::source::BlockSource;

/// Progress reported by the synchroniser.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    BlockIndexed {
        height: u64,
        hash: String,
        bulletins: usize,
        endorsements: usize,
    },
    ReorgRecovered {
        fork_height: u64,
        depth: u64,
        reorg_type: ReorgType,
    },
    CaughtUp {
        height: u64,
    },
    Stopped {
        height: u64,
    },
}

/// Drives block ingestion from a source into a store.
pub struct Synchronizer<S: BlockSource> {
    config: SyncConfig,
    source: S,
    store: Arc<dyn RecordStore>,
    reorg_detector: ReorgDetector,
    state: IndexerState,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl<S: BlockSource> Synchronizer<S> {
    pub fn new(config: SyncConfig, source: S, store: Arc<dyn RecordStore>) -> Self {
        Self {
            reorg_detector: ReorgDetector::new(config.short_reorg_depth),
            config,
            source,
            store,
            state: IndexerState::Idle,
            events: None,
        }
    }

    /// Receive [`SyncEvent`]s on the returned channel.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver just means nobody is listening.
            let _ = tx.send(event);
        }
    }

    /// Follow the source until `to_height` is reached, or forever.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        info!(id = %self.config.id, "Starting synchroniser");

        loop {
            let tip = match self.sync_once().await {
                Ok(tip) => tip,
                Err(e) => {
                    self.state = IndexerState::Error;
                    return Err(e);
                }
            };

            if self.config.to_height.is_some_and(|to| tip.height >= to) {
                self.state = IndexerState::Stopped;
                info!(height = tip.height, "Reached target height; stopping");
                self.emit(SyncEvent::Stopped { height: tip.height });
                return Ok(());
            }

            if self.state != IndexerState::Live {
                info!(height = tip.height, "Caught up; entering live mode");
                self.emit(SyncEvent::CaughtUp { height: tip.height });
            }
            self.state = IndexerState::Live;
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Ingest every block the source has beyond the stored tip, recovering
    /// from any reorg on the way. Returns the new stored tip.
    pub async fn sync_once(&mut self) -> Result<BlockRecord, IndexerError> {
        let best = self.source.best_height().await?;
        let target = self.config.to_height.map_or(best, |to| to.min(best));
        let mut tip = self.store.current_tip().await?;

        // The stored tip may have left the best chain without anything new
        // being built on top of it yet.
        if tip.height <= best && !self.on_source_chain(&tip).await? {
            self.recover(tip.height + 1).await?;
            tip = self.store.current_tip().await?;
        }

        if tip.height < target {
            self.state = IndexerState::CatchingUp;
        }

        while tip.height < target {
            let height = tip.height + 1;
            let hash = self.source.block_hash(height).await?.ok_or_else(|| {
                IndexerError::Source(format!("source has no block at height {height}"))
            })?;
            let block = self.source.block(&hash).await?;
            let record = BlockRecord::from_header(&block.header, height);

            if self.reorg_detector.check(&record, &tip) {
                self.recover(height).await?;
                tip = self.store.current_tip().await?;
                continue;
            }

            let indexed = index_block(&block, height, self.config.network);
            self.store.insert_block_with_records(&indexed).await?;
            self.emit(SyncEvent::BlockIndexed {
                height,
                hash: indexed.block.hash.clone(),
                bulletins: indexed.bulletins.len(),
                endorsements: indexed.endorsements.len(),
            });
            tip = indexed.block;
        }

        debug!(height = tip.height, best, "sync pass complete");
        Ok(tip)
    }

    async fn on_source_chain(&self, block: &BlockRecord) -> Result<bool, IndexerError> {
        let actual = self.source.block_hash(block.height).await?;
        Ok(actual.is_some_and(|h| h.to_string() == block.hash))
    }

    /// Unwind the stored blocks that are no longer on the source's chain.
    /// `detected_at` is the height of the source block that exposed the fork.
    async fn recover(&mut self, detected_at: u64) -> Result<ReorgEvent, IndexerError> {
        self.state = IndexerState::ReorgRecovery;
        let peg_height = self.store.peg_height();
        let mut dropped = Vec::new();
        let mut height = detected_at.saturating_sub(1);

        loop {
            let stored = self.store.block_at(height).await?.ok_or_else(|| {
                IndexerError::not_found(format!("stored block at height {height}"))
            })?;
            if self.on_source_chain(&stored).await? {
                break;
            }
            if height <= peg_height {
                return Err(IndexerError::Aborted {
                    reason: format!("source chain does not contain the peg block {}", stored.hash),
                });
            }
            dropped.push(stored);
            if dropped.len() as u64 > self.config.max_reorg_depth {
                return Err(IndexerError::Aborted {
                    reason: format!(
                        "reorg deeper than {} blocks below height {detected_at}",
                        self.config.max_reorg_depth
                    ),
                });
            }
            height -= 1;
        }

        if dropped.is_empty() {
            return Err(IndexerError::Source(format!(
                "block at height {detected_at} does not extend the source's own chain"
            )));
        }

        let event = self.reorg_detector.event(detected_at, dropped);
        match event.reorg_type {
            ReorgType::ShortReorg => {
                for block in &event.dropped_blocks {
                    self.store.delete_tip(&block.hash).await?;
                }
            }
            ReorgType::DeepReorg => {
                let removed = self.store.drop_after_height(event.fork_height).await?;
                if removed != event.depth {
                    warn!(
                        removed,
                        depth = event.depth,
                        "Bulk rollback removed an unexpected number of blocks"
                    );
                }
            }
        }

        info!(
            fork_height = event.fork_height,
            depth = event.depth,
            reorg_type = %event.reorg_type,
            "Reorg recovered"
        );
        self.emit(SyncEvent::ReorgRecovered {
            fork_height: event.fork_height,
            depth: event.depth,
            reorg_type: event.reorg_type,
        });
        self.state = IndexerState::CatchingUp;
        Ok(event)
    }
}
