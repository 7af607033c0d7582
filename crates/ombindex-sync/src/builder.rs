//! Fluent builder API for creating synchronisers.
//!
//! # Example
//!
//! ```rust,no_run
//! use bitcoin::Network;
//! use ombindex_sync::SyncBuilder;
//!
//! let config = SyncBuilder::new()
//!     .id("mainnet")
//!     .network(Network::Bitcoin)
//!     .short_reorg_depth(6)
//!     .poll_interval_ms(60_000)
//!     .build_config();
//! ```

use std::sync::Arc;

use bitcoin::Network;
use ombindex_core::error::IndexerError;
use ombindex_core::indexer::SyncConfig;
use ombindex_core::store::RecordStore;

use crate::source::BlockSource;
use crate::sync_loop::Synchronizer;

/// Fluent builder for `SyncConfig`.
#[derive(Default)]
pub struct SyncBuilder {
    config: SyncConfig,
    network: Option<Network>,
}

impl SyncBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
            network: None,
        }
    }

    /// Set the synchroniser ID (used in logs).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the network, which decides how authors are rendered.
    ///
    /// Left unset, [`build`](Self::build) takes the store's network.
    pub fn network(mut self, network: Network) -> Self {
        self.config.network = network;
        self.network = Some(network);
        self
    }

    /// Stop once this height is stored.
    pub fn to_height(mut self, height: u64) -> Self {
        self.config.to_height = Some(height);
        self
    }

    /// Reorgs up to this depth are unwound tip by tip.
    pub fn short_reorg_depth(mut self, depth: u64) -> Self {
        self.config.short_reorg_depth = depth;
        self
    }

    /// Give up on reorgs deeper than this.
    pub fn max_reorg_depth(mut self, depth: u64) -> Self {
        self.config.max_reorg_depth = depth;
        self
    }

    /// Set live mode polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Build the `SyncConfig`.
    pub fn build_config(self) -> SyncConfig {
        self.config
    }

    /// Build a synchroniser reading from `source` and writing to `store`.
    ///
    /// Fails if an explicitly set network disagrees with the store's.
    pub fn build<S: BlockSource>(
        mut self,
        source: S,
        store: Arc<dyn RecordStore>,
    ) -> Result<Synchronizer<S>, IndexerError> {
        let store_network = store.network();
        match self.network {
            Some(network) if network != store_network => {
                return Err(IndexerError::Config(format!(
                    "sync network {network} does not match store network {store_network}"
                )));
            }
            Some(_) => {}
            None => self.config.network = store_network,
        }
        Ok(Synchronizer::new(self.config, source, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = SyncBuilder::new().build_config();
        assert_eq!(cfg.network, Network::Bitcoin);
        assert_eq!(cfg.short_reorg_depth, 3);
        assert_eq!(cfg.poll_interval_ms, 30_000);
        assert!(cfg.to_height.is_none());
    }

    #[test]
    fn builder_custom() {
        let cfg = SyncBuilder::new()
            .id("regtest")
            .network(Network::Regtest)
            .to_height(500)
            .short_reorg_depth(1)
            .max_reorg_depth(10)
            .build_config();

        assert_eq!(cfg.id, "regtest");
        assert_eq!(cfg.network, Network::Regtest);
        assert_eq!(cfg.to_height, Some(500));
        assert_eq!(cfg.short_reorg_depth, 1);
        assert_eq!(cfg.max_reorg_depth, 10);
    }
}
