//! Synchroniser configuration and state types.

use bitcoin::Network;
use serde::{Deserialize, Serialize};

/// Configuration for a chain synchroniser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Name used in logs.
    pub id: String,
    /// Network the block source serves; decides the author address format.
    pub network: Network,
    /// Stop after this height. `None` = follow the chain forever.
    pub to_height: Option<u64>,
    /// Reorgs up to this many blocks deep are unwound one tip at a time;
    /// deeper ones are dropped in bulk.
    pub short_reorg_depth: u64,
    /// Deepest reorg the synchroniser will unwind before giving up.
    pub max_reorg_depth: u64,
    /// Polling interval once caught up (milliseconds).
    pub poll_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            network: Network::Bitcoin,
            to_height: None,
            short_reorg_depth: 3,
            max_reorg_depth: 100,
            poll_interval_ms: 30_000,
        }
    }
}

/// Runtime state of the synchroniser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Ingesting blocks up to the source's best height.
    CatchingUp,
    /// Caught up; polling for new blocks.
    Live,
    /// Unwinding blocks that left the best chain.
    ReorgRecovery,
    /// Terminated.
    Stopped,
    /// Encountered an unrecoverable error.
    Error,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::CatchingUp => write!(f, "catching-up"),
            Self::Live => write!(f, "live"),
            Self::ReorgRecovery => write!(f, "reorg-recovery"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}
