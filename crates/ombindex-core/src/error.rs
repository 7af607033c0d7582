//! Error types for the ombindex pipeline.

use ombindex_wire::WireError;
use thiserror::Error;

/// Errors that can occur while indexing or querying records.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Block {hash} references unknown parent {prev_hash}")]
    UnknownParent { hash: String, prev_hash: String },

    #[error("Height mismatch: expected {expected}, got {got}")]
    HeightMismatch { expected: u64, got: u64 },

    #[error("Block {hash} at height {height} collides with a stored block")]
    DuplicateBlock { hash: String, height: u64 },

    #[error("Block {hash} is not the chain tip")]
    NotTip { hash: String },

    #[error("Refusing to remove the peg block {hash}")]
    PegProtected { hash: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Bulletin {txid} is withheld: {reason}")]
    Censored { txid: String, reason: String },

    #[error("Statement rejected as not read-only: {reason}")]
    NotReadOnly { reason: String },

    #[error("Block source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the caller asked for something the chain state
    /// doesn't allow. Retrying the same request will fail the same way.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownParent { .. }
                | Self::HeightMismatch { .. }
                | Self::DuplicateBlock { .. }
                | Self::NotTip { .. }
                | Self::PegProtected { .. }
                | Self::NotReadOnly { .. }
        )
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let tip = IndexerError::NotTip { hash: "00ab".into() };
        assert!(tip.is_caller_error());
        assert!(!IndexerError::Aborted { reason: "too deep".into() }.is_caller_error());
        assert!(!IndexerError::Storage("disk".into()).is_caller_error());
    }

    #[test]
    fn wire_errors_convert() {
        let err: IndexerError = WireError::NoMagicPrefix.into();
        assert!(matches!(err, IndexerError::Wire(WireError::NoMagicPrefix)));
    }
}
