//! Error types for the wire codec and record extraction.

use thiserror::Error;

/// Errors produced while encoding, decoding, or extracting records.
///
/// Every variant is local to a single transaction: callers indexing a block
/// skip the offending transaction and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("Record too big: {size} bytes exceeds limit of {max}")]
    RecordTooBig { size: u64, max: usize },

    #[error("Unknown wire type 0x{0:02x}")]
    BadWireType(u8),

    #[error("Invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("Transaction does not carry the record magic prefix")]
    NoMagicPrefix,

    #[error("Author could not be recovered: {reason}")]
    AuthorUnrecoverable { reason: String },

    #[error("No output window of {outputs} outputs decodes to a record")]
    ExtractionExhausted { outputs: usize },
}

impl WireError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }
}
