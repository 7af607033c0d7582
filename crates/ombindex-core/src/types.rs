//! Shared types for the indexing pipeline: what gets written, and the views
//! the query engine hands back.

use std::str::FromStr;

use bitcoin::block::{Header, Version};
use bitcoin::{BlockHash, CompactTarget, TxMerkleNode, Txid};
use chrono::{DateTime, Utc};
use ombindex_wire::{Bulletin, Endorsement, Location};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::tags::parse_tags;

// ─── BlockRecord ──────────────────────────────────────────────────────────────

/// A stored block header plus its height.
///
/// Hashes are in the usual reversed-hex display form. The header fields are
/// kept so the block hash can be recomputed from the row alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: String,
    pub prev_hash: String,
    pub height: u64,
    /// Header timestamp (seconds since epoch).
    pub timestamp: i64,
    pub version: i32,
    pub merkle_root: String,
    /// Compact difficulty target.
    pub bits: u32,
    pub nonce: u32,
}

impl BlockRecord {
    pub fn from_header(header: &Header, height: u64) -> Self {
        Self {
            hash: header.block_hash().to_string(),
            prev_hash: header.prev_blockhash.to_string(),
            height,
            timestamp: header.time as i64,
            version: header.version.to_consensus(),
            merkle_root: header.merkle_root.to_string(),
            bits: header.bits.to_consensus(),
            nonce: header.nonce,
        }
    }

    /// Rebuild the consensus header from the stored fields.
    pub fn header(&self) -> Result<Header, IndexerError> {
        let bad = |field: &str, e: String| {
            IndexerError::Other(format!("block {}: bad {field}: {e}", self.hash))
        };
        Ok(Header {
            version: Version::from_consensus(self.version),
            prev_blockhash: BlockHash::from_str(&self.prev_hash)
                .map_err(|e| bad("prev_hash", e.to_string()))?,
            merkle_root: TxMerkleNode::from_str(&self.merkle_root)
                .map_err(|e| bad("merkle_root", e.to_string()))?,
            time: u32::try_from(self.timestamp).map_err(|e| bad("timestamp", e.to_string()))?,
            bits: CompactTarget::from_consensus(self.bits),
            nonce: self.nonce,
        })
    }

    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &BlockRecord) -> bool {
        self.height == parent.height + 1 && self.prev_hash == parent.hash
    }
}

/// A block identified by hash and height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub hash: String,
    pub height: u64,
}

// ─── Records ──────────────────────────────────────────────────────────────────

/// A bulletin as it is written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletinRecord {
    pub txid: String,
    pub block_hash: String,
    pub author: String,
    pub message: String,
    pub timestamp: i64,
    pub location: Option<Location>,
}

impl BulletinRecord {
    pub fn new(txid: Txid, block_hash: BlockHash, author: String, bulletin: Bulletin) -> Self {
        Self {
            txid: txid.to_string(),
            block_hash: block_hash.to_string(),
            author,
            message: bulletin.message,
            timestamp: bulletin.timestamp,
            location: bulletin.location,
        }
    }

    /// Tags carried by the message.
    pub fn tags(&self) -> Vec<String> {
        parse_tags(&self.message)
    }
}

/// An endorsement as it is written to the store.
///
/// `bid` is not checked against stored bulletins; the endorsed bulletin may
/// arrive later or never.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementRecord {
    pub txid: String,
    pub block_hash: String,
    pub bid: String,
    pub author: String,
    pub timestamp: i64,
}

impl EndorsementRecord {
    pub fn new(
        txid: Txid,
        block_hash: BlockHash,
        author: String,
        endorsement: &Endorsement,
    ) -> Self {
        Self {
            txid: txid.to_string(),
            block_hash: block_hash.to_string(),
            bid: endorsement.bid_txid().to_string(),
            author,
            timestamp: endorsement.timestamp,
        }
    }
}

/// A block and every record extracted from it: the unit of ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedBlock {
    pub block: BlockRecord,
    pub bulletins: Vec<BulletinRecord>,
    pub endorsements: Vec<EndorsementRecord>,
}

impl IndexedBlock {
    pub fn empty(block: BlockRecord) -> Self {
        Self {
            block,
            bulletins: Vec::new(),
            endorsements: Vec::new(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.bulletins.len() + self.endorsements.len()
    }
}

// ─── Views ────────────────────────────────────────────────────────────────────

/// A bulletin joined with its block and derived data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletinView {
    pub txid: String,
    pub author: String,
    /// Empty when the bulletin is censored and scrubbed.
    pub message: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub block_hash: String,
    pub block_height: u64,
    pub block_timestamp: i64,
    pub num_endorsements: u64,
    pub tags: Vec<String>,
    /// Blacklist reason, when the bulletin has been censored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub censored: Option<String>,
}

/// A bulletin together with every endorsement of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletinDetail {
    #[serde(flatten)]
    pub bulletin: BulletinView,
    pub endorsements: Vec<EndorsementView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementView {
    pub txid: String,
    pub author: String,
    pub bid: String,
    pub timestamp: i64,
    pub block_hash: String,
    pub block_height: u64,
    pub block_timestamp: i64,
    /// Whether the endorsed bulletin is currently stored.
    pub bulletin_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub address: String,
    pub num_bulletins: u64,
    pub num_endorsements: u64,
    /// Earliest block timestamp among the author's bulletins.
    pub first_block_timestamp: Option<i64>,
    /// Latest block timestamp among the author's bulletins.
    pub last_block_timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorView {
    pub summary: AuthorSummary,
    pub bulletins: Vec<BulletinView>,
    pub endorsements: Vec<EndorsementView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSummary {
    pub value: String,
    pub count: u64,
    /// Timestamp of the earliest bulletin carrying the tag.
    pub first_seen: i64,
    pub score: i64,
}

/// An endorsed id and its endorsement count. The bulletin itself may not be
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndorsedBulletin {
    pub bid: String,
    pub count: u64,
    pub bulletin: Option<BulletinView>,
}

/// Record counts for a half-open time window `(start, end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bulletins: u64,
    pub endorsements: u64,
    pub blocks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockView {
    pub hash: String,
    pub prev_hash: String,
    pub height: u64,
    pub timestamp: i64,
    pub num_bulletins: u64,
    pub num_endorsements: u64,
}

/// Records from the blocks in `(stop.height, start.height]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub start: BlockRef,
    pub stop: BlockRef,
    pub bulletins: Vec<BulletinView>,
    pub endorsements: Vec<EndorsementView>,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    fn header(prev: BlockHash, nonce: u32) -> Header {
        Header {
            version: Version::from_consensus(4),
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1_451_606_601,
            bits: CompactTarget::from_consensus(0x1d00ffff),
            nonce,
        }
    }

    #[test]
    fn header_roundtrips_through_record() {
        let h = header(BlockHash::all_zeros(), 42);
        let rec = BlockRecord::from_header(&h, 7);
        assert_eq!(rec.hash, h.block_hash().to_string());
        assert_eq!(rec.header().unwrap(), h);
        assert_eq!(rec.header().unwrap().block_hash().to_string(), rec.hash);
    }

    #[test]
    fn block_extends_parent() {
        let parent = BlockRecord::from_header(&header(BlockHash::all_zeros(), 1), 100);
        let child_header = header(BlockHash::from_str(&parent.hash).unwrap(), 2);
        let child = BlockRecord::from_header(&child_header, 101);
        assert!(child.extends(&parent));

        let orphan = BlockRecord::from_header(&header(BlockHash::all_zeros(), 3), 101);
        assert!(!orphan.extends(&parent));
    }

    #[test]
    fn bulletin_record_tags() {
        let rec = BulletinRecord::new(
            Txid::all_zeros(),
            BlockHash::all_zeros(),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH".into(),
            Bulletin::new("Hello #world", 12_345_678),
        );
        assert_eq!(rec.tags(), vec!["#world".to_string()]);
    }

    #[test]
    fn endorsement_bid_uses_display_order() {
        let bid = Txid::from_byte_array([1; 32]);
        let rec = EndorsementRecord::new(
            Txid::all_zeros(),
            BlockHash::all_zeros(),
            "addr".into(),
            &Endorsement::new(bid, 5),
        );
        assert_eq!(rec.bid, bid.to_string());
    }
}
