//! Fixtures shared by the in-crate tests.

use std::str::FromStr;

use bitcoin::block::{Header, Version};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, CompactTarget, TxMerkleNode};
use ombindex_core::types::{BlockRecord, BulletinRecord, EndorsementRecord};
use ombindex_wire::Location;

pub const AUTHOR: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";

/// A block at `height` whose parent is `parent_hash`. `nonce` tells siblings
/// apart.
pub fn block_on(parent_hash: &str, height: u64, nonce: u32) -> BlockRecord {
    let header = Header {
        version: Version::from_consensus(4),
        prev_blockhash: BlockHash::from_str(parent_hash).unwrap(),
        merkle_root: TxMerkleNode::all_zeros(),
        time: 1_451_606_601 + height as u32 * 600,
        bits: CompactTarget::from_consensus(0x207fffff),
        nonce,
    };
    BlockRecord::from_header(&header, height)
}

pub fn bulletin(txid: &str, block: &str, message: &str) -> BulletinRecord {
    BulletinRecord {
        txid: txid.into(),
        block_hash: block.into(),
        author: AUTHOR.into(),
        message: message.into(),
        timestamp: 1_451_606_601,
        location: None,
    }
}

pub fn located(txid: &str, block: &str, lat: f64, lon: f64) -> BulletinRecord {
    BulletinRecord {
        location: Some(Location {
            lat,
            lon,
            altitude: 0.0,
        }),
        ..bulletin(txid, block, "here")
    }
}

pub fn endorsement(txid: &str, block: &str, bid: &str) -> EndorsementRecord {
    EndorsementRecord {
        txid: txid.into(),
        block_hash: block.into(),
        bid: bid.into(),
        author: AUTHOR.into(),
        timestamp: 1_451_606_700,
    }
}
