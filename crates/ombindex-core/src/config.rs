//! Store configuration and the peg block.
//!
//! The index never looks below its peg block: the peg is seeded into an empty
//! store and every later block must chain back to it.

use bitcoin::block::Header;
use bitcoin::blockdata::constants::genesis_block;
use bitcoin::{consensus, Network};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::BlockRecord;

/// Hash of the first mainnet block of 2016, where Ombuds indexing starts.
pub const MAINNET_PEG_HASH: &str =
    "0000000000000000036f69604b2f9074571814702400dbb5d5cf6a78fd1dad40";
pub const MAINNET_PEG_HEIGHT: u64 = 391_182;

/// Hash of the testnet3 peg block.
pub const TESTNET_PEG_HASH: &str =
    "00000000002251dfc4286569caff12b36c8aeff081498364910c50c28bda1d02";

/// Default cap on rows returned by list queries.
pub const DEFAULT_MAX_QUERY_LIMIT: u32 = 10_000;

// ─── PegBlock ─────────────────────────────────────────────────────────────────

/// The pre-seeded starting block: a raw 80-byte header and its height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PegBlock {
    pub height: u64,
    /// Consensus-serialized header, hex encoded.
    pub raw_header: String,
}

impl PegBlock {
    pub fn from_header(header: &Header, height: u64) -> Self {
        Self {
            height,
            raw_header: hex::encode(consensus::serialize(header)),
        }
    }

    /// Peg on the genesis block of `network`, at height 0.
    pub fn genesis(network: Network) -> Self {
        Self::from_header(&genesis_block(network).header, 0)
    }

    pub fn header(&self) -> Result<Header, IndexerError> {
        let bytes = hex::decode(&self.raw_header)
            .map_err(|e| IndexerError::Config(format!("peg header is not hex: {e}")))?;
        consensus::deserialize(&bytes)
            .map_err(|e| IndexerError::Config(format!("peg header does not decode: {e}")))
    }

    pub fn record(&self) -> Result<BlockRecord, IndexerError> {
        Ok(BlockRecord::from_header(&self.header()?, self.height))
    }
}

// ─── StoreConfig ──────────────────────────────────────────────────────────────

/// Configuration for an indexing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Network whose address format authors are rendered in.
    pub network: Network,
    pub peg: PegBlock,
    /// Upper bound on rows returned by list queries.
    #[serde(default = "default_max_query_limit")]
    pub max_query_limit: u32,
    /// When `true`, looking up a blacklisted bulletin fails with `Censored`.
    /// Otherwise the bulletin is returned with its message scrubbed.
    #[serde(default)]
    pub withhold_censored: bool,
}

fn default_max_query_limit() -> u32 {
    DEFAULT_MAX_QUERY_LIMIT
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::for_network(Network::Regtest, PegBlock::genesis(Network::Regtest))
    }
}

impl StoreConfig {
    pub fn for_network(network: Network, peg: PegBlock) -> Self {
        Self {
            network,
            peg,
            max_query_limit: DEFAULT_MAX_QUERY_LIMIT,
            withhold_censored: false,
        }
    }

    /// Check the peg decodes and, on the public networks, that it is the
    /// well-known peg block.
    pub fn validate(&self) -> Result<BlockRecord, IndexerError> {
        let peg = self.peg.record()?;
        let expected = match self.network {
            Network::Bitcoin => Some((MAINNET_PEG_HASH, Some(MAINNET_PEG_HEIGHT))),
            Network::Testnet => Some((TESTNET_PEG_HASH, None)),
            _ => None,
        };
        if let Some((hash, height)) = expected {
            if peg.hash != hash {
                return Err(IndexerError::Config(format!(
                    "peg {} is not the {} peg {hash}",
                    peg.hash, self.network
                )));
            }
            if height.is_some_and(|h| h != peg.height) {
                return Err(IndexerError::Config(format!(
                    "peg height {} does not match {}",
                    peg.height, MAINNET_PEG_HEIGHT
                )));
            }
        }
        if self.max_query_limit == 0 {
            return Err(IndexerError::Config("max_query_limit must be positive".into()));
        }
        Ok(peg)
    }
}
