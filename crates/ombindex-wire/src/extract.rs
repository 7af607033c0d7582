//! Record extraction from arbitrary transactions.
//!
//! A record-bearing transaction may carry trailing change outputs in any
//! script form, so the extractor tries successively shorter prefixes of the
//! output list until one of them reassembles into a valid frame.

use bitcoin::script::Instruction;
use bitcoin::{Address, Network, PublicKey, Transaction};

use crate::chunk::{has_magic_prefix, join_outputs};
use crate::error::WireError;
use crate::frame;
use crate::record::Record;

/// A record together with the address that signed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub record: Record,
    /// P2PKH address of the first input's public key.
    pub author: String,
}

/// Pull a record and its author out of `tx`.
pub fn extract(tx: &Transaction, network: Network) -> Result<Extracted, WireError> {
    if !has_magic_prefix(tx) || tx.output.len() < 2 {
        return Err(WireError::NoMagicPrefix);
    }

    let record = decode_windows(tx)?;
    let author = recover_author(tx, network)?;
    Ok(Extracted { record, author })
}

/// Try output windows `[..n]`, `[..n-1]`, ..., `[..2]`; the first window that
/// reassembles and decodes wins.
///
/// A window whose payload parses but violates a record invariant ends the
/// search with that error: a shorter window of the same frame cannot fix it.
fn decode_windows(tx: &Transaction) -> Result<Record, WireError> {
    let outputs = &tx.output;
    (2..=outputs.len())
        .rev()
        .find_map(|end| {
            let bytes = join_outputs(&outputs[..end]).ok()?;
            match frame::decode(&bytes) {
                Ok(record) => Some(Ok(record)),
                Err(e @ WireError::InvalidRecord { .. }) => Some(Err(e)),
                Err(_) => None,
            }
        })
        .unwrap_or(Err(WireError::ExtractionExhausted {
            outputs: outputs.len(),
        }))
}

/// Derive the author's P2PKH address from the first input's
/// `<signature> <pubkey>` unlocking script.
pub fn recover_author(tx: &Transaction, network: Network) -> Result<String, WireError> {
    let unrecoverable = |reason: &str| WireError::AuthorUnrecoverable {
        reason: reason.to_string(),
    };

    let input = tx.input.first().ok_or_else(|| unrecoverable("no inputs"))?;

    let mut pushes = Vec::with_capacity(2);
    for ins in input.script_sig.instructions() {
        match ins {
            Ok(Instruction::PushBytes(bytes)) => pushes.push(bytes.as_bytes()),
            Ok(Instruction::Op(_)) => return Err(unrecoverable("script_sig contains opcodes")),
            Err(_) => return Err(unrecoverable("script_sig does not parse")),
        }
    }
    let [_sig, pubkey] = pushes.as_slice() else {
        return Err(unrecoverable("script_sig is not <sig> <pubkey>"));
    };

    let pubkey = PublicKey::from_slice(pubkey)
        .map_err(|e| unrecoverable(&format!("bad public key: {e}")))?;
    Ok(Address::p2pkh(pubkey.pubkey_hash(), network).to_string())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
