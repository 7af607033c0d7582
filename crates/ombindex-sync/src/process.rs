//! Per-block record extraction.

use bitcoin::{Block, Network};
use tracing::debug;

use ombindex_core::types::{BlockRecord, BulletinRecord, EndorsementRecord, IndexedBlock};
use ombindex_wire::{extract, has_magic_prefix, Extracted, Record};

/// Extract every Ombuds record in `block`, which sits at `height`.
///
/// Transactions without the magic prefix are passed over silently; ones that
/// carry it but fail to decode or have no recoverable author are logged and
/// skipped. A block with no records still yields its header.
pub fn index_block(block: &Block, height: u64, network: Network) -> IndexedBlock {
    let block_hash = block.block_hash();
    let mut indexed = IndexedBlock::empty(BlockRecord::from_header(&block.header, height));

    for tx in &block.txdata {
        if !has_magic_prefix(tx) {
            continue;
        }
        let txid = tx.compute_txid();
        match extract(tx, network) {
            Ok(Extracted {
                record: Record::Bulletin(bulletin),
                author,
            }) => indexed
                .bulletins
                .push(BulletinRecord::new(txid, block_hash, author, bulletin)),
            Ok(Extracted {
                record: Record::Endorsement(endorsement),
                author,
            }) => indexed.endorsements.push(EndorsementRecord::new(
                txid,
                block_hash,
                author,
                &endorsement,
            )),
            Err(e) => debug!(%txid, height, error = %e, "skipping transaction"),
        }
    }

    if indexed.record_count() > 0 {
        debug!(
            height,
            hash = %block_hash,
            bulletins = indexed.bulletins.len(),
            endorsements = indexed.endorsements.len(),
            "block processed"
        );
    }
    indexed
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::blockdata::constants::genesis_block;
    use bitcoin::hashes::Hash;
    use bitcoin::script::{Builder, PushBytesBuf};
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, Txid, Witness};
    use ombindex_wire::{encode_as_outputs, Bulletin, Endorsement};

    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn carrier(record: &Record, signed: bool) -> Transaction {
        let script_sig = if signed {
            Builder::new()
                .push_slice(PushBytesBuf::try_from(vec![0x30; 71]).unwrap())
                .push_slice(PushBytesBuf::try_from(hex::decode(G).unwrap()).unwrap())
                .into_script()
        } else {
            Builder::new().into_script()
        };
        Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::all_zeros(), 0),
                script_sig,
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: encode_as_outputs(record, Amount::from_sat(567)).unwrap(),
        }
    }

    #[test]
    fn picks_out_records_and_skips_the_rest() {
        let mut block = genesis_block(Network::Regtest);
        let coinbase = block.txdata[0].clone();
        let bulletin = Record::Bulletin(Bulletin::new("Hello #world", 1_451_606_700));
        let endorsed = carrier(&bulletin, true).compute_txid();
        block.txdata = vec![
            coinbase,
            carrier(&bulletin, true),
            carrier(&Record::Endorsement(Endorsement::new(endorsed, 1_451_606_800)), true),
            carrier(&bulletin, false),
        ];

        let indexed = index_block(&block, 1, Network::Bitcoin);
        assert_eq!(indexed.block.height, 1);
        assert_eq!(indexed.block.hash, block.block_hash().to_string());
        assert_eq!(indexed.bulletins.len(), 1);
        assert_eq!(indexed.bulletins[0].author, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        assert_eq!(indexed.bulletins[0].txid, endorsed.to_string());
        assert_eq!(indexed.endorsements.len(), 1);
        assert_eq!(indexed.endorsements[0].bid, endorsed.to_string());
    }

    #[test]
    fn empty_block_keeps_header() {
        let block = genesis_block(Network::Regtest);
        let indexed = index_block(&block, 0, Network::Regtest);
        assert_eq!(indexed.record_count(), 0);
        assert_eq!(indexed.block.prev_hash, block.header.prev_blockhash.to_string());
    }
}
