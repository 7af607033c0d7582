//! Mapping between frames and standard-looking payment outputs.
//!
//! A frame is cut into 20-byte chunks (the last one zero-padded) and each
//! chunk becomes the "public key hash" of a P2PKH output, so a record-bearing
//! transaction looks like a payment to many addresses.

use bitcoin::hashes::Hash;
use bitcoin::script::Instruction;
use bitcoin::{Amount, PubkeyHash, Script, ScriptBuf, Transaction, TxOut};

use crate::error::WireError;
use crate::frame::{self, MAGIC};
use crate::record::Record;

/// Bytes carried by a single output.
pub const CHUNK_LEN: usize = 20;

/// Number of outputs needed to carry `frame_len` bytes.
pub fn outputs_needed(frame_len: usize) -> usize {
    frame_len.div_ceil(CHUNK_LEN)
}

/// Cut a frame into P2PKH outputs, each carrying `dust`.
pub fn to_outputs(frame: &[u8], dust: Amount) -> Vec<TxOut> {
    frame
        .chunks(CHUNK_LEN)
        .map(|chunk| {
            let mut hash = [0u8; CHUNK_LEN];
            hash[..chunk.len()].copy_from_slice(chunk);
            TxOut {
                value: dust,
                script_pubkey: ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)),
            }
        })
        .collect()
}

/// Frame a record and cut it into outputs in one step.
pub fn encode_as_outputs(record: &Record, dust: Amount) -> Result<Vec<TxOut>, WireError> {
    Ok(to_outputs(&frame::encode(record)?, dust))
}

/// Reassemble a frame from outputs, stripping the trailing zero padding.
///
/// Every data push in every output must be exactly one chunk long.
pub fn from_outputs(outputs: &[TxOut]) -> Result<Vec<u8>, WireError> {
    let mut data = join_outputs(outputs)?;
    let keep = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    data.truncate(keep);
    Ok(data)
}

/// Concatenate the pushes of `outputs` without touching the padding.
///
/// The frame header records the payload length, so decoding from the
/// unstripped bytes keeps payloads that legitimately end in zero bytes.
pub(crate) fn join_outputs(outputs: &[TxOut]) -> Result<Vec<u8>, WireError> {
    let mut data = Vec::with_capacity(outputs.len() * CHUNK_LEN);
    for (index, out) in outputs.iter().enumerate() {
        for push in pushes(&out.script_pubkey) {
            let push = push.map_err(|e| {
                WireError::malformed(format!("output {index}: unparseable script: {e}"))
            })?;
            if push.len() != CHUNK_LEN {
                return Err(WireError::malformed(format!(
                    "output {index}: pushed {} bytes, expected {CHUNK_LEN}",
                    push.len()
                )));
            }
            data.extend_from_slice(push);
        }
    }
    Ok(data)
}

/// Returns `true` if the first push of the first output starts with the
/// frame magic. Nothing beyond that push is inspected.
pub fn has_magic_prefix(tx: &Transaction) -> bool {
    tx.output
        .first()
        .and_then(|out| pushes(&out.script_pubkey).next())
        .and_then(Result::ok)
        .is_some_and(|push| push.len() > MAGIC.len() && frame::has_magic(push))
}

/// Data pushes of a script, skipping non-push opcodes.
fn pushes(script: &Script) -> impl Iterator<Item = Result<&[u8], bitcoin::script::Error>> + '_ {
    script.instructions().filter_map(|ins| match ins {
        Ok(Instruction::PushBytes(bytes)) => Some(Ok(bytes.as_bytes())),
        Ok(Instruction::Op(_)) => None,
        Err(e) => Some(Err(e)),
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Bulletin;
    use bitcoin::absolute::LockTime;
    use bitcoin::opcodes::all::OP_RETURN;
    use bitcoin::script::{Builder, PushBytesBuf};
    use bitcoin::transaction::Version;
    use proptest::prelude::*;

    const DUST: Amount = Amount::from_sat(567);

    fn op_return(data: &[u8]) -> ScriptBuf {
        Builder::new()
            .push_opcode(OP_RETURN)
            .push_slice(PushBytesBuf::try_from(data.to_vec()).unwrap())
            .into_script()
    }

    fn tx_with(outputs: Vec<TxOut>) -> Transaction {
        Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: outputs,
        }
    }

    #[test]
    fn output_count_and_padding() {
        let frame: Vec<u8> = (1..=41).collect();
        let outs = to_outputs(&frame, DUST);
        assert_eq!(outs.len(), outputs_needed(41));
        assert_eq!(outs.len(), 3);
        assert!(outs.iter().all(|o| o.value == DUST && o.script_pubkey.is_p2pkh()));

        let joined = join_outputs(&outs).unwrap();
        assert_eq!(joined.len(), 60);
        assert_eq!(&joined[41..], &[0u8; 19]);
        assert_eq!(from_outputs(&outs).unwrap(), frame);
    }

    #[test]
    fn wrong_push_length_is_malformed() {
        let mut outs = to_outputs(&[0x11; 40], DUST);
        outs.push(TxOut {
            value: DUST,
            script_pubkey: op_return(&[0x22; 12]),
        });
        assert!(matches!(from_outputs(&outs), Err(WireError::MalformedFrame { .. })));
    }

    #[test]
    fn sniff_matches_first_output_only() {
        let record = Record::from(Bulletin::new("sniff", 1));
        let outs = encode_as_outputs(&record, DUST).unwrap();
        assert!(has_magic_prefix(&tx_with(outs.clone())));

        let mut shifted = vec![TxOut {
            value: DUST,
            script_pubkey: ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([7; 20])),
        }];
        shifted.extend(outs);
        assert!(!has_magic_prefix(&tx_with(shifted)));
        assert!(!has_magic_prefix(&tx_with(vec![])));
    }

    #[test]
    fn sniff_requires_bytes_after_magic() {
        let out = TxOut {
            value: DUST,
            script_pubkey: op_return(&MAGIC),
        };
        assert!(!has_magic_prefix(&tx_with(vec![out])));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn prop_chunk_roundtrip(
            mut frame in proptest::collection::vec(any::<u8>(), 1..400),
            last in 1u8..=255,
        ) {
            frame.push(last);
            let outs = to_outputs(&frame, DUST);
            prop_assert_eq!(outs.len(), outputs_needed(frame.len()));
            prop_assert_eq!(from_outputs(&outs).unwrap(), frame);
        }
    }
}
