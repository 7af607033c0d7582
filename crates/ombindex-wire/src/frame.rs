//! Frame codec.
//!
//! ```text
//! | MAGIC "OMBUDS" (6) | TYPE (1) | LEN (varint) | PAYLOAD (LEN) |
//! ```
//!
//! Decoding reads exactly `LEN` payload bytes; anything after them (chunk
//! padding, typically) is ignored.

use crate::error::WireError;
use crate::record::{Record, RecordKind};
use crate::varint::{read_varint, varint_len, write_varint};

/// Prefix of every frame.
pub const MAGIC: [u8; 6] = *b"OMBUDS";

/// Upper bound on a whole frame, and on any declared payload length.
pub const MAX_FRAME_LEN: usize = 75_000;

/// Serialize a record into a complete frame.
pub fn encode(record: &Record) -> Result<Vec<u8>, WireError> {
    record.validate()?;
    let payload = record.encode_payload();

    let total = MAGIC.len() + 1 + varint_len(payload.len() as u64) + payload.len();
    if total > MAX_FRAME_LEN {
        return Err(WireError::RecordTooBig {
            size: total as u64,
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&MAGIC);
    frame.push(record.kind().as_byte());
    write_varint(&mut frame, payload.len() as u64);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Parse a frame back into a record.
pub fn decode(bytes: &[u8]) -> Result<Record, WireError> {
    let body = bytes.strip_prefix(&MAGIC).ok_or(WireError::NoMagicPrefix)?;

    let (&type_byte, rest) = body
        .split_first()
        .ok_or_else(|| WireError::malformed("frame ends before type byte"))?;
    let kind = RecordKind::from_byte(type_byte)?;

    let (len, used) = read_varint(rest)?;
    let rest = &rest[used..];
    if len > MAX_FRAME_LEN as u64 {
        return Err(WireError::RecordTooBig {
            size: len,
            max: MAX_FRAME_LEN,
        });
    }
    if len > rest.len() as u64 {
        return Err(WireError::malformed(format!(
            "payload declares {len} bytes, {} available",
            rest.len()
        )));
    }

    Record::decode_payload(kind, &rest[..len as usize])
}

/// Returns `true` if `bytes` starts with the frame magic.
pub fn has_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(&MAGIC)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
