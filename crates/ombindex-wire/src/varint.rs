//! Bitcoin CompactSize variable-length integers.
//!
//! | value range              | encoding              |
//! |--------------------------|-----------------------|
//! | `< 0xfd`                 | 1 byte                |
//! | `<= 0xffff`              | `0xfd` + u16 LE       |
//! | `<= 0xffff_ffff`         | `0xfe` + u32 LE       |
//! | anything larger          | `0xff` + u64 LE       |
//!
//! Reads are strict: a value encoded in a wider form than necessary is
//! rejected, so every value has exactly one accepted byte string.

use crate::error::WireError;

/// Number of bytes `value` occupies when encoded.
pub fn varint_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Append the minimal encoding of `value` to `buf`.
pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => buf.push(value as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Read a varint from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn read_varint(bytes: &[u8]) -> Result<(u64, usize), WireError> {
    let (&prefix, rest) = bytes
        .split_first()
        .ok_or_else(|| WireError::malformed("varint: empty input"))?;

    let (width, min) = match prefix {
        0..=0xfc => return Ok((prefix as u64, 1)),
        0xfd => (2, 0xfd),
        0xfe => (4, 0x1_0000),
        0xff => (8, 0x1_0000_0000),
    };

    let body = rest.get(..width).ok_or_else(|| {
        WireError::malformed(format!(
            "varint: need {width} bytes after 0x{prefix:02x}, have {}",
            rest.len()
        ))
    })?;

    let mut le = [0u8; 8];
    le[..width].copy_from_slice(body);
    let value = u64::from_le_bytes(le);

    if value < min {
        return Err(WireError::malformed(format!(
            "varint: non-canonical encoding of {value}"
        )));
    }
    Ok((value, 1 + width))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encoded(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        buf
    }

    #[test]
    fn reads_known_encodings() {
        let cases: &[(&str, u64)] = &[
            ("32", 50),
            ("fd3201", 306),
            ("fdffff", 65535),
            ("feffffffff", 4_294_967_295),
            ("ffffffffffffffffff", u64::MAX),
        ];
        for (input, want) in cases {
            let bytes = hex::decode(input).unwrap();
            let (got, used) = read_varint(&bytes).unwrap();
            assert_eq!(got, *want, "input {input}");
            assert_eq!(used, bytes.len());
        }
    }

    #[test]
    fn writes_known_encodings() {
        let cases: &[(u64, &str)] = &[
            (34, "22"),
            (252, "fc"),
            (255, "fdff00"),
            (532_423, "fec71f0800"),
            (23_423_422, "febe696501"),
            (4_294_967_295, "feffffffff"),
        ];
        for (value, want) in cases {
            assert_eq!(hex::encode(encoded(*value)), *want, "value {value}");
        }
    }

    #[test]
    fn rejects_non_canonical() {
        for input in ["fd0100", "fdfc00", "fe01000000", "feffff0000", "ff0100000000000000"] {
            let bytes = hex::decode(input).unwrap();
            assert!(
                matches!(read_varint(&bytes), Err(WireError::MalformedFrame { .. })),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_short_reads() {
        for input in ["", "fd", "fd01", "fe010000", "ff01"] {
            let bytes = hex::decode(input).unwrap();
            assert!(read_varint(&bytes).is_err(), "{input} should be rejected");
        }
    }

    #[test]
    fn ignores_trailing_bytes() {
        let (value, used) = read_varint(&[0xfd, 0x32, 0x01, 0xaa, 0xbb]).unwrap();
        assert_eq!(value, 306);
        assert_eq!(used, 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        #[test]
        fn prop_roundtrip(value in any::<u64>()) {
            let buf = encoded(value);
            prop_assert_eq!(buf.len(), varint_len(value));
            prop_assert_eq!(read_varint(&buf).unwrap(), (value, buf.len()));
        }
    }
}
