//! ANS-104 bundle header codec (the concatenation-of-items framing a
//! [`crate::parser`]'d data item lives inside of).
//!
//! ```text
//! bundle := count(32B LE) || (size(32B LE) || id(32B))*N || item*N
//! ```

use crate::error::ParseError;

const COUNT_FIELD_LEN: usize = 32;
const ENTRY_LEN: usize = 64;

fn read_u256_le_as_u64(bytes: &[u8], field: &'static str) -> Result<u64, ParseError> {
    if bytes.len() != 32 {
        return Err(ParseError::UnexpectedEof {
            field,
            wanted: 32,
            got: bytes.len(),
        });
    }
    if bytes[8..].iter().any(|&b| b != 0) {
        return Err(ParseError::InvalidTagEncoding(format!(
            "{field} exceeds u64 range"
        )));
    }
    Ok(u64::from_le_bytes(bytes[..8].try_into().unwrap()))
}

fn write_u256_le(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
    out.extend(std::iter::repeat_n(0u8, 24));
}

/// One entry in a parsed bundle header: a member data item's id, its raw
/// byte size, and the offset (from the start of the bundle) at which its
/// bytes begin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleItemEntry {
    pub id: [u8; 32],
    pub size: u64,
    pub data_offset: u64,
}

/// The parsed form of a bundle's header: item count plus per-item
/// `(id, size, dataOffset)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHeaderInfo {
    pub num_items: u64,
    pub entries: Vec<BundleItemEntry>,
}

impl BundleHeaderInfo {
    /// Total byte length of the header itself (before any item bytes).
    pub fn header_len(&self) -> u64 {
        COUNT_FIELD_LEN as u64 + ENTRY_LEN as u64 * self.num_items
    }

    /// `32 + 64N + sum(size_i)`, the total byte length of the bundle.
    pub fn total_size(&self) -> u64 {
        self.header_len() + self.entries.iter().map(|e| e.size).sum::<u64>()
    }
}

/// Parses a bundle header from its first `32 + 64N` bytes. Returns the
/// header plus the number of bytes consumed so the caller can slice off
/// the remaining item payload bytes.
pub fn parse_bundle_header_info(bytes: &[u8]) -> Result<(BundleHeaderInfo, usize), ParseError> {
    if bytes.len() < COUNT_FIELD_LEN {
        return Err(ParseError::UnexpectedEof {
            field: "numDataItems",
            wanted: COUNT_FIELD_LEN,
            got: bytes.len(),
        });
    }
    let num_items = read_u256_le_as_u64(&bytes[..COUNT_FIELD_LEN], "numDataItems")?;
    let entries_len = ENTRY_LEN * num_items as usize;
    let entries_end = COUNT_FIELD_LEN + entries_len;
    if bytes.len() < entries_end {
        return Err(ParseError::UnexpectedEof {
            field: "bundleEntries",
            wanted: entries_len,
            got: bytes.len() - COUNT_FIELD_LEN,
        });
    }

    let mut entries = Vec::with_capacity(num_items as usize);
    let mut data_offset = entries_end as u64;
    for i in 0..num_items as usize {
        let start = COUNT_FIELD_LEN + i * ENTRY_LEN;
        let size = read_u256_le_as_u64(&bytes[start..start + 32], "entrySize")?;
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes[start + 32..start + 64]);
        entries.push(BundleItemEntry {
            id,
            size,
            data_offset,
        });
        data_offset += size;
    }

    Ok((
        BundleHeaderInfo {
            num_items,
            entries,
        },
        entries_end,
    ))
}

/// Serializes a bundle header back to its wire form (the inverse of
/// [`parse_bundle_header_info`]), needed both to construct bundles and to
/// satisfy the round-trip law over parse/serialize.
pub fn write_bundle_header(entries: &[(u64, [u8; 32])]) -> Vec<u8> {
    let mut out = Vec::with_capacity(COUNT_FIELD_LEN + ENTRY_LEN * entries.len());
    write_u256_le(&mut out, entries.len() as u64);
    for (size, id) in entries {
        write_u256_le(&mut out, *size);
        out.extend_from_slice(id);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_scenario_two_items() {
        let id1 = [0x01u8; 32];
        let id2 = [0x02u8; 32];
        let mut bytes = write_bundle_header(&[(4, id1), (3, id2)]);
        bytes.extend_from_slice(b"ABCD");
        bytes.extend_from_slice(b"XYZ");

        let (info, consumed) = parse_bundle_header_info(&bytes).unwrap();
        assert_eq!(info.num_items, 2);
        assert_eq!(info.entries[0].size, 4);
        assert_eq!(info.entries[0].data_offset, 160);
        assert_eq!(info.entries[1].size, 3);
        assert_eq!(info.entries[1].data_offset, 164);
        assert_eq!(&bytes[consumed..], b"ABCDXYZ");
    }

    #[test]
    fn total_size_matches_law() {
        let (info, _) = parse_bundle_header_info(&write_bundle_header(&[
            (100, [1; 32]),
            (200, [2; 32]),
            (150, [3; 32]),
        ]))
        .unwrap();
        assert_eq!(info.total_size(), 32 + 64 * 3 + 450);
    }

    #[test]
    fn truncated_header_rejected() {
        let bytes = write_bundle_header(&[(4, [1; 32])]);
        assert!(parse_bundle_header_info(&bytes[..40]).is_err());
    }
}
