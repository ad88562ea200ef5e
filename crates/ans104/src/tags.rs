//! Avro-packed tag array encode/decode, per the ANS-104 `tagsBytes` field:
//! a zig-zag-varint-length-prefixed Avro array of `{name: string, value:
//! string}` records, terminated by a zero-length block.

use crate::error::ParseError;

/// A single header tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// Maximum number of tags permitted on a data item.
pub const MAX_TAGS: usize = 128;
/// Maximum byte length of a tag name.
pub const MAX_TAG_NAME_LEN: usize = 1024;
/// Maximum byte length of a tag value.
pub const MAX_TAG_VALUE_LEN: usize = 3072;

fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

fn write_varint(out: &mut Vec<u8>, mut n: u64) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64, ParseError> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes.get(*pos).ok_or_else(|| {
            ParseError::InvalidTagEncoding("truncated varint".to_string())
        })?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 63 {
            return Err(ParseError::InvalidTagEncoding("varint too long".to_string()));
        }
    }
    Ok(result)
}

fn write_long(out: &mut Vec<u8>, n: i64) {
    write_varint(out, zigzag_encode(n));
}

fn read_long(bytes: &[u8], pos: &mut usize) -> Result<i64, ParseError> {
    Ok(zigzag_decode(read_varint(bytes, pos)?))
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_long(out, s.len() as i64);
    out.extend_from_slice(s.as_bytes());
}

fn read_string(bytes: &[u8], pos: &mut usize) -> Result<String, ParseError> {
    let len = read_long(bytes, pos)?;
    if len < 0 {
        return Err(ParseError::InvalidTagEncoding("negative string length".to_string()));
    }
    let len = len as usize;
    let end = pos.checked_add(len).ok_or_else(|| {
        ParseError::InvalidTagEncoding("string length overflow".to_string())
    })?;
    let slice = bytes.get(*pos..end).ok_or_else(|| {
        ParseError::InvalidTagEncoding("string runs past end of tagsBytes".to_string())
    })?;
    *pos = end;
    String::from_utf8(slice.to_vec())
        .map_err(|e| ParseError::InvalidTagEncoding(format!("tag string is not utf-8: {e}")))
}

/// Encodes an ordered list of tags into the Avro array wire format. An
/// empty tag list encodes to zero bytes (the field is omitted entirely).
pub fn encode_tags(tags: &[Tag]) -> Vec<u8> {
    if tags.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    write_long(&mut out, tags.len() as i64);
    for tag in tags {
        write_string(&mut out, &tag.name);
        write_string(&mut out, &tag.value);
    }
    write_long(&mut out, 0);
    out
}

/// Decodes the Avro array wire format back into an ordered list of tags.
/// Handles the negative-count/byte-size block variant some encoders emit,
/// even though [`encode_tags`] never produces it.
pub fn decode_tags(bytes: &[u8]) -> Result<Vec<Tag>, ParseError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let mut pos = 0usize;
    let mut tags = Vec::new();
    loop {
        let mut count = read_long(bytes, &mut pos)?;
        if count == 0 {
            break;
        }
        if count < 0 {
            count = -count;
            // Skip the byte-length hint that accompanies negative counts.
            let _block_size = read_long(bytes, &mut pos)?;
        }
        for _ in 0..count {
            let name = read_string(bytes, &mut pos)?;
            let value = read_string(bytes, &mut pos)?;
            tags.push(Tag { name, value });
        }
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty() {
        let encoded = encode_tags(&[]);
        assert!(encoded.is_empty());
        assert_eq!(decode_tags(&encoded).unwrap(), vec![]);
    }

    #[test]
    fn round_trips_seed_scenario_tags() {
        let tags = vec![
            Tag { name: "Content-Type".into(), value: "text/plain".into() },
            Tag { name: "App-Name".into(), value: "ArDrive-CLI".into() },
            Tag { name: "App-Version".into(), value: "1.21.0".into() },
        ];
        let encoded = encode_tags(&tags);
        assert_eq!(decode_tags(&encoded).unwrap(), tags);
    }

    #[test]
    fn round_trips_boundary_lengths() {
        let tags = vec![Tag {
            name: "n".repeat(MAX_TAG_NAME_LEN),
            value: "v".repeat(MAX_TAG_VALUE_LEN),
        }];
        let encoded = encode_tags(&tags);
        let decoded = decode_tags(&encoded).unwrap();
        assert_eq!(decoded, tags);
    }

    #[test]
    fn rejects_truncated_bytes() {
        let mut encoded = encode_tags(&[Tag { name: "a".into(), value: "b".into() }]);
        encoded.truncate(encoded.len() - 1);
        assert!(decode_tags(&encoded).is_err());
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_tags_round_trip(
            pairs in proptest::collection::vec(
                ("[a-zA-Z0-9]{0,20}", "[a-zA-Z0-9]{0,20}"), 0..10)
        ) {
            let tags: Vec<Tag> = pairs.into_iter().map(|(name, value)| Tag { name, value }).collect();
            let encoded = encode_tags(&tags);
            let decoded = decode_tags(&encoded).unwrap();
            proptest::prop_assert_eq!(decoded, tags);
        }
    }
}
