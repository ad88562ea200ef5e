//! Side-channel header re-parse: while an item's bytes flow through the
//! output stream, a second lightweight parse extracts just enough of the
//! header to report a resolved [`ItemAttribute`] once the whole bundle
//! has been piped (spec.md §4.E).

use bytes::Bytes;
use futures::stream;
use sha2::Digest;
use turbo_ans104::{id_base64url, parse, ParseOptions};

/// A resolved attribute record for one item inside an assembled bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAttribute {
    pub id: String,
    pub raw_size: u64,
    pub payload_start: u64,
    pub content_type: String,
    pub offset_in_bundle: u64,
}

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Re-parses `item_bytes` (already fully fetched) just far enough to read
/// `payloadDataStart` and the `Content-Type` tag, without waiting for
/// payload-stream verification to complete.
pub async fn extract_attribute(raw_size: u64, offset_in_bundle: u64, item_bytes: Bytes) -> ItemAttribute {
    let handle = parse(
        stream::iter(vec![Ok::<_, std::io::Error>(item_bytes)]),
        ParseOptions::default(),
    );

    let signature = handle.signature().await;
    let payload_start = handle.payload_data_start().await.unwrap_or(0);
    let tags = handle.tags().await;

    let content_type = tags
        .and_then(|tags| {
            tags.iter()
                .find(|t| t.name.eq_ignore_ascii_case("content-type"))
                .map(|t| t.value.clone())
        })
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let id = match signature {
        Some(sig) => {
            let digest: [u8; 32] = sha2::Sha256::digest(sig.as_slice()).into();
            id_base64url(&digest)
        }
        None => String::new(),
    };

    ItemAttribute {
        id,
        raw_size,
        payload_start,
        content_type,
        offset_in_bundle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer as _, SigningKey as EdSigningKey};
    use turbo_ans104::{deep_hash_blobs, SignatureType, Tag};

    fn build_item(payload: &[u8], tags: &[Tag]) -> Vec<u8> {
        let signing_key = EdSigningKey::from_bytes(&[7u8; 32]);
        let verifying_key = signing_key.verifying_key();
        let tags_bytes = turbo_ans104::tags::encode_tags(tags);
        let empty: &[u8] = &[];
        let blobs: Vec<&[u8]> = vec![
            b"dataitem", b"1", b"2", verifying_key.as_bytes(), empty, empty, &tags_bytes, payload,
        ];
        let signature = signing_key.sign(&deep_hash_blobs(&blobs)).to_bytes();

        let mut out = Vec::new();
        out.extend_from_slice(&SignatureType::Ed25519.as_u16().to_le_bytes());
        out.extend_from_slice(&signature);
        out.extend_from_slice(verifying_key.as_bytes());
        out.push(0);
        out.push(0);
        out.extend_from_slice(&(tags.len() as u64).to_le_bytes());
        out.extend_from_slice(&(tags_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&tags_bytes);
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn extracts_content_type_from_tags() {
        let tags = vec![Tag {
            name: "Content-Type".to_string(),
            value: "text/plain".to_string(),
        }];
        let bytes = build_item(b"hello", &tags);
        let attr = extract_attribute(bytes.len() as u64, 42, Bytes::from(bytes)).await;
        assert_eq!(attr.content_type, "text/plain");
        assert_eq!(attr.offset_in_bundle, 42);
        assert!(!attr.id.is_empty());
    }

    #[tokio::test]
    async fn defaults_content_type_when_untagged() {
        let bytes = build_item(b"hello", &[]);
        let attr = extract_attribute(bytes.len() as u64, 0, Bytes::from(bytes)).await;
        assert_eq!(attr.content_type, DEFAULT_CONTENT_TYPE);
    }
}
