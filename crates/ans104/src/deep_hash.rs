//! ANS-104 deep hash: a recursive SHA-384 scheme covering every header
//! field and the payload, the digest of which is what the owner's key
//! signs. Supports both whole-buffer hashing and incremental accumulation
//! so the streaming parser never has to buffer the payload to verify it.

use sha2::{Digest, Sha384};

fn sha384(data: &[u8]) -> [u8; 48] {
    Sha384::digest(data).into()
}

fn sha384_concat(a: &[u8; 48], b: &[u8; 48]) -> [u8; 48] {
    let mut buf = Vec::with_capacity(96);
    buf.extend_from_slice(a);
    buf.extend_from_slice(b);
    sha384(&buf)
}

fn blob_tag_hash(len: usize) -> [u8; 48] {
    sha384(format!("blob{len}").as_bytes())
}

fn blob_deep_hash(blob: &[u8]) -> [u8; 48] {
    sha384_concat(&blob_tag_hash(blob.len()), &sha384(blob))
}

fn list_tag_hash(count: usize) -> [u8; 48] {
    sha384(format!("list{count}").as_bytes())
}

/// Deep-hashes a full in-memory list of blobs (the header fields plus the
/// whole payload). Equivalent to, but simpler than, [`DeepHashStreamer`]
/// when the payload is already fully buffered.
pub fn deep_hash_blobs(blobs: &[&[u8]]) -> [u8; 48] {
    let mut acc = list_tag_hash(blobs.len());
    for blob in blobs {
        acc = sha384_concat(&acc, &blob_deep_hash(blob));
    }
    acc
}

/// Incrementally accumulates the ANS-104 deep hash over a set of
/// already-available header blobs plus a payload that may arrive in
/// chunks over time. The total blob count (header blobs + one payload
/// blob) is fixed at construction so the `list` tag can be computed
/// immediately.
pub struct DeepHashStreamer {
    acc: [u8; 48],
    payload_hasher: Sha384,
    payload_len: u64,
}

impl DeepHashStreamer {
    /// `header_blobs` are every deep-hash element except the payload,
    /// e.g. `["dataitem", "1", sigType, owner, target, anchor, tagsBytes]`.
    pub fn new(header_blobs: &[&[u8]]) -> Self {
        let total = header_blobs.len() + 1;
        let mut acc = list_tag_hash(total);
        for blob in header_blobs {
            acc = sha384_concat(&acc, &blob_deep_hash(blob));
        }
        Self {
            acc,
            payload_hasher: Sha384::new(),
            payload_len: 0,
        }
    }

    /// Feeds the next chunk of payload bytes into the running hash.
    pub fn update_payload(&mut self, chunk: &[u8]) {
        self.payload_hasher.update(chunk);
        self.payload_len += chunk.len() as u64;
    }

    /// Number of payload bytes folded in so far.
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    /// Finalizes the deep hash once the payload stream has ended.
    pub fn finalize(self) -> [u8; 48] {
        let tag = blob_tag_hash(self.payload_len as usize);
        let blob_hash: [u8; 48] = self.payload_hasher.finalize().into();
        let payload_blob_hash = sha384_concat(&tag, &blob_hash);
        sha384_concat(&self.acc, &payload_blob_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_matches_whole_buffer() {
        let header: [&[u8]; 3] = [b"dataitem", b"1", b"2"];
        let payload = b"hello world, this is a streamed payload".to_vec();

        let whole: Vec<&[u8]> = header.iter().copied().chain(std::iter::once(payload.as_slice())).collect();
        let expected = deep_hash_blobs(&whole);

        let mut streamer = DeepHashStreamer::new(&header);
        for chunk in payload.chunks(7) {
            streamer.update_payload(chunk);
        }
        assert_eq!(streamer.finalize(), expected);
    }

    #[test]
    fn empty_payload_hashes_consistently() {
        let header: [&[u8]; 2] = [b"a", b"b"];
        let whole: Vec<&[u8]> = header.iter().copied().chain(std::iter::once(&b""[..])).collect();
        let expected = deep_hash_blobs(&whole);

        let streamer = DeepHashStreamer::new(&header);
        assert_eq!(streamer.finalize(), expected);
    }
}
