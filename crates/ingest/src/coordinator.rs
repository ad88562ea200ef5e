//! Orchestrates one upload end to end: drives the streaming parser, taps
//! the payload into the tier fabric, and enforces at-most-once
//! finalization per item id.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};

use turbo_ans104::{id_base64url, parse, ItemHandle, ParseOptions};
use turbo_tier_fabric::TierFabric;

use crate::error::IngestError;

/// Outcome of a single `ingest` call.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub id: String,
    pub ok: bool,
    pub stores_committed: Vec<&'static str>,
}

/// Removes the claimed id from the in-flight set when dropped, so a
/// panicking or cancelled ingest never leaves a stuck lock behind.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.id);
    }
}

pub struct IngestCoordinator {
    tier_fabric: Arc<TierFabric>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl IngestCoordinator {
    pub fn new(tier_fabric: Arc<TierFabric>) -> Self {
        Self {
            tier_fabric,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn try_claim(&self, id: &str) -> Result<InFlightGuard, IngestError> {
        let mut guard = self.in_flight.lock().unwrap();
        if !guard.insert(id.to_string()) {
            return Err(IngestError::Conflict(id.to_string()));
        }
        drop(guard);
        Ok(InFlightGuard {
            set: self.in_flight.clone(),
            id: id.to_string(),
        })
    }

    /// Consumes `input` as a single data item's raw bytes, validates it,
    /// and on success fans it out across the tier fabric. `declared_len`,
    /// when given, is checked against the observed raw byte length.
    pub async fn ingest<S>(&self, input: S, declared_len: Option<u64>) -> Result<IngestOutcome, IngestError>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Unpin + Send + 'static,
    {
        let raw = Arc::new(Mutex::new(Vec::new()));
        let tapped = tee(input, raw.clone());
        let handle = parse(tapped, ParseOptions::default());
        let signature = handle.signature().await.ok_or(IngestError::TruncatedHeader)?;
        let id_bytes: [u8; 32] = Sha256::digest(signature.as_slice()).into();
        let id = id_base64url(&id_bytes);

        let _guard = self.try_claim(&id)?;
        self.drive_to_completion(&handle, &id, declared_len, raw).await
    }

    /// The tier fabric stores the complete raw data item (header and
    /// payload), since a bundle later re-serves the item verbatim. The
    /// parser's own payload channel is drained here only to let it run to
    /// completion; the committed bytes come from the raw tap installed in
    /// `ingest` instead.
    async fn drive_to_completion(
        &self,
        handle: &ItemHandle,
        id: &str,
        declared_len: Option<u64>,
        raw: Arc<Mutex<Vec<u8>>>,
    ) -> Result<IngestOutcome, IngestError> {
        let mut payload_rx = handle.payload().await.ok_or(IngestError::TruncatedHeader)?;
        while payload_rx.recv().await.is_some() {}

        let item = handle.finish().await?;
        let buf = std::mem::take(&mut *raw.lock().unwrap());

        if let Some(declared) = declared_len {
            if declared != buf.len() as u64 {
                return Err(IngestError::IntegrityMismatch {
                    declared,
                    observed: buf.len() as u64,
                });
            }
        }

        if !item.is_valid {
            self.tier_fabric.quarantine_raw(id, Bytes::from(buf)).await;
            return Ok(IngestOutcome {
                id: id.to_string(),
                ok: false,
                stores_committed: Vec::new(),
            });
        }

        let stores_committed = self.tier_fabric.commit(id, Bytes::from(buf)).await?;
        Ok(IngestOutcome {
            id: id.to_string(),
            ok: true,
            stores_committed,
        })
    }
}

/// Clones every chunk of `input` into `sink` as it passes through,
/// unmodified, to the parser.
fn tee<S>(
    input: S,
    sink: Arc<Mutex<Vec<u8>>>,
) -> impl Stream<Item = std::io::Result<Bytes>> + Unpin + Send + 'static
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin + Send + 'static,
{
    input.map(move |item| {
        if let Ok(bytes) = &item {
            sink.lock().unwrap().extend_from_slice(bytes);
        }
        item
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer as _, SigningKey as EdSigningKey};
    use futures::stream;
    use turbo_ans104::{deep_hash_blobs, SignatureType};
    use turbo_tier_fabric::{FakeRemoteCache, FsBackup, KvDoc, MemLru, RemoteCache, SamplingPolicy};

    fn build_item(owner: &[u8], signature: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&SignatureType::Ed25519.as_u16().to_le_bytes());
        out.extend_from_slice(signature);
        out.extend_from_slice(owner);
        out.push(0); // no target
        out.push(0); // no anchor
        out.extend_from_slice(&0u64.to_le_bytes()); // numTags
        out.extend_from_slice(&0u64.to_le_bytes()); // numTagsBytes
        out.extend_from_slice(payload);
        out
    }

    fn signed_item(seed: u8, payload: &[u8]) -> Vec<u8> {
        let signing_key = EdSigningKey::from_bytes(&[seed; 32]);
        let verifying_key = signing_key.verifying_key();
        let empty: &[u8] = &[];
        let blobs: Vec<&[u8]> = vec![
            b"dataitem",
            b"1",
            b"2",
            verifying_key.as_bytes(),
            empty,
            empty,
            empty,
            payload,
        ];
        let deep_hash = deep_hash_blobs(&blobs);
        let signature = signing_key.sign(&deep_hash).to_bytes();
        build_item(verifying_key.as_bytes(), &signature, payload)
    }

    fn stream_of(bytes: Vec<u8>) -> impl Stream<Item = std::io::Result<Bytes>> + Unpin + Send + 'static {
        stream::iter(vec![Ok(Bytes::from(bytes))])
    }

    async fn coordinator_with_tiers(dir: &std::path::Path) -> IngestCoordinator {
        let (coordinator, _cache) = coordinator_with_cache(dir).await;
        coordinator
    }

    async fn coordinator_with_cache(dir: &std::path::Path) -> (IngestCoordinator, Arc<FakeRemoteCache>) {
        let cache = Arc::new(FakeRemoteCache::default());
        let fabric = TierFabric::new(
            MemLru::new(1024),
            Some(cache.clone()),
            Some(FsBackup::new(dir.join("fs"))),
            Some(KvDoc::open(dir.join("kv").to_str().unwrap())),
            None,
            SamplingPolicy::default(),
        );
        (IngestCoordinator::new(Arc::new(fabric)), cache)
    }

    #[tokio::test]
    async fn valid_item_commits_to_durable_tier() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator_with_tiers(dir.path()).await;
        let bytes = signed_item(1, b"hello");
        let outcome = coordinator.ingest(stream_of(bytes), None).await.unwrap();
        assert!(outcome.ok);
        assert!(!outcome.stores_committed.is_empty());
    }

    #[tokio::test]
    async fn invalid_signature_does_not_commit() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator_with_tiers(dir.path()).await;
        let mut bytes = signed_item(2, b"hello");
        let sig_start = 2;
        bytes[sig_start] ^= 0xff;
        let outcome = coordinator.ingest(stream_of(bytes), None).await.unwrap();
        assert!(!outcome.ok);
        assert!(outcome.stores_committed.is_empty());
    }

    #[tokio::test]
    async fn invalid_signature_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, cache) = coordinator_with_cache(dir.path()).await;
        let mut bytes = signed_item(7, b"hello");
        let sig_start = 2;
        bytes[sig_start] ^= 0xff;
        let outcome = coordinator.ingest(stream_of(bytes), None).await.unwrap();
        assert!(!outcome.ok);

        let quarantine_key = format!("quarantine_raw_{}", outcome.id);
        assert!(cache.exists(&quarantine_key).await.unwrap());
    }

    #[tokio::test]
    async fn declared_length_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator_with_tiers(dir.path()).await;
        let bytes = signed_item(3, b"hello world");
        let result = coordinator.ingest(stream_of(bytes), Some(3)).await;
        assert!(matches!(result, Err(IngestError::IntegrityMismatch { .. })));
    }

    #[tokio::test]
    async fn concurrent_ingest_of_same_item_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Arc::new(coordinator_with_tiers(dir.path()).await);
        let bytes = signed_item(4, b"hello");
        let id_bytes: [u8; 32] =
            Sha256::digest(&signed_item(4, b"hello")[2..66]).into();
        let _ = id_bytes;

        let guard = coordinator.try_claim("duplicate").unwrap();
        let claim_again = coordinator.try_claim("duplicate");
        assert!(matches!(claim_again, Err(IngestError::Conflict(_))));
        drop(guard);
        assert!(coordinator.try_claim("duplicate").is_ok());
        let _ = bytes;
    }
}
