//! Orchestrates the five tiers behind a single read/write/quarantine
//! surface: policy-gated fan-out writes, breaker-aware reads, and the
//! durability invariant that at least one durable tier commits.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tracing::warn;

use crate::blob_store::BlobStore;
use crate::breaker::Breaker;
use crate::error::TierError;
use crate::fs_backup::FsBackup;
use crate::kv_doc::{KvDoc, SMALL_ITEM_DOC_THRESHOLD};
use crate::mem_lru::MemLru;
use crate::remote_cache::RemoteCache;

pub const SMALL_ITEM_THRESHOLD: u64 = 256 * 1024;
const DEFAULT_BREAKER_RESET: Duration = Duration::from_secs(30);
const DEFAULT_BREAKER_TIMEOUT: Duration = Duration::from_secs(5);
const REMOTE_QUARANTINE_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);
const REMOTE_DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Per-tier Bernoulli write-sampling rates, normally sourced from
/// `RemoteConfig`; all default to always-write.
#[derive(Debug, Clone, Copy)]
pub struct SamplingPolicy {
    pub mem_lru: f64,
    pub remote_cache: f64,
    pub fs_backup: f64,
    pub kv_doc: f64,
    pub blob_store: f64,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            mem_lru: 1.0,
            remote_cache: 1.0,
            fs_backup: 1.0,
            kv_doc: 1.0,
            blob_store: 1.0,
        }
    }
}

fn sampled(rate: f64) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if rate <= 0.0 {
        return false;
    }
    rand::thread_rng().gen_bool(rate)
}

pub struct TierFabric {
    mem_lru: MemLru,
    remote_cache: Option<Arc<dyn RemoteCache>>,
    fs_backup: Option<FsBackup>,
    kv_doc: Option<KvDoc>,
    blob_store: Option<BlobStore>,
    remote_breaker: Breaker,
    kv_doc_breaker: Breaker,
    fs_backup_breaker: Breaker,
    sampling: SamplingPolicy,
}

/// Which tiers accepted a commit, in write order.
pub type CommittedTiers = Vec<&'static str>;

impl TierFabric {
    pub fn new(
        mem_lru: MemLru,
        remote_cache: Option<Arc<dyn RemoteCache>>,
        fs_backup: Option<FsBackup>,
        kv_doc: Option<KvDoc>,
        blob_store: Option<BlobStore>,
        sampling: SamplingPolicy,
    ) -> Self {
        Self {
            mem_lru,
            remote_cache,
            fs_backup,
            kv_doc,
            blob_store,
            remote_breaker: Breaker::new(50, 5, DEFAULT_BREAKER_RESET, DEFAULT_BREAKER_TIMEOUT),
            kv_doc_breaker: Breaker::new(50, 5, DEFAULT_BREAKER_RESET, DEFAULT_BREAKER_TIMEOUT),
            fs_backup_breaker: Breaker::new(50, 5, DEFAULT_BREAKER_RESET, DEFAULT_BREAKER_TIMEOUT),
            sampling,
        }
    }

    fn raw_key(id: &str) -> String {
        format!("raw_{id}")
    }

    /// Fans the validated item out to every eligible tier. Returns the set
    /// of tiers that committed; fails with `NoDurableStore` if none of
    /// {fsBackup, kvDoc, blobStore} succeeded.
    pub async fn commit(&self, id: &str, bytes: Bytes) -> Result<CommittedTiers, TierError> {
        let key = Self::raw_key(id);
        let small = (bytes.len() as u64) < SMALL_ITEM_THRESHOLD;
        let doc_eligible = (bytes.len() as u64) <= SMALL_ITEM_DOC_THRESHOLD;
        let mut committed = CommittedTiers::new();

        if small && sampled(self.sampling.mem_lru) {
            self.mem_lru.insert(key.clone(), bytes.clone());
            committed.push("memLRU");
        }

        if small && sampled(self.sampling.remote_cache) {
            if let Some(cache) = &self.remote_cache {
                if self.remote_breaker.allow() {
                    let outcome = tokio::time::timeout(
                        self.remote_breaker.call_timeout(),
                        cache.set(&key, bytes.clone(), REMOTE_DEFAULT_TTL),
                    )
                    .await;
                    match outcome {
                        Ok(Ok(())) => {
                            self.remote_breaker.record_success();
                            committed.push("remoteCache");
                        }
                        Ok(Err(e)) => {
                            self.remote_breaker.record_failure();
                            warn!("remoteCache write failed for {id}: {e}");
                        }
                        Err(_) => {
                            self.remote_breaker.record_failure();
                            warn!("remoteCache write timed out for {id}");
                        }
                    }
                }
            }
        }

        if let Some(backup) = &self.fs_backup {
            if sampled(self.sampling.fs_backup) && self.fs_backup_breaker.allow() {
                let outcome = tokio::time::timeout(
                    self.fs_backup_breaker.call_timeout(),
                    backup.put(&key, &bytes),
                )
                .await;
                match outcome {
                    Ok(Ok(())) => {
                        self.fs_backup_breaker.record_success();
                        committed.push("fsBackup");
                    }
                    Ok(Err(e)) => {
                        self.fs_backup_breaker.record_failure();
                        warn!("fsBackup write failed for {id}: {e}");
                    }
                    Err(_) => {
                        self.fs_backup_breaker.record_failure();
                        warn!("fsBackup write timed out for {id}");
                    }
                }
            }
        }

        if doc_eligible {
            if let Some(doc) = &self.kv_doc {
                if sampled(self.sampling.kv_doc) && self.kv_doc_breaker.allow() {
                    match doc.put(&key, &bytes) {
                        Ok(()) => {
                            self.kv_doc_breaker.record_success();
                            committed.push("kvDoc");
                        }
                        Err(e) => {
                            self.kv_doc_breaker.record_failure();
                            warn!("kvDoc write failed for {id}: {e}");
                        }
                    }
                }
            }
        }

        if let Some(blob) = &self.blob_store {
            if sampled(self.sampling.blob_store) {
                match blob.put(&key, bytes.clone()).await {
                    Ok(()) => committed.push("blobStore"),
                    Err(e) => warn!("blobStore write failed for {id}: {e}"),
                }
            }
        }

        let durable = committed
            .iter()
            .any(|t| matches!(*t, "fsBackup" | "kvDoc" | "blobStore"));
        if !durable {
            return Err(TierError::NoDurableStore);
        }
        Ok(committed)
    }

    /// Existence check order tuned to probable hit rate: memLRU →
    /// remoteCache → blobStore → kvDoc → fsBackup.
    pub async fn exists(&self, id: &str) -> bool {
        let key = Self::raw_key(id);
        if self.mem_lru.contains(&key) {
            return true;
        }
        if let Some(cache) = &self.remote_cache {
            if self.remote_breaker.allow() {
                if let Ok(true) = cache.exists(&key).await {
                    return true;
                }
            }
        }
        if let Some(blob) = &self.blob_store {
            if blob.exists(&key).await {
                return true;
            }
        }
        if let Some(doc) = &self.kv_doc {
            if self.kv_doc_breaker.allow() {
                if let Ok(true) = doc.exists(&key) {
                    return true;
                }
            }
        }
        if let Some(backup) = &self.fs_backup {
            if self.fs_backup_breaker.allow() && backup.exists(&key).await {
                return true;
            }
        }
        false
    }

    /// Reads `[start, end]` (inclusive `end`) from the first tier that
    /// reports the key present, in the same order as [`Self::exists`].
    pub async fn read_range(&self, id: &str, start: u64, end: Option<u64>) -> Result<Bytes, TierError> {
        let key = Self::raw_key(id);

        if let Some(full) = self.mem_lru.get(&key) {
            return Ok(slice_range(&full, start, end));
        }

        if let Some(cache) = &self.remote_cache {
            if self.remote_breaker.allow() {
                if let Ok(Some(full)) = cache.get(&key).await {
                    return Ok(slice_range(&full, start, end));
                }
            }
        }

        if let Some(blob) = &self.blob_store {
            if blob.exists(&key).await {
                return blob.get_range(&key, start, end).await;
            }
        }

        if let Some(doc) = &self.kv_doc {
            if self.kv_doc_breaker.allow() {
                if let Ok(Some(full)) = doc.get(&key) {
                    return Ok(slice_range(&Bytes::from(full), start, end));
                }
            }
        }

        if let Some(backup) = &self.fs_backup {
            if self.fs_backup_breaker.allow() && backup.exists(&key).await {
                return backup.get_range(&key, start, end).await;
            }
        }

        Err(TierError::NotFound)
    }

    /// Moves every present key for `id` to its `quarantine_`/`quarantine/`
    /// counterpart and purges memLRU. Per-tier failures are logged and do
    /// not prevent quarantine in the other tiers.
    pub async fn quarantine(&self, id: &str) {
        let key = Self::raw_key(id);
        self.mem_lru.remove(&key);

        if let Some(cache) = &self.remote_cache {
            if let Err(e) = cache
                .rename(&key, &format!("quarantine_{key}"), REMOTE_QUARANTINE_TTL)
                .await
            {
                warn!("remoteCache quarantine failed for {id}: {e}");
            }
        }
        if let Some(backup) = &self.fs_backup {
            if let Err(e) = backup.quarantine(&key).await {
                warn!("fsBackup quarantine failed for {id}: {e}");
            }
        }
        if let Some(doc) = &self.kv_doc {
            if let Err(e) = doc.quarantine(&key) {
                warn!("kvDoc quarantine failed for {id}: {e}");
            }
        }
        if let Some(blob) = &self.blob_store {
            if let Err(e) = blob.quarantine(&key).await {
                warn!("blobStore quarantine failed for {id}: {e}");
            }
        }
    }

    /// Writes `bytes` directly under the quarantine key for `id`, bypassing
    /// the normal commit path entirely. Used when an item never earned a
    /// normal commit (e.g. it failed signature verification) but still
    /// needs a quarantine record for the configured retention window.
    pub async fn quarantine_raw(&self, id: &str, bytes: Bytes) {
        let key = Self::raw_key(id);
        let quarantine_key = format!("quarantine_{key}");

        if let Some(cache) = &self.remote_cache {
            if let Err(e) = cache.set(&quarantine_key, bytes.clone(), REMOTE_QUARANTINE_TTL).await {
                warn!("remoteCache raw quarantine failed for {id}: {e}");
            }
        }
        if let Some(blob) = &self.blob_store {
            if let Err(e) = blob.put(&format!("quarantine/{key}"), bytes).await {
                warn!("blobStore raw quarantine failed for {id}: {e}");
            }
        }
    }

    /// Quarantines every id in `candidates` that isn't already in
    /// `already_deleted`, returning the ids actually processed.
    ///
    /// Computing this complement set correctly matters: a record already
    /// removed (e.g. by TTL) must not be re-quarantined.
    pub async fn quarantine_sweep(&self, candidates: &[String], already_deleted: &[String]) -> Vec<String> {
        let unhandled = unhandled_records(candidates, already_deleted);
        for id in &unhandled {
            self.quarantine(id).await;
        }
        unhandled
    }
}

/// Records in `candidates` that are not present in `exclude`.
pub fn unhandled_records(candidates: &[String], exclude: &[String]) -> Vec<String> {
    candidates
        .iter()
        .filter(|r| !exclude.contains(r))
        .cloned()
        .collect()
}

fn slice_range(full: &Bytes, start: u64, end: Option<u64>) -> Bytes {
    let start = start as usize;
    let end = end.map(|e| (e as usize + 1).min(full.len())).unwrap_or(full.len());
    if start >= full.len() || start >= end {
        return Bytes::new();
    }
    full.slice(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_cache::FakeRemoteCache;

    fn fabric_with_all_tiers(dir: &std::path::Path) -> TierFabric {
        TierFabric::new(
            MemLru::new(1024),
            Some(Arc::new(FakeRemoteCache::default())),
            Some(FsBackup::new(dir.join("fs"))),
            Some(KvDoc::open(dir.join("kv").to_str().unwrap())),
            Some(crate::blob_store::BlobStore::new(Arc::new(
                object_store::memory::InMemory::new(),
            ))),
            SamplingPolicy::default(),
        )
    }

    #[tokio::test]
    async fn commit_then_read_range_hits_mem_lru_first() {
        let dir = tempfile::tempdir().unwrap();
        let fabric = fabric_with_all_tiers(dir.path());
        let committed = fabric.commit("abc", Bytes::from_static(b"hello world")).await.unwrap();
        assert!(committed.contains(&"memLRU"));
        assert!(committed.iter().any(|t| matches!(*t, "fsBackup" | "kvDoc" | "blobStore")));
        assert!(fabric.exists("abc").await);
        let slice = fabric.read_range("abc", 6, Some(10)).await.unwrap();
        assert_eq!(slice.as_ref(), b"world");
    }

    #[tokio::test]
    async fn quarantine_purges_mem_lru_and_moves_durable_copies() {
        let dir = tempfile::tempdir().unwrap();
        let fabric = fabric_with_all_tiers(dir.path());
        fabric.commit("abc", Bytes::from_static(b"data")).await.unwrap();
        fabric.quarantine("abc").await;
        assert!(!fabric.exists("abc").await);
    }

    #[test]
    fn unhandled_records_excludes_already_deleted() {
        let candidates = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let deleted = vec!["b".to_string()];
        assert_eq!(unhandled_records(&candidates, &deleted), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn no_durable_tier_fails_ingestion() {
        let fabric = TierFabric::new(
            MemLru::new(1024),
            Some(Arc::new(FakeRemoteCache::default())),
            None,
            None,
            None,
            SamplingPolicy::default(),
        );
        let result = fabric.commit("abc", Bytes::from_static(b"tiny")).await;
        assert!(matches!(result, Err(TierError::NoDurableStore)));
    }
}
