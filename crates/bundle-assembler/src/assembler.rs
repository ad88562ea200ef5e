//! Streaming bundle assembly: concatenates a parsed header with its
//! member items' bytes, pulled from the tier fabric with bounded
//! prefetch, in strict header order (spec.md §4.E).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_stream::wrappers::ReceiverStream;

use turbo_ans104::{bundle::write_bundle_header, id_base64url, BundleHeaderInfo};
use turbo_remote_config::TaskCounter;
use turbo_tier_fabric::TierFabric;

use crate::budgets::Budgets;
use crate::error::AssemblerError;
use crate::item_attribute::{extract_attribute, ItemAttribute};

const ATTRIBUTE_GUARD: Duration = Duration::from_secs(60);
const OUTPUT_CHANNEL_CAPACITY: usize = 8;

/// The two results [`assemble`] hands back: the lazy output byte stream
/// and a handle for the attribute-extraction side channel.
pub struct AssembledBundle {
    pub output: ReceiverStream<Result<Bytes, AssemblerError>>,
    pub attributes: tokio::task::JoinHandle<Vec<Option<ItemAttribute>>>,
}

struct SharedState {
    next_to_fetch: AtomicUsize,
    inflight_bytes: AtomicU64,
    inflight_requests: AtomicUsize,
    fetched: Mutex<HashMap<usize, Bytes>>,
    error: Mutex<Option<AssemblerError>>,
    notify: Notify,
}

/// Decrements the shared [`TaskCounter`] exactly once, whether the owning
/// per-item task runs to completion or is aborted mid-flight (e.g. when
/// the assembly fails and outstanding fetches are cancelled).
struct TaskCounterGuard {
    counter: TaskCounter,
    done: bool,
}

impl TaskCounterGuard {
    fn new(counter: TaskCounter) -> Self {
        Self { counter, done: false }
    }

    fn finish(&mut self) {
        if !self.done {
            self.counter.finish_task();
            self.done = true;
        }
    }
}

impl Drop for TaskCounterGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Produces a single lazy byte stream equal to the header followed by
/// every item's bytes in header order, plus an attribute side channel.
/// `fabric` is consulted via [`TierFabric::read_range`] for each item.
pub async fn assemble(header: BundleHeaderInfo, fabric: Arc<TierFabric>, budgets: Budgets) -> AssembledBundle {
    let n = header.entries.len();
    let task_counter = TaskCounter::new();
    for _ in 0..n {
        task_counter.start_task();
    }
    let attributes = Arc::new(Mutex::new(vec![None; n]));

    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

    let drive_attributes = attributes.clone();
    let drive_task_counter = task_counter.clone();
    tokio::spawn(drive(header, fabric, budgets, tx, drive_task_counter, drive_attributes));

    let guard_attributes = attributes;
    let attributes_handle = tokio::spawn(async move {
        task_counter.wait_for_zero(Some(ATTRIBUTE_GUARD)).await;
        guard_attributes.lock().await.clone()
    });

    AssembledBundle {
        output: ReceiverStream::new(rx),
        attributes: attributes_handle,
    }
}

async fn drive(
    header: BundleHeaderInfo,
    fabric: Arc<TierFabric>,
    budgets: Budgets,
    tx: mpsc::Sender<Result<Bytes, AssemblerError>>,
    task_counter: TaskCounter,
    attributes: Arc<Mutex<Vec<Option<ItemAttribute>>>>,
) {
    let n = header.entries.len();
    let header_bytes = write_bundle_header(
        &header
            .entries
            .iter()
            .map(|e| (e.size, e.id))
            .collect::<Vec<_>>(),
    );
    if tx.send(Ok(Bytes::from(header_bytes))).await.is_err() {
        abort_remaining(&task_counter, 0, n);
        return;
    }

    let state = Arc::new(SharedState {
        next_to_fetch: AtomicUsize::new(0),
        inflight_bytes: AtomicU64::new(0),
        inflight_requests: AtomicUsize::new(0),
        fetched: Mutex::new(HashMap::new()),
        error: Mutex::new(None),
        notify: Notify::new(),
    });
    let mut handles = Vec::new();

    let mut next_to_pipe = 0usize;
    while next_to_pipe < n {
        spawn_eligible_fetches(&header, &state, &fabric, budgets, &task_counter, &attributes, &mut handles);

        loop {
            if let Some(err) = state.error.lock().await.clone() {
                let _ = tx.send(Err(err)).await;
                for handle in &handles {
                    handle.abort();
                }
                return;
            }
            if state.fetched.lock().await.contains_key(&next_to_pipe) {
                break;
            }
            state.notify.notified().await;
        }

        let bytes = state.fetched.lock().await.remove(&next_to_pipe).unwrap();
        let size = header.entries[next_to_pipe].size;
        if tx.send(Ok(bytes)).await.is_err() {
            for handle in &handles {
                handle.abort();
            }
            return;
        }
        state.inflight_bytes.fetch_sub(size, Ordering::AcqRel);
        state.inflight_requests.fetch_sub(1, Ordering::AcqRel);
        next_to_pipe += 1;
    }
}

/// Starts prefetches for every item index that fits within the inflight
/// byte/request budgets, FIFO over item index (lower index always wins
/// since `next_to_fetch` only ever advances in order).
#[allow(clippy::too_many_arguments)]
fn spawn_eligible_fetches(
    header: &BundleHeaderInfo,
    state: &Arc<SharedState>,
    fabric: &Arc<TierFabric>,
    budgets: Budgets,
    task_counter: &TaskCounter,
    attributes: &Arc<Mutex<Vec<Option<ItemAttribute>>>>,
    handles: &mut Vec<tokio::task::JoinHandle<()>>,
) {
    let n = header.entries.len();
    loop {
        let index = state.next_to_fetch.load(Ordering::Acquire);
        if index >= n {
            return;
        }
        let entry = &header.entries[index];
        let inflight_requests = state.inflight_requests.load(Ordering::Acquire);
        if inflight_requests >= budgets.max_inflight_requests {
            return;
        }
        let inflight_bytes = state.inflight_bytes.load(Ordering::Acquire);
        if inflight_requests > 0 && inflight_bytes + entry.size > budgets.max_inflight_bytes {
            return;
        }

        state.next_to_fetch.store(index + 1, Ordering::Release);
        state.inflight_bytes.fetch_add(entry.size, Ordering::AcqRel);
        state.inflight_requests.fetch_add(1, Ordering::AcqRel);

        let fabric = fabric.clone();
        let state = state.clone();
        let id = id_base64url(&entry.id);
        let size = entry.size;
        let offset = entry.data_offset;
        let task_counter = task_counter.clone();
        let attributes = attributes.clone();

        handles.push(tokio::spawn(async move {
            let mut guard = TaskCounterGuard::new(task_counter);
            match fabric.read_range(&id, 0, Some(size.saturating_sub(1))).await {
                Ok(bytes) => {
                    let attr = extract_attribute(size, offset, bytes.clone()).await;
                    attributes.lock().await[index] = Some(attr);
                    guard.finish();

                    state.fetched.lock().await.insert(index, bytes);
                    state.notify.notify_waiters();
                }
                Err(source) => {
                    guard.finish();
                    let mut error = state.error.lock().await;
                    if error.is_none() {
                        *error = Some(AssemblerError::ItemFetch { index, id, source });
                    }
                    drop(error);
                    state.notify.notify_waiters();
                }
            }
        }));
    }
}

fn abort_remaining(task_counter: &TaskCounter, from: usize, to: usize) {
    for _ in from..to {
        task_counter.finish_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use turbo_ans104::BundleItemEntry;
    use turbo_tier_fabric::{FakeRemoteCache, FsBackup, KvDoc, MemLru, SamplingPolicy};

    async fn fabric_with_items(dir: &std::path::Path, items: &[(&str, &[u8])]) -> (Arc<TierFabric>, BundleHeaderInfo) {
        let fabric = Arc::new(TierFabric::new(
            MemLru::new(1024 * 1024),
            Some(Arc::new(FakeRemoteCache::default())),
            Some(FsBackup::new(dir.join("fs"))),
            Some(KvDoc::open(dir.join("kv").to_str().unwrap())),
            None,
            SamplingPolicy::default(),
        ));

        let mut entries = Vec::new();
        let mut offset = 32 + 64 * items.len() as u64;
        for (id_hex, bytes) in items {
            let mut id = [0u8; 32];
            id[0] = id_hex.as_bytes()[0];
            fabric.commit(&id_base64url(&id), Bytes::copy_from_slice(bytes)).await.unwrap();
            entries.push(BundleItemEntry {
                id,
                size: bytes.len() as u64,
                data_offset: offset,
            });
            offset += bytes.len() as u64;
        }
        let header = BundleHeaderInfo {
            num_items: entries.len() as u64,
            entries,
        };
        (fabric, header)
    }

    #[tokio::test]
    async fn assembles_header_then_items_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (fabric, header) = fabric_with_items(
            dir.path(),
            &[("a", b"hello"), ("b", b"world!!"), ("c", b"x")],
        )
        .await;
        let total_size = header.total_size();

        let assembled = assemble(header, fabric, Budgets::default()).await;
        let mut out = Vec::new();
        let mut output = assembled.output;
        while let Some(chunk) = output.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(out.len() as u64, total_size);
        assert!(out.ends_with(b"x"));

        let attrs = assembled.attributes.await.unwrap();
        assert_eq!(attrs.len(), 3);
        assert!(attrs.iter().all(|a| a.is_some()));
    }

    #[tokio::test]
    async fn missing_item_surfaces_as_error_and_stops_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut entries = vec![BundleItemEntry {
            id: [0xaa; 32],
            size: 4,
            data_offset: 96,
        }];
        entries.push(BundleItemEntry {
            id: [0xbb; 32],
            size: 4,
            data_offset: 100,
        });
        let header = BundleHeaderInfo {
            num_items: 2,
            entries,
        };
        let fabric = Arc::new(TierFabric::new(
            MemLru::new(1024),
            Some(Arc::new(FakeRemoteCache::default())),
            Some(FsBackup::new(dir.path().join("fs"))),
            Some(KvDoc::open(dir.path().join("kv").to_str().unwrap())),
            None,
            SamplingPolicy::default(),
        ));

        let assembled = assemble(header, fabric, Budgets::default()).await;
        let mut output = assembled.output;
        let mut saw_error = false;
        while let Some(chunk) = output.next().await {
            if chunk.is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
    }
}
