//! Multi-tier cache fabric: memLRU, remoteCache, fsBackup, kvDoc, and
//! blobStore behind one policy-gated write/read/quarantine surface.

pub mod blob_store;
pub mod breaker;
pub mod error;
pub mod fabric;
pub mod fs_backup;
pub mod kv_doc;
pub mod mem_lru;
pub mod remote_cache;

pub use blob_store::BlobStore;
pub use breaker::{Breaker, BreakerState};
pub use error::TierError;
pub use fabric::{unhandled_records, CommittedTiers, SamplingPolicy, TierFabric, SMALL_ITEM_THRESHOLD};
pub use fs_backup::FsBackup;
pub use kv_doc::{KvDoc, SMALL_ITEM_DOC_THRESHOLD};
pub use mem_lru::MemLru;
pub use remote_cache::{FakeRemoteCache, RedisRemoteCache, RemoteCache};
