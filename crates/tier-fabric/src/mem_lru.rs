//! In-process bounded LRU tier: `memLRU`. Doubles as the existence
//! memoization layer and the in-flight map that serializes concurrent
//! ingests for the same id.

use std::time::Duration;

use bytes::Bytes;
use moka::sync::Cache;

const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct MemLru {
    cache: Cache<String, Bytes>,
}

impl MemLru {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(DEFAULT_TTL)
                .build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.cache.get(key)
    }

    pub fn insert(&self, key: String, value: Bytes) {
        self.cache.insert(key, value);
    }

    pub fn remove(&self, key: &str) {
        self.cache.invalidate(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }
}
