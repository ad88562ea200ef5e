//! `remoteCache` tier: a networked key-value cache. Modeled as a trait so
//! tests (and callers without a live Redis) can swap in an in-memory fake;
//! the real implementation talks to Redis via `set`/`get`/`rename`/`expire`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TierError;

#[async_trait]
pub trait RemoteCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TierError>;
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), TierError>;
    async fn rename(&self, from: &str, to: &str, ttl: Duration) -> Result<(), TierError>;
    async fn exists(&self, key: &str) -> Result<bool, TierError>;
}

pub struct RedisRemoteCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisRemoteCache {
    pub async fn connect(url: &str) -> Result<Self, TierError> {
        let client = redis::Client::open(url).map_err(|e| TierError::Unavailable(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl RemoteCache for RedisRemoteCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TierError> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), TierError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))
    }

    async fn rename(&self, from: &str, to: &str, ttl: Duration) -> Result<(), TierError> {
        let mut conn = self.manager.clone();
        redis::cmd("RENAME")
            .arg(from)
            .arg(to)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        redis::cmd("EXPIRE")
            .arg(to)
            .arg(ttl.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, TierError> {
        let mut conn = self.manager.clone();
        let n: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        Ok(n > 0)
    }
}

/// In-memory stand-in for tests and for environments with no Redis.
#[derive(Default)]
pub struct FakeRemoteCache {
    store: Mutex<HashMap<String, Bytes>>,
}

#[async_trait]
impl RemoteCache for FakeRemoteCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TierError> {
        Ok(self.store.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes, _ttl: Duration) -> Result<(), TierError> {
        self.store.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str, _ttl: Duration) -> Result<(), TierError> {
        let mut store = self.store.lock().unwrap();
        let value = store.remove(from).ok_or(TierError::NotFound)?;
        store.insert(to.to_string(), value);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, TierError> {
        Ok(self.store.lock().unwrap().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_cache_rename_moves_value() {
        let cache = FakeRemoteCache::default();
        cache
            .set("raw_abc", Bytes::from_static(b"payload"), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .rename("raw_abc", "quarantine_raw_abc", Duration::from_secs(432_000))
            .await
            .unwrap();
        assert!(!cache.exists("raw_abc").await.unwrap());
        assert!(cache.exists("quarantine_raw_abc").await.unwrap());
    }
}
