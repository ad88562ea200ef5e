//! `blobStore` tier: object storage for all sizes, the durable store of
//! last resort. Built on `object_store` so the backing service (S3,
//! filesystem, in-memory) is swappable without touching the fabric.

use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;

use crate::error::TierError;

pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
}

impl BlobStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn path_for(key: &str) -> ObjectPath {
        ObjectPath::from(key)
    }

    pub async fn put(&self, key: &str, value: Bytes) -> Result<(), TierError> {
        self.store
            .put(&Self::path_for(key), value)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, TierError> {
        let result = self
            .store
            .get(&Self::path_for(key))
            .await
            .map_err(|_| TierError::NotFound)?;
        result
            .bytes()
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))
    }

    pub async fn get_range(&self, key: &str, start: u64, end: Option<u64>) -> Result<Bytes, TierError> {
        let range: Range<usize> = match end {
            Some(end) => start as usize..(end as usize + 1),
            None => {
                let meta = self
                    .store
                    .head(&Self::path_for(key))
                    .await
                    .map_err(|_| TierError::NotFound)?;
                start as usize..meta.size
            }
        };
        self.store
            .get_range(&Self::path_for(key), range)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.store.head(&Self::path_for(key)).await.is_ok()
    }

    pub async fn quarantine(&self, key: &str) -> Result<(), TierError> {
        let from = Self::path_for(key);
        let to = ObjectPath::from(format!("quarantine/{key}"));
        self.store
            .copy(&from, &to)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        self.store
            .delete(&from)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    #[tokio::test]
    async fn put_get_range_round_trip() {
        let store = BlobStore::new(Arc::new(InMemory::new()));
        store.put("raw_abc", Bytes::from_static(b"hello world")).await.unwrap();
        assert!(store.exists("raw_abc").await);
        let range = store.get_range("raw_abc", 6, Some(10)).await.unwrap();
        assert_eq!(range.as_ref(), b"world");
    }

    #[tokio::test]
    async fn quarantine_moves_under_prefix() {
        let store = BlobStore::new(Arc::new(InMemory::new()));
        store.put("raw_abc", Bytes::from_static(b"data")).await.unwrap();
        store.quarantine("raw_abc").await.unwrap();
        assert!(!store.exists("raw_abc").await);
        assert!(store.exists("quarantine/raw_abc").await);
    }
}
