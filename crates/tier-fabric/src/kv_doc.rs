//! `kvDoc` tier: a low-latency key-value document store, used only for
//! items at or below `smallItemDocThreshold`. Backed by `sled`, the same
//! embedded store the teacher uses for its block database.

use uuid::Uuid;

use crate::error::TierError;

pub const SMALL_ITEM_DOC_THRESHOLD: u64 = 10 * 1024;

pub struct KvDoc {
    db: sled::Db,
}

impl KvDoc {
    pub fn open(loc: &str) -> Self {
        Self {
            db: Self::try_construct_db(loc),
        }
    }

    /// Falls back to a fresh temp-dir database rather than failing outright,
    /// matching the degrade-don't-crash posture of the rest of the fabric.
    fn try_construct_db(loc: &str) -> sled::Db {
        match sled::open(loc) {
            Ok(db) => db,
            Err(e) => {
                tracing::error!("failed to open kvDoc database at {loc}: {e}");
                let new_loc = format!("/tmp/turbo-kvdoc/{}", Uuid::new_v4());
                tracing::debug!("falling back to {new_loc}");
                sled::open(new_loc).expect("fallback kvDoc location must be writable")
            }
        }
    }

    pub fn put(&self, key: &str, value: &[u8]) -> Result<(), TierError> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TierError> {
        self.db
            .get(key.as_bytes())
            .map(|opt| opt.map(|ivec| ivec.to_vec()))
            .map_err(|e| TierError::Unavailable(e.to_string()))
    }

    pub fn exists(&self, key: &str) -> Result<bool, TierError> {
        self.db
            .contains_key(key.as_bytes())
            .map_err(|e| TierError::Unavailable(e.to_string()))
    }

    pub fn quarantine(&self, key: &str) -> Result<(), TierError> {
        let value = self
            .db
            .remove(key.as_bytes())
            .map_err(|e| TierError::Unavailable(e.to_string()))?
            .ok_or(TierError::NotFound)?;
        self.db
            .insert(format!("quarantine_{key}").as_bytes(), value)
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_quarantine_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let doc = KvDoc::open(dir.path().to_str().unwrap());
        doc.put("metadata_abc", b"{}").unwrap();
        assert!(doc.exists("metadata_abc").unwrap());
        assert_eq!(doc.get("metadata_abc").unwrap(), Some(b"{}".to_vec()));
        doc.quarantine("metadata_abc").unwrap();
        assert!(!doc.exists("metadata_abc").unwrap());
        assert!(doc.exists("quarantine_metadata_abc").unwrap());
    }
}
