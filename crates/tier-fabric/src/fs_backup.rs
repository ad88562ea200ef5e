//! `fsBackup` tier: local durable filesystem store under a known root.
//! Writes go to a temp sibling file and are renamed into place so a
//! reader never observes a partially-written blob.

use std::path::PathBuf;

use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

use crate::error::TierError;

pub struct FsBackup {
    root: PathBuf,
}

impl FsBackup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub async fn put(&self, key: &str, value: &[u8]) -> Result<(), TierError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        let tmp = self.path_for(&format!("{key}.tmp"));
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        file.write_all(value)
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        fs::rename(&tmp, self.path_for(key))
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, TierError> {
        fs::read(self.path_for(key))
            .await
            .map(Bytes::from)
            .map_err(|_| TierError::NotFound)
    }

    pub async fn get_range(&self, key: &str, start: u64, end: Option<u64>) -> Result<Bytes, TierError> {
        let mut file = fs::File::open(self.path_for(key))
            .await
            .map_err(|_| TierError::NotFound)?;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?;
        let mut buf = match end {
            Some(end) => vec![0u8; (end.saturating_sub(start) + 1) as usize],
            None => Vec::new(),
        };
        if end.is_some() {
            file.read_exact(&mut buf)
                .await
                .map_err(|e| TierError::Unavailable(e.to_string()))?;
        } else {
            file.read_to_end(&mut buf)
                .await
                .map_err(|e| TierError::Unavailable(e.to_string()))?;
        }
        Ok(Bytes::from(buf))
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::metadata(self.path_for(key)).await.is_ok()
    }

    pub async fn quarantine(&self, key: &str) -> Result<(), TierError> {
        fs::rename(self.path_for(key), self.path_for(&format!("quarantine_{key}")))
            .await
            .map_err(|_| TierError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_range_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backup = FsBackup::new(dir.path());
        backup.put("raw_abc", b"hello world").await.unwrap();
        assert!(backup.exists("raw_abc").await);
        let full = backup.get("raw_abc").await.unwrap();
        assert_eq!(full.as_ref(), b"hello world");
        let range = backup.get_range("raw_abc", 6, Some(10)).await.unwrap();
        assert_eq!(range.as_ref(), b"world");
    }

    #[tokio::test]
    async fn quarantine_renames_file() {
        let dir = tempfile::tempdir().unwrap();
        let backup = FsBackup::new(dir.path());
        backup.put("raw_abc", b"data").await.unwrap();
        backup.quarantine("raw_abc").await.unwrap();
        assert!(!backup.exists("raw_abc").await);
        assert!(backup.exists("quarantine_raw_abc").await);
    }
}
