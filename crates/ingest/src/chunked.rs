//! Re-assembles a multipart chunked upload into the single contiguous
//! byte stream the core ingest path expects, validating each chunk's
//! size against caller-supplied bounds as it arrives.

use bytes::Bytes;
use futures::stream;

use crate::error::IngestError;

/// Accumulates chunks for one upload, rejecting any outside
/// `[min_bytes, max_bytes]` as it is pushed.
pub struct ChunkedUploadAssembly {
    min_bytes: usize,
    max_bytes: usize,
    chunks: Vec<Bytes>,
}

impl ChunkedUploadAssembly {
    pub fn new(min_bytes: usize, max_bytes: usize) -> Self {
        Self {
            min_bytes,
            max_bytes,
            chunks: Vec::new(),
        }
    }

    /// Validates and appends one chunk. Does not distinguish a final,
    /// possibly-short chunk: callers that allow an undersized last chunk
    /// should check `min_bytes` themselves before calling this for it.
    pub fn push_chunk(&mut self, chunk: Bytes) -> Result<(), IngestError> {
        let size = chunk.len();
        if size < self.min_bytes || size > self.max_bytes {
            return Err(IngestError::InvalidChunkSize {
                size,
                min: self.min_bytes,
                max: self.max_bytes,
            });
        }
        self.chunks.push(chunk);
        Ok(())
    }

    pub fn total_len(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }

    /// Consumes the accumulated chunks as the stream expected by
    /// [`crate::coordinator::IngestCoordinator::ingest`].
    pub fn into_stream(self) -> impl futures::Stream<Item = std::io::Result<Bytes>> + Unpin + Send + 'static {
        stream::iter(self.chunks.into_iter().map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_chunks_within_bounds() {
        let mut assembly = ChunkedUploadAssembly::new(2, 4);
        assembly.push_chunk(Bytes::from_static(b"ab")).unwrap();
        assembly.push_chunk(Bytes::from_static(b"cdef")).unwrap();
        assert_eq!(assembly.total_len(), 6);
    }

    #[test]
    fn rejects_chunk_below_minimum() {
        let mut assembly = ChunkedUploadAssembly::new(4, 8);
        let err = assembly.push_chunk(Bytes::from_static(b"ab")).unwrap_err();
        assert!(matches!(err, IngestError::InvalidChunkSize { size: 2, min: 4, max: 8 }));
    }

    #[test]
    fn rejects_chunk_above_maximum() {
        let mut assembly = ChunkedUploadAssembly::new(1, 4);
        let err = assembly.push_chunk(Bytes::from_static(b"abcdef")).unwrap_err();
        assert!(matches!(err, IngestError::InvalidChunkSize { size: 6, min: 1, max: 4 }));
    }

    #[tokio::test]
    async fn into_stream_preserves_order() {
        use futures::StreamExt;
        let mut assembly = ChunkedUploadAssembly::new(1, 10);
        assembly.push_chunk(Bytes::from_static(b"hello")).unwrap();
        assembly.push_chunk(Bytes::from_static(b"world")).unwrap();
        let mut stream = assembly.into_stream();
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(out, b"helloworld");
    }
}
