use thiserror::Error;
use turbo_ans104::AnsError;
use turbo_tier_fabric::TierError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("concurrent ingest already in flight for id {0}")]
    Conflict(String),
    #[error("declared length {declared} does not match observed byte count {observed}")]
    IntegrityMismatch { declared: u64, observed: u64 },
    #[error(transparent)]
    Parse(#[from] AnsError),
    #[error(transparent)]
    Tier(#[from] TierError),
    #[error("chunk size {size} is outside the accepted range [{min}, {max}]")]
    InvalidChunkSize { size: usize, min: usize, max: usize },
    #[error("stream ended before the signature was fully read")]
    TruncatedHeader,
}
