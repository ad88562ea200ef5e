use thiserror::Error;

/// Error taxonomy for tier reads, writes, and quarantine operations.
#[derive(Debug, Error, Clone)]
pub enum TierError {
    #[error("key not present in any tier")]
    NotFound,
    #[error("tier unavailable: {0}")]
    Unavailable(String),
    #[error("declared byte count {declared} does not match observed {observed}")]
    IntegrityMismatch { declared: u64, observed: u64 },
    #[error("concurrent write already in flight for key {0}")]
    Conflict(String),
    #[error("no durable tier committed the item")]
    NoDurableStore,
}
