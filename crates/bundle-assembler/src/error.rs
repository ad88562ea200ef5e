use thiserror::Error;
use turbo_tier_fabric::TierError;

#[derive(Debug, Error, Clone)]
pub enum AssemblerError {
    #[error("failed to fetch item {index} (id {id}): {source}")]
    ItemFetch {
        index: usize,
        id: String,
        #[source]
        source: TierError,
    },
    #[error("output stream consumer dropped")]
    ConsumerDropped,
}
