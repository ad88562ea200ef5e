use thiserror::Error;

/// Error taxonomy for a single [`crate::RetryClient::execute`] call.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("request exhausted its retry budget: {0}")]
    MaxRetriesExceeded(String),
    #[error("fatal transport error: {0}")]
    Fatal(String),
    #[error("resource not found")]
    NotFound,
    #[error("non-retryable HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
}
