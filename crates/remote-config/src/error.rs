use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ConfigError {
    #[error("unrecognized config key {0}")]
    UnknownKey(String),
    #[error("config source fetch failed: {0}")]
    FetchFailed(String),
    #[error("config source unavailable: circuit breaker open")]
    Unavailable,
}
