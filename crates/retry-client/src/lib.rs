//! Exponential-backoff wrapper around outbound HTTP calls, per spec.md
//! §4.F. Used by the gateway client (a collaborator) to post bundles and
//! poll transaction status; grounded on `chain_watcher.rs`'s
//! `generate_http_provider` retry wiring.

pub mod error;

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

pub use error::RetryError;

/// Tunable knobs, all named directly after spec.md §4.F.
#[derive(Debug, Clone)]
pub struct RetryClientConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub valid_status_codes: HashSet<u16>,
    pub fatal_error_messages: Vec<String>,
    pub rate_limit_timeout: Duration,
}

impl Default for RetryClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            valid_status_codes: HashSet::from([200]),
            fatal_error_messages: Vec::new(),
            rate_limit_timeout: Duration::from_secs(60),
        }
    }
}

/// A retrying HTTP caller. Callers must supply a request builder closure
/// rather than a built request, since the wrapper may repeat the call —
/// the underlying request must be idempotent.
pub struct RetryClient {
    config: RetryClientConfig,
}

impl RetryClient {
    pub fn new(config: RetryClientConfig) -> Self {
        Self { config }
    }

    fn is_fatal(&self, message: &str) -> bool {
        self.config
            .fatal_error_messages
            .iter()
            .any(|fatal| message.contains(fatal.as_str()))
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.config.initial_delay * 2u32.pow(attempt)
    }

    /// Executes `build` (rebuilt fresh on every attempt) until it returns a
    /// response with a status in `valid_status_codes`, a terminal error, or
    /// the retry budget is exhausted.
    pub async fn execute<F>(&self, build: F) -> Result<reqwest::Response, RetryError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let result = build().send().await;
            match result {
                Err(e) => {
                    let message = e.to_string();
                    if self.is_fatal(&message) {
                        return Err(RetryError::Fatal(message));
                    }
                    if attempt >= self.config.max_retries {
                        return Err(RetryError::MaxRetriesExceeded(message));
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!("retry client transport error (attempt {attempt}): {message}, backing off {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Ok(response) => {
                    let status = response.status().as_u16();

                    if status == 429 {
                        warn!("retry client rate-limited, waiting {:?}", self.config.rate_limit_timeout);
                        tokio::time::sleep(self.config.rate_limit_timeout).await;
                        continue;
                    }

                    if self.config.valid_status_codes.contains(&status) {
                        return Ok(response);
                    }

                    if status == 404 {
                        return Err(RetryError::NotFound);
                    }

                    if (400..500).contains(&status) {
                        let body = response.text().await.unwrap_or_default();
                        return Err(RetryError::HttpStatus { status, body });
                    }

                    if (500..600).contains(&status) {
                        if attempt >= self.config.max_retries {
                            let body = response.text().await.unwrap_or_default();
                            return Err(RetryError::MaxRetriesExceeded(format!("{status}: {body}")));
                        }
                        let delay = self.backoff_delay(attempt);
                        warn!("retry client saw {status} (attempt {attempt}), backing off {delay:?}");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(RetryError::HttpStatus { status, body });
                }
            }
        }
    }
}
