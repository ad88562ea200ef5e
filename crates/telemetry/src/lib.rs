//! Ambient logging and metrics wiring shared by the `turbo` crates.
//!
//! Logging is built on `tracing`; use [`logging::init`] once at process
//! start. Metrics registration lives in [`metrics`] and is exposed for a
//! collaborator HTTP layer to scrape; this crate does not own a route.

pub mod logging;
pub mod metrics;

pub use logging::init;

/// Common re-exports for callers that just want to log.
pub mod prelude {
    pub use tracing::{debug, error, info, span, trace, warn, Level};
}
