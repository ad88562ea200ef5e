//! Structured logging init, built on `tracing` + `tracing-subscriber`.

use eyre::Result;
use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initializes the global `tracing` subscriber for the `turbo` crates.
///
/// `verbose` selects `debug` over `info` as the default level for the
/// `turbo` target; `RUST_LOG` always takes precedence when set.
pub fn init(verbose: bool) -> Result<()> {
    let default_filter = if verbose { "turbo=debug" } else { "turbo=info" };
    let subscriber = get_subscriber(default_filter.into());
    init_subscriber(subscriber)
}

/// Builds a subscriber with an env-filter layer and the standard `fmt` layer.
pub fn get_subscriber(env_filter: String) -> impl Subscriber + Sync + Send {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));
    Registry::default().with(env_filter).with(fmt::layer())
}

/// Globally registers a subscriber. Errors if one is already registered.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber).map_err(|_| eyre::eyre!("failed to set subscriber"))
}
