//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber from [`LoggingConfig`]: an `EnvFilter`
//! (`RUST_LOG` wins over the configured level) and a console formatter, plain or
//! JSON. An extra layer, typically an [`EncryptedLogLayer`], can be stacked on.
//!
//! [`EncryptedLogLayer`]: crate::logstore::EncryptedLogLayer

use crate::config::LoggingConfig;
use tracing::debug;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

fn filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_ascii_lowercase()))
}

/// Install the global subscriber. Returns `false` if one was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    init_logging_with(config, None::<tracing_subscriber::layer::Identity>)
}

/// Install the global subscriber with `extra` stacked under the filter
pub fn init_logging_with<L>(config: &LoggingConfig, extra: Option<L>) -> bool
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let plain = (config.log_to_console && !config.json_format).then(fmt::layer);
    let json = (config.log_to_console && config.json_format).then(|| fmt::layer().json());
    let installed = tracing_subscriber::registry()
        .with(extra)
        .with(plain)
        .with(json)
        .with(filter(config))
        .try_init()
        .is_ok();

    if installed {
        debug!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    }
    installed
}
