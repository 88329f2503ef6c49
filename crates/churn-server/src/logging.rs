//! Subscriber setup for `tracing`.

use crate::config::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Filter directives: `RUST_LOG` when set, otherwise the configured level.
pub fn env_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| anyhow::anyhow!("invalid logging.level '{}': {}", config.level, e)),
    }
}

// Logs go to stderr; stdout carries command output
fn fmt_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer().with_writer(std::io::stderr);
    let json = config.format == "json";
    match (json, config.timestamps) {
        (true, true) => layer.json().with_current_span(false).boxed(),
        (true, false) => layer.json().with_current_span(false).without_time().boxed(),
        (false, true) => layer.with_target(true).boxed(),
        (false, false) => layer.with_target(true).without_time().boxed(),
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = env_filter(config)?;
    tracing_subscriber::registry()
        .with(fmt_layer(config))
        .with(filter)
        .try_init()?;
    Ok(())
}
