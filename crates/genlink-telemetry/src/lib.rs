//! Log subscriber setup for applications embedding genlink
//!
//! The library crates only emit `tracing` events; this crate installs a
//! global subscriber that formats them as text or JSON.

use genlink_config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build the event filter
///
/// `RUST_LOG` wins when set and valid, then the configured directive, then
/// plain `info`.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = env_filter(config);

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_file(false)
                .with_line_number(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;
        }
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;
        }
    }

    tracing::debug!(format = ?config.format, "log subscriber installed");

    Ok(())
}
