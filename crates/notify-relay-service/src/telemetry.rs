//! Logging initialisation.

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::filter::{LevelFilter, ParseError};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;

/// Crates whose events follow the configured level
const RELAY_TARGETS: [&str; 3] = ["notify_relay_service", "notify_relay_core", "notify_queue"];

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),

    #[error("Failed to install log subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Build the event filter for a configured level
///
/// A bare level such as `debug` applies to the relay crates while
/// dependencies stay at `warn`. Anything else is used as filter directives.
pub fn filter_for(level: &str) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(directives_for(level))
}

fn directives_for(level: &str) -> String {
    let level = level.trim();
    match level.parse::<LevelFilter>() {
        Ok(level) => {
            let mut directives = vec![LevelFilter::WARN.min(level).to_string()];
            directives.extend(
                RELAY_TARGETS
                    .iter()
                    .map(|target| format!("{}={}", target, level)),
            );
            directives.join(",").to_lowercase()
        }
        Err(_) => level.to_string(),
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides the configured level when it is set and valid.
pub fn init(logging: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for(&logging.level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);

    if logging.json_format {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }

    Ok(())
}
