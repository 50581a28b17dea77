//! Host error types and process exit codes.

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use notify_relay_core::{BroadcastError, ProcessorError};
use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// Errors that end the host process
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Failed to create broadcaster: {0}")]
    Broadcaster(#[from] BroadcastError),

    #[error("Failed to create processor: {0}")]
    Processor(#[source] ProcessorError),

    #[error("Failed to start relay: {0}")]
    Startup(#[source] ProcessorError),

    #[error("Relay did not stop cleanly: {0}")]
    Shutdown(#[source] ProcessorError),
}

impl RelayError {
    /// Process exit code reported for this error
    ///
    /// - 3: configuration could not be loaded or is invalid
    /// - 4: the processor failed to start
    /// - 5: the processor did not stop cleanly
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_)
            | Self::Telemetry(_)
            | Self::Broadcaster(_)
            | Self::Processor(_) => 3,
            Self::Startup(_) => 4,
            Self::Shutdown(_) => 5,
        }
    }
}
