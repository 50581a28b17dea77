//! Host configuration and layered loading.
//!
//! Sources are applied in order, later sources overriding earlier ones:
//!
//! 1. `/etc/notify-relay/relay.yaml`
//! 2. `./config/relay.yaml`
//! 3. The file named by `NR_CONFIG_FILE` (required when the variable is set)
//! 4. Environment variables prefixed `NR__` with `__` separators,
//!    e.g. `NR__SHUTDOWN_TIMEOUT_SECONDS=60`
//!
//! Every field carries a default, so an unconfigured environment yields a
//! working local setup: an in-memory queue relayed to an in-process channel.

use ::config::{Config, Environment, File, FileFormat};
use notify_queue::{ProviderConfig, QueueConfig};
use notify_relay_core::ProcessorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// System-wide configuration file, without extension
pub const SYSTEM_CONFIG_PATH: &str = "/etc/notify-relay/relay";

/// Deployment-local configuration file, without extension
pub const LOCAL_CONFIG_PATH: &str = "config/relay";

/// Variable naming an explicit configuration file
pub const CONFIG_FILE_VARIABLE: &str = "NR_CONFIG_FILE";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "NR";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Complete host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Queue to drain
    pub queue: QueueConfig,

    /// Polling, retry and backoff behaviour
    pub processor: ProcessorConfig,

    /// Where notifications are delivered
    pub broadcaster: BroadcasterConfig,

    /// How long a stop waits for the processing loop
    pub shutdown_timeout_seconds: u64,

    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Load configuration from the standard file locations and environment
    pub fn load() -> Result<Self, ConfigError> {
        let explicit_path = std::env::var(CONFIG_FILE_VARIABLE)
            .ok()
            .filter(|path| !path.is_empty());

        Self::load_layered(
            &[SYSTEM_CONFIG_PATH, LOCAL_CONFIG_PATH],
            explicit_path.as_deref(),
            ENV_PREFIX,
        )
    }

    /// Load configuration from explicit sources
    ///
    /// `optional_files` are YAML files that may be absent. `explicit_file` must
    /// exist when given. Environment variables named `{env_prefix}__...` are
    /// applied last.
    pub fn load_layered(
        optional_files: &[&str],
        explicit_file: Option<&str>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for path in optional_files {
            builder = builder.add_source(
                File::with_name(path)
                    .required(false)
                    .format(FileFormat::Yaml),
            );
        }

        if let Some(path) = explicit_file {
            builder = builder.add_source(
                File::with_name(path)
                    .required(true)
                    .format(FileFormat::Yaml),
            );
        }

        let config = builder
            .add_source(Environment::with_prefix(env_prefix).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check every section for values the host cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.processor
            .validate()
            .map_err(|e| invalid("processor", e.to_string()))?;

        if self.shutdown_timeout_seconds == 0 {
            return Err(invalid(
                "shutdown_timeout_seconds",
                "must be greater than zero".to_string(),
            ));
        }

        if let ProviderConfig::AzureStorage(azure) = &self.queue.provider {
            if azure.request_timeout_seconds == Some(0) {
                return Err(invalid(
                    "queue.provider.request_timeout_seconds",
                    "must be greater than zero".to_string(),
                ));
            }
        }

        self.broadcaster.validate()?;
        self.logging.validate()
    }

    /// Shutdown window as a duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            processor: ProcessorConfig::default(),
            broadcaster: BroadcasterConfig::default(),
            shutdown_timeout_seconds: 30,
            logging: LoggingConfig::default(),
        }
    }
}

/// Broadcaster selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcasterConfig {
    /// In-process channel; notifications are logged by the host
    InProcess(InProcessBroadcasterConfig),

    /// Hub REST API compatible with Azure SignalR Service
    #[serde(rename = "signalr")]
    SignalR(SignalRBroadcasterConfig),
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self::InProcess(InProcessBroadcasterConfig::default())
    }
}

impl BroadcasterConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::InProcess(in_process) => {
                if in_process.capacity == 0 {
                    return Err(invalid(
                        "broadcaster.capacity",
                        "must be at least 1".to_string(),
                    ));
                }
            }
            Self::SignalR(signalr) => {
                if signalr.connection_string.trim().is_empty() {
                    return Err(invalid(
                        "broadcaster.connection_string",
                        "is required for the signalr broadcaster".to_string(),
                    ));
                }
                if signalr.hub.trim().is_empty() {
                    return Err(invalid("broadcaster.hub", "must not be empty".to_string()));
                }
                if signalr.target.trim().is_empty() {
                    return Err(invalid(
                        "broadcaster.target",
                        "must not be empty".to_string(),
                    ));
                }
                if signalr.request_timeout_seconds == 0 {
                    return Err(invalid(
                        "broadcaster.request_timeout_seconds",
                        "must be greater than zero".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// In-process channel broadcaster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InProcessBroadcasterConfig {
    /// Notifications buffered per subscriber before it lags
    pub capacity: usize,
}

impl Default for InProcessBroadcasterConfig {
    fn default() -> Self {
        Self {
            capacity: notify_relay_core::broadcaster::channel::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Hub REST broadcaster configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalRBroadcasterConfig {
    /// `Endpoint=...;AccessKey=...;Version=1.0;`
    pub connection_string: String,

    /// Hub every notification is sent to
    pub hub: String,

    /// Client method invoked with the payload
    pub target: String,

    pub request_timeout_seconds: u64,
}

impl std::fmt::Debug for SignalRBroadcasterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRBroadcasterConfig")
            .field("connection_string", &"<redacted>")
            .field("hub", &self.hub)
            .field("target", &self.target)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

impl Default for SignalRBroadcasterConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            hub: "notifications".to_string(),
            target: "ReceiveNotification".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or filter directives; `RUST_LOG` takes precedence when set
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        crate::telemetry::filter_for(&self.level)
            .map(|_| ())
            .map_err(|e| invalid("logging.level", e.to_string()))
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message,
    }
}
