//! # Notify Relay Service
//!
//! Host for the notification relay: loads layered configuration, installs
//! structured logging, wires the queue and broadcaster into a
//! [`QueueProcessor`](notify_relay_core::QueueProcessor) and stops it on a
//! shutdown signal.
//!
//! ## Module Organization
//!
//! - [config] - Host configuration and layered loading
//! - [error] - Host errors and process exit codes
//! - [relay] - Wiring and the run lifecycle
//! - [telemetry] - Logging initialisation

pub mod config;
pub mod error;
pub mod relay;
pub mod telemetry;

pub use crate::config::{
    BroadcasterConfig, ConfigError, InProcessBroadcasterConfig, LoggingConfig, RelayConfig,
    SignalRBroadcasterConfig,
};
pub use error::RelayError;
pub use relay::{shutdown_signal, Relay};
