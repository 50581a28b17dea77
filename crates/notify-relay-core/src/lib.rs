//! # Notify Relay Core
//!
//! Queue processor that drains a durable queue and broadcasts every message to
//! live recipients, with bounded redelivery and poison-message dropping.
//!
//! ## Module Organization
//!
//! - [broadcaster] - Broadcaster contract plus in-process and hub REST implementations
//! - [config] - Polling and processor configuration
//! - [error] - Processor lifecycle errors
//! - [processor] - The processor state machine and its processing loop
//! - [retry] - Poison message policy and receive backoff

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod processor;
pub mod retry;

pub use broadcaster::{
    BroadcastError, ChannelBroadcaster, NotificationBroadcaster, SignalRBroadcaster,
    SignalRConnection,
};
pub use config::{PollingConfig, ProcessorConfig};
pub use error::ProcessorError;
pub use processor::{ProcessorState, QueueProcessor, RunPhase, StatsSnapshot};
pub use retry::{FailureStreak, ReceiveBackoff, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
