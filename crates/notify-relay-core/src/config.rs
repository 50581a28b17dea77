//! Processor configuration.
//!
//! Every field has a default, so an empty document yields a working
//! configuration. Durations are written as (fractional) seconds.

use crate::error::ProcessorError;
use crate::retry::{ReceiveBackoff, RetryPolicy};
use notify_queue::ProviderType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Largest batch a single receive may request from any provider
pub const MAX_BATCH_SIZE: u32 = ProviderType::AzureStorage.max_batch_size();

/// Shortest lease the queue service accepts
pub const MIN_LEASE_DURATION: Duration = Duration::from_secs(1);

/// Longest lease the queue service accepts
pub const MAX_LEASE_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Polling loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Maximum messages requested per receive
    pub batch_size: u32,

    /// How long received messages stay invisible to other consumers
    #[serde(with = "duration_seconds")]
    pub lease_duration: Duration,

    /// Sleep after a receive returned no messages
    #[serde(with = "duration_seconds")]
    pub idle_backoff: Duration,

    /// Messages of one batch dispatched at the same time
    pub dispatch_concurrency: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            lease_duration: Duration::from_secs(60),
            idle_backoff: Duration::from_secs(5),
            dispatch_concurrency: 1,
        }
    }
}

/// Complete processor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub polling: PollingConfig,
    pub retry: RetryPolicy,
    pub receive_backoff: ReceiveBackoff,
}

impl ProcessorConfig {
    /// Check every value is inside the range the processor supports
    pub fn validate(&self) -> Result<(), ProcessorError> {
        let polling = &self.polling;

        if polling.batch_size == 0 || polling.batch_size > MAX_BATCH_SIZE {
            return Err(invalid(format!(
                "polling.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, polling.batch_size
            )));
        }

        if polling.lease_duration < MIN_LEASE_DURATION
            || polling.lease_duration > MAX_LEASE_DURATION
        {
            return Err(invalid(format!(
                "polling.lease_duration must be between {:?} and {:?}, got {:?}",
                MIN_LEASE_DURATION, MAX_LEASE_DURATION, polling.lease_duration
            )));
        }

        if polling.dispatch_concurrency == 0 {
            return Err(invalid(
                "polling.dispatch_concurrency must be at least 1".to_string(),
            ));
        }

        if self.retry.max_delivery_attempts == 0 {
            return Err(invalid(
                "retry.max_delivery_attempts must be at least 1".to_string(),
            ));
        }

        let backoff = &self.receive_backoff;
        if !backoff.backoff_multiplier.is_finite() || backoff.backoff_multiplier < 1.0 {
            return Err(invalid(format!(
                "receive_backoff.backoff_multiplier must be a finite value of at least 1.0, got {}",
                backoff.backoff_multiplier
            )));
        }

        if !(0.0..=1.0).contains(&backoff.jitter_percent) {
            return Err(invalid(format!(
                "receive_backoff.jitter_percent must be between 0.0 and 1.0, got {}",
                backoff.jitter_percent
            )));
        }

        Ok(())
    }
}

fn invalid(message: String) -> ProcessorError {
    ProcessorError::Configuration { message }
}

/// Serde adapter storing a `Duration` as fractional seconds
pub mod duration_seconds {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds)
            .map_err(|e| D::Error::custom(format!("invalid duration {}: {}", seconds, e)))
    }
}
