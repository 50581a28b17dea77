//! # Retry Policy Module
//!
//! Two policies govern how the processor reacts to failure:
//!
//! - [`RetryPolicy`] decides whether a message whose broadcast failed is left on
//!   the queue for redelivery or dropped as a poison message.
//! - [`ReceiveBackoff`] paces re-polling after the queue itself fails, using
//!   exponential backoff with jitter.

use crate::config::duration_seconds;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Poison message policy for failed broadcasts
///
/// A message whose broadcast fails is deleted (dropped) once its delivery
/// attempt count exceeds `max_delivery_attempts - 1`; otherwise it is left on
/// the queue and reappears when its lease expires.
///
/// Dropping is unconditional: a message that failed only because the hub was
/// briefly unreachable is dropped just the same once it hits the limit. Raise
/// `max_delivery_attempts` where that loss is not acceptable.
///
/// # Examples
///
/// ```rust
/// use notify_relay_core::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default(); // max_delivery_attempts = 3
///
/// assert!(!policy.should_drop(1));
/// assert!(!policy.should_drop(2));
/// assert!(policy.should_drop(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Broadcast attempts a message gets before it is dropped
    pub max_delivery_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Create a policy allowing `max_delivery_attempts` broadcasts per message
    pub fn new(max_delivery_attempts: u32) -> Self {
        Self {
            max_delivery_attempts,
        }
    }

    /// Check whether a message that just failed on this attempt is dropped
    pub fn should_drop(&self, delivery_attempt_count: u32) -> bool {
        delivery_attempt_count > self.max_delivery_attempts.saturating_sub(1)
    }

    /// Check whether a message has already used every permitted broadcast
    ///
    /// Such a message reappears only when an earlier delete failed, and is
    /// removed without being broadcast again.
    pub fn is_exhausted(&self, delivery_attempt_count: u32) -> bool {
        delivery_attempt_count > self.max_delivery_attempts
    }
}

/// Backoff applied between failed queue receives
///
/// The first failure of a run of consecutive failures is retried immediately
/// when the error is transient. Every later failure, and every non-transient
/// failure, waits `initial_delay * backoff_multiplier^(n-2)` (capped at
/// `max_delay`) where `n` is the position of the failure in the run.
///
/// Setting `max_delay` to zero disables the backoff entirely.
///
/// # Examples
///
/// ```rust
/// use notify_relay_core::retry::ReceiveBackoff;
/// use std::time::Duration;
///
/// let backoff = ReceiveBackoff::default().without_jitter();
///
/// assert_eq!(backoff.delay_for(1, true), Duration::ZERO);
/// assert_eq!(backoff.delay_for(2, true), Duration::from_millis(250));
/// assert_eq!(backoff.delay_for(3, true), Duration::from_millis(500));
/// assert_eq!(backoff.delay_for(1, false), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveBackoff {
    /// Delay after the second consecutive failure
    #[serde(with = "duration_seconds")]
    pub initial_delay: Duration,

    /// Maximum delay between receives
    #[serde(with = "duration_seconds")]
    pub max_delay: Duration,

    /// Exponential backoff multiplier (typically 2.0)
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (0.25 = ±25%)
    pub jitter_percent: f64,
}

impl Default for ReceiveBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.25, // ±25%
        }
    }
}

impl ReceiveBackoff {
    /// Create a new backoff with jitter enabled
    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Delay before the next receive after `consecutive_failures` failures in a row
    pub fn delay_for(&self, consecutive_failures: u32, transient: bool) -> Duration {
        if self.max_delay.is_zero() || consecutive_failures == 0 {
            return Duration::ZERO;
        }
        if transient && consecutive_failures == 1 {
            return Duration::ZERO;
        }

        self.calculate_delay(consecutive_failures.saturating_sub(2))
    }

    /// Calculate the backed-off delay for a 0-based step
    ///
    /// Uses exponential backoff formula: delay = initial * multiplier^step,
    /// capped at `max_delay`, then jittered if enabled.
    pub fn calculate_delay(&self, step: u32) -> Duration {
        let exponent = i32::try_from(step).unwrap_or(i32::MAX);
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let capped_delay_secs = base_delay_secs.min(self.max_delay.as_secs_f64());

        let final_delay_secs = if self.use_jitter {
            Self::add_jitter(capped_delay_secs, self.jitter_percent)
        } else {
            capped_delay_secs
        };

        Duration::try_from_secs_f64(final_delay_secs).unwrap_or(self.max_delay)
    }

    /// Applies random variation in range [delay * (1-jitter), delay * (1+jitter)]
    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-jitter_range..=jitter_range);

        (delay_secs + jitter).max(0.0)
    }
}

/// Tracks the current run of consecutive receive failures
#[derive(Debug, Clone, Default)]
pub struct FailureStreak {
    consecutive_failures: u32,
}

impl FailureStreak {
    /// Create an empty streak
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return the length of the run including it
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    /// End the run after a successful receive
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Length of the current run
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay the backoff prescribes for the current run
    pub fn delay(&self, backoff: &ReceiveBackoff, transient: bool) -> Duration {
        backoff.delay_for(self.consecutive_failures, transient)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
