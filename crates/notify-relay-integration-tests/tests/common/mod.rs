//! Common test utilities for notify relay integration tests
//!
//! This module provides:
//! - A hub broadcaster whose failures can be scripted per payload
//! - Processor configuration tuned for paused-clock tests
//! - Polling helpers

use async_trait::async_trait;
use notify_relay_core::{
    BroadcastError, CancellationToken, ChannelBroadcaster, NotificationBroadcaster,
    ProcessorConfig,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Scripted Hub
// ============================================================================

/// In-process hub that fails chosen payloads before relaying them
#[allow(dead_code)]
pub struct ScriptedHub {
    channel: ChannelBroadcaster,
    remaining_failures: Mutex<HashMap<String, u32>>,
    attempts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

#[allow(dead_code)]
impl ScriptedHub {
    pub fn new(channel: ChannelBroadcaster) -> Self {
        Self {
            channel,
            remaining_failures: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Spend `delay` on every broadcast without observing cancellation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `times` broadcasts of `payload`
    pub fn fail_times(&self, payload: &str, times: u32) {
        self.remaining_failures
            .lock()
            .unwrap()
            .insert(payload.to_string(), times);
    }

    /// Fail every broadcast of `payload`
    pub fn fail_always(&self, payload: &str) {
        self.fail_times(payload, u32::MAX);
    }

    /// Number of broadcasts attempted for `payload`
    pub fn attempts_for(&self, payload: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == payload)
            .count()
    }
}

#[async_trait]
impl NotificationBroadcaster for ScriptedHub {
    async fn broadcast(
        &self,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BroadcastError> {
        self.attempts.lock().unwrap().push(payload.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = {
            let mut failures = self.remaining_failures.lock().unwrap();
            match failures.get_mut(payload) {
                Some(remaining) if *remaining > 0 => {
                    *remaining = remaining.saturating_sub(1);
                    true
                }
                _ => false,
            }
        };

        if should_fail {
            return Err(BroadcastError::Unavailable {
                message: "hub offline".to_string(),
            });
        }

        self.channel.broadcast(payload, cancel).await
    }
}

// ============================================================================
// Configuration and Polling Helpers
// ============================================================================

/// Processor configuration with short leases and no jitter
#[allow(dead_code)]
pub fn fast_config() -> ProcessorConfig {
    let mut config = ProcessorConfig::default();
    config.polling.lease_duration = Duration::from_secs(1);
    config.polling.idle_backoff = Duration::from_secs(1);
    config.receive_backoff.use_jitter = false;
    config
}

/// Wait until `condition` holds, advancing the clock in 10ms steps
#[allow(dead_code)]
pub async fn eventually<F>(description: &str, condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Condition not reached: {}", description);
}

/// Receive the next notification or fail after `timeout`
#[allow(dead_code)]
pub async fn next_notification(
    subscriber: &mut tokio::sync::broadcast::Receiver<String>,
    timeout: Duration,
) -> String {
    tokio::time::timeout(timeout, subscriber.recv())
        .await
        .expect("notification arrives in time")
        .expect("hub channel open")
}
