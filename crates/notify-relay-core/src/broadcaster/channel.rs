//! In-process broadcaster backed by `tokio::sync::broadcast`.

use super::{BroadcastError, NotificationBroadcaster};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;

/// Default number of payloads a slow subscriber may fall behind
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Fan-out of notifications to in-process subscribers.
///
/// Clones share the same channel. A subscriber that falls more than
/// `capacity` payloads behind skips the oldest ones
/// (`RecvError::Lagged`). Broadcasting with no subscribers succeeds.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<String>,
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ChannelBroadcaster {
    /// Create a hub buffering up to `capacity` payloads per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New recipient subscribes to the broadcast stream
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl NotificationBroadcaster for ChannelBroadcaster {
    async fn broadcast(
        &self,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BroadcastError> {
        if cancel.is_cancelled() {
            return Err(BroadcastError::Cancelled);
        }

        match self.sender.send(payload.to_string()) {
            Ok(recipients) => debug!(recipients, "Notification broadcast to subscribers"),
            Err(_) => debug!("No subscribers connected; notification delivered to nobody"),
        }

        Ok(())
    }
}
