//! Notification broadcasting.
//!
//! A broadcaster fans a single opaque payload out to every live recipient. The
//! processor only cares whether the broadcast succeeded; every failure kind is
//! handled by the same retry/drop policy.
//!
//! Implementations:
//! - [`ChannelBroadcaster`] - in-process hub over a tokio broadcast channel
//! - [`SignalRBroadcaster`] - hub REST API compatible with Azure SignalR Service

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod channel;
pub mod signalr;

pub use channel::ChannelBroadcaster;
pub use signalr::{SignalRBroadcaster, SignalRConnection};

/// Errors produced while broadcasting a notification
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Broadcast cancelled")]
    Cancelled,

    #[error("Broadcast endpoint unavailable: {message}")]
    Unavailable { message: String },

    #[error("Broadcast rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid broadcaster configuration: {message}")]
    Configuration { message: String },

    #[error("Failed to serialize broadcast request: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delivers a payload to all connected recipients
#[async_trait]
pub trait NotificationBroadcaster: Send + Sync {
    /// Broadcast `payload` to every connected recipient.
    ///
    /// Must return [`BroadcastError::Cancelled`] promptly once `cancel` fires.
    async fn broadcast(&self, payload: &str, cancel: &CancellationToken)
        -> Result<(), BroadcastError>;
}

#[async_trait]
impl<T> NotificationBroadcaster for Arc<T>
where
    T: NotificationBroadcaster + ?Sized,
{
    async fn broadcast(
        &self,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BroadcastError> {
        (**self).broadcast(payload, cancel).await
    }
}
