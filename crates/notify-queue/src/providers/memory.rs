//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-memory queue that:
//! - Leases received messages for a caller-chosen duration
//! - Tracks the delivery count of every message
//! - Makes a message visible again once its lease expires without a delete
//! - Accepts deletes only from the holder of the current lease
//!
//! Lease expiry is measured with `tokio::time::Instant`, so tests running on a
//! paused tokio clock can expire leases deterministically.

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::{LeaseHandle, MessageId, QueueMessage, Timestamp};
use crate::provider::ProviderType;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Longest lease handed out, matching the storage service limit of seven days
const MAX_LEASE_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue with metadata
struct StoredMessage {
    message_id: MessageId,
    body: String,
    inserted_at: Timestamp,
    delivery_count: u32,
    lease: Option<ActiveLease>,
}

impl StoredMessage {
    /// Check if message can be handed out
    fn is_visible(&self, now: Instant) -> bool {
        match &self.lease {
            Some(lease) => now >= lease.expires_at,
            None => true,
        }
    }
}

/// The lease held by whoever received the message last
struct ActiveLease {
    handle: String,
    expires_at: Instant,
}

// ============================================================================
// InMemoryQueue
// ============================================================================

/// In-memory queue shared between clones
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    messages: Arc<Mutex<VecDeque<StoredMessage>>>,
}

impl InMemoryQueue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message to the back of the queue
    pub fn enqueue(&self, body: impl Into<String>) -> MessageId {
        let message_id = MessageId::new();
        self.lock().push_back(StoredMessage {
            message_id: message_id.clone(),
            body: body.into(),
            inserted_at: Timestamp::now(),
            delivery_count: 0,
            lease: None,
        });
        message_id
    }

    /// Number of messages not yet deleted, leased or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if every message has been deleted
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of messages a receive would currently return
    pub fn visible_len(&self) -> usize {
        let now = Instant::now();
        self.lock().iter().filter(|m| m.is_visible(now)).count()
    }

    /// Delivery count of a message that has not been deleted
    pub fn delivery_count(&self, message_id: &MessageId) -> Option<u32> {
        self.lock()
            .iter()
            .find(|m| &m.message_id == message_id)
            .map(|m| m.delivery_count)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<StoredMessage>> {
        // A panic while holding the lock cannot leave a message half-updated.
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn receive(
        &self,
        max_messages: u32,
        lease_duration: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let now = Instant::now();
        let lease_duration = lease_duration.min(MAX_LEASE_DURATION);
        let lease_expires_at = Timestamp::from_datetime(
            chrono::Utc::now()
                + chrono::Duration::from_std(lease_duration)
                    .unwrap_or_else(|_| chrono::Duration::zero()),
        );

        let mut messages = self.lock();
        let received = messages
            .iter_mut()
            .filter(|m| m.is_visible(now))
            .take(max_messages as usize)
            .map(|stored| {
                let handle = uuid::Uuid::new_v4().to_string();
                stored.delivery_count += 1;
                stored.lease = Some(ActiveLease {
                    handle: handle.clone(),
                    expires_at: now + lease_duration,
                });

                QueueMessage {
                    id: stored.message_id.clone(),
                    body: stored.body.clone(),
                    delivery_attempt_count: stored.delivery_count,
                    lease: LeaseHandle::new(handle, lease_expires_at.clone()),
                    inserted_at: Some(stored.inserted_at.clone()),
                }
            })
            .collect();

        Ok(received)
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut messages = self.lock();

        let position = messages.iter().position(|stored| {
            stored.message_id == message.id
                && stored.lease.as_ref().is_some_and(|lease| {
                    lease.handle == message.lease.handle() && now < lease.expires_at
                })
        });

        match position {
            Some(index) => {
                messages.remove(index);
                Ok(())
            }
            None => Err(QueueError::MessageNotFound {
                message_id: message.id.to_string(),
            }),
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
