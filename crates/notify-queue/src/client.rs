//! Client traits and the factory that builds clients from configuration.

use crate::error::QueueError;
use crate::message::QueueMessage;
use crate::provider::{ProviderConfig, ProviderType, QueueConfig};
use crate::providers::{AzureStorageQueueProvider, InMemoryQueue};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Narrow interface over a durable, at-least-once queue
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive up to `max_messages` visible messages, leasing each for `lease_duration`.
    ///
    /// Returns an empty vector when nothing is visible.
    async fn receive(
        &self,
        max_messages: u32,
        lease_duration: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Permanently remove a message using the lease it was received under.
    ///
    /// Fails with [`QueueError::MessageNotFound`] when the lease expired or the
    /// message was already deleted.
    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Acquires a queue client when a consumer starts
#[async_trait]
pub trait QueueConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn QueueClient>, QueueError>;
}

#[async_trait]
impl QueueConnector for QueueConfig {
    async fn connect(&self) -> Result<Arc<dyn QueueClient>, QueueError> {
        QueueClientFactory::create_client(self.clone()).await
    }
}

#[async_trait]
impl<T> QueueConnector for Arc<T>
where
    T: QueueClient + 'static,
{
    async fn connect(&self) -> Result<Arc<dyn QueueClient>, QueueError> {
        let client: Arc<dyn QueueClient> = self.clone();
        Ok(client)
    }
}

/// Factory for creating queue clients with appropriate providers
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create queue client from configuration
    pub async fn create_client(config: QueueConfig) -> Result<Arc<dyn QueueClient>, QueueError> {
        let client: Arc<dyn QueueClient> = match config.provider {
            ProviderConfig::InMemory(in_memory_config) => {
                let queue = InMemoryQueue::new();
                for body in in_memory_config.seed_messages {
                    queue.enqueue(body);
                }
                Arc::new(queue)
            }
            ProviderConfig::AzureStorage(azure_config) => Arc::new(
                AzureStorageQueueProvider::new(azure_config, config.queue_name.clone())?,
            ),
        };

        info!(
            queue = %config.queue_name,
            provider = %client.provider_type(),
            "Queue client created"
        );

        Ok(client)
    }
}
