//! # Notify Queue
//!
//! Queue client abstraction used by the notification relay to drain a durable,
//! at-least-once message queue.
//!
//! This library provides:
//! - A narrow client interface: batched receive-with-lease and delete-by-lease
//! - Typed errors that separate transient transport faults from permanent
//!   configuration faults
//! - An Azure Storage Queue provider over the REST API
//! - An in-memory provider with real lease semantics for tests and local runs
//!
//! ## Module Organization
//!
//! - [error] - Error types for all queue operations
//! - [message] - Message structures, identifiers and lease handles
//! - [provider] - Provider types and configuration
//! - [client] - Client traits and the client factory
//! - [providers] - Concrete provider implementations

// Module declarations
pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClient, QueueClientFactory, QueueConnector};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{LeaseHandle, MessageId, QueueMessage, QueueName, Timestamp};
pub use provider::{
    AzureStorageQueueConfig, InMemoryConfig, MessageEncoding, ProviderConfig, ProviderType,
    QueueConfig,
};
pub use providers::{AzureStorageQueueProvider, InMemoryQueue};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
