//! Queue provider implementations.
//!
//! This module contains concrete implementations of the `QueueClient` trait for
//! different queue backends.

pub mod azure_storage;
pub mod memory;

pub use azure_storage::AzureStorageQueueProvider;
pub use memory::InMemoryQueue;
