//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name following Azure Storage Queue naming rules
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        // Validate length
        if name.len() < 3 || name.len() > 63 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 3-63 characters".to_string(),
            });
        }

        // Validate characters (lowercase ASCII alphanumeric and hyphens)
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only lowercase ASCII alphanumeric characters and hyphens allowed"
                    .to_string(),
            });
        }

        // Validate no consecutive hyphens or leading/trailing hyphens
        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading/trailing hyphens or consecutive hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for QueueName {
    fn default() -> Self {
        Self("notifications".to_string())
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

/// Queue-assigned identifier of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parse an RFC 1123 timestamp as used by the storage REST API
    pub fn parse_rfc1123(value: &str) -> Result<Self, chrono::ParseError> {
        let dt = DateTime::parse_from_rfc2822(value)?;
        Ok(Self(dt.with_timezone(&Utc)))
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Opaque token proving the current lease on a received message.
///
/// Only the holder of the most recent lease can delete the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseHandle {
    handle: String,
    expires_at: Timestamp,
}

impl LeaseHandle {
    /// Create new lease handle
    pub fn new(handle: String, expires_at: Timestamp) -> Self {
        Self { handle, expires_at }
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Time at which the message becomes visible to other consumers again
    pub fn expires_at(&self) -> &Timestamp {
        &self.expires_at
    }

    /// Check if the lease has expired
    pub fn is_expired(&self) -> bool {
        Timestamp::now() >= self.expires_at
    }
}

/// A message received from the queue under a lease
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: MessageId,
    /// Opaque payload; never interpreted by the queue layer
    pub body: String,
    /// Number of times the queue has handed this message out, including this one
    pub delivery_attempt_count: u32,
    pub lease: LeaseHandle,
    pub inserted_at: Option<Timestamp>,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
