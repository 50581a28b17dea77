//! Provider types and configuration.

use crate::error::ConfigurationError;
use crate::message::QueueName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AzureStorage,
    InMemory,
}

impl ProviderType {
    /// Maximum number of messages a single receive call may return
    pub const fn max_batch_size(&self) -> u32 {
        match self {
            Self::AzureStorage => 32,
            Self::InMemory => 1024,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AzureStorage => write!(f, "AzureStorage"),
            Self::InMemory => write!(f, "InMemory"),
        }
    }
}

/// Configuration for queue client initialization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue to drain
    pub queue_name: QueueName,

    /// Backend that hosts the queue
    pub provider: ProviderConfig,
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    AzureStorage(AzureStorageQueueConfig),
    InMemory(InMemoryConfig),
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::InMemory(InMemoryConfig::default())
    }
}

impl ProviderConfig {
    /// Provider selected by this configuration
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::AzureStorage(_) => ProviderType::AzureStorage,
            Self::InMemory(_) => ProviderType::InMemory,
        }
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    /// Bodies enqueued when the provider is created
    pub seed_messages: Vec<String>,
}

/// How message text is encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEncoding {
    /// Message text is base64 encoded UTF-8 (storage SDK default)
    #[default]
    Base64,
    /// Message text is the payload itself
    Text,
}

/// Azure Storage Queue configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureStorageQueueConfig {
    /// Storage connection string; when set it fills any field left empty below
    pub connection_string: Option<String>,

    /// Storage account name
    pub account_name: Option<String>,

    /// Base64 encoded storage account key for Shared Key authorization
    pub account_key: Option<String>,

    /// Shared access signature used instead of the account key
    pub sas_token: Option<String>,

    /// Queue service endpoint; derived from the account name when absent
    pub queue_endpoint: Option<String>,

    /// Encoding of the message text
    pub message_encoding: MessageEncoding,

    /// Per-request timeout in seconds
    pub request_timeout_seconds: Option<u64>,
}

impl AzureStorageQueueConfig {
    /// Build a configuration from a storage connection string
    ///
    /// Recognises `DefaultEndpointsProtocol`, `AccountName`, `AccountKey`,
    /// `EndpointSuffix`, `QueueEndpoint` and `SharedAccessSignature`.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, ConfigurationError> {
        let mut config = Self {
            connection_string: Some(connection_string.to_string()),
            ..Default::default()
        };
        config.apply_connection_string()?;
        Ok(config)
    }

    /// Fill unset fields from `connection_string`, if one is configured
    pub fn apply_connection_string(&mut self) -> Result<(), ConfigurationError> {
        let Some(connection_string) = self.connection_string.clone() else {
            return Ok(());
        };

        let parts = parse_connection_string(&connection_string)?;

        if self.account_name.is_none() {
            self.account_name = parts.get("accountname").cloned();
        }
        if self.account_key.is_none() {
            self.account_key = parts.get("accountkey").cloned();
        }
        if self.sas_token.is_none() {
            self.sas_token = parts.get("sharedaccesssignature").cloned();
        }
        if self.queue_endpoint.is_none() {
            self.queue_endpoint = match parts.get("queueendpoint") {
                Some(endpoint) => Some(endpoint.clone()),
                None => self.account_name.as_ref().map(|account| {
                    let protocol = parts
                        .get("defaultendpointsprotocol")
                        .map(String::as_str)
                        .unwrap_or("https");
                    let suffix = parts
                        .get("endpointsuffix")
                        .map(String::as_str)
                        .unwrap_or("core.windows.net");
                    format!("{}://{}.queue.{}", protocol, account, suffix)
                }),
            };
        }

        Ok(())
    }

    /// Queue service endpoint without a trailing slash
    pub fn endpoint(&self) -> Result<String, ConfigurationError> {
        if let Some(endpoint) = &self.queue_endpoint {
            return Ok(endpoint.trim_end_matches('/').to_string());
        }

        match &self.account_name {
            Some(account) => Ok(format!("https://{}.queue.core.windows.net", account)),
            None => Err(ConfigurationError::Missing {
                key: "account_name or queue_endpoint".to_string(),
            }),
        }
    }
}

/// Split `Key=Value;Key=Value` into a map keyed by lowercase key.
///
/// Values may themselves contain `=` (base64 keys, SAS tokens).
fn parse_connection_string(
    connection_string: &str,
) -> Result<HashMap<String, String>, ConfigurationError> {
    let mut parts = HashMap::new();

    for (index, segment) in connection_string.split(';').enumerate() {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (key, value) =
            segment
                .split_once('=')
                .ok_or_else(|| ConfigurationError::ConnectionString {
                    message: format!("segment {} is not a key=value pair", index),
                })?;

        parts.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    if parts.is_empty() {
        return Err(ConfigurationError::ConnectionString {
            message: "connection string is empty".to_string(),
        });
    }

    Ok(parts)
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
