//! Azure Storage Queue provider implementation using the HTTP REST API.
//!
//! This module talks to the queue service directly over HTTP instead of going
//! through an SDK, which keeps the provider small and lets unit tests run
//! against mocked HTTP responses.
//!
//! ## Operations
//!
//! - **Get Messages**: `GET {endpoint}/{queue}/messages?numofmessages=N&visibilitytimeout=S`
//!   leases up to 32 messages; the visibility timeout is the lease duration.
//! - **Delete Message**: `DELETE {endpoint}/{queue}/messages/{id}?popreceipt=...`
//!   removes a message using the pop receipt of its current lease.
//!
//! ## Authentication
//!
//! - **Shared Key**: requests are signed with HMAC-SHA256 using the account key
//! - **SAS token**: the token is appended to every request URL
//!
//! ## Message Encoding
//!
//! The storage SDKs base64 encode message text by default. The provider decodes
//! it unless [`MessageEncoding::Text`] is configured; text that does not decode
//! is handed through verbatim so that one malformed message cannot wedge a batch.

use crate::client::QueueClient;
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{LeaseHandle, MessageId, QueueMessage, QueueName, Timestamp};
use crate::provider::{AzureStorageQueueConfig, MessageEncoding, ProviderType};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client as HttpClient, Method, StatusCode};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[cfg(test)]
#[path = "azure_storage_tests.rs"]
mod tests;

/// REST API version sent with every request
const STORAGE_API_VERSION: &str = "2021-08-06";

/// Service limit on the visibility timeout, in seconds
const MAX_VISIBILITY_TIMEOUT_SECONDS: u64 = 604_800;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Error Types
// ============================================================================

/// Azure Storage Queue specific errors
#[derive(Debug, thiserror::Error)]
pub enum AzureStorageError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Message not found or pop receipt stale: {0}")]
    MessageNotFound(String),

    #[error("Storage service error ({status}): {code} - {message}")]
    ServiceError {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Request rejected ({status}): {code} - {message}")]
    RequestRejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Response parsing failed: {0}")]
    SerializationError(#[from] SerializationError),
}

impl AzureStorageError {
    /// Map storage error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::NetworkError(message) => QueueError::ConnectionFailed { message },
            Self::Timeout(duration) => QueueError::Timeout { duration },
            Self::QueueNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            Self::MessageNotFound(message_id) => QueueError::MessageNotFound { message_id },
            Self::ServiceError {
                status,
                code,
                message,
            } => QueueError::ProviderError {
                provider: ProviderType::AzureStorage.to_string(),
                code: format!("{} {}", status, code),
                message,
            },
            Self::RequestRejected {
                status,
                code,
                message,
            } => QueueError::ConfigurationError(ConfigurationError::Invalid {
                message: format!("request rejected ({} {}): {}", status, code, message),
            }),
            Self::ConfigurationError(message) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message })
            }
            Self::SerializationError(error) => QueueError::SerializationError(error),
        }
    }
}

// ============================================================================
// Shared Key Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Shared Key signer for the queue service.
///
/// The signature is an HMAC-SHA256, keyed with the decoded account key, over:
/// 1. The verb and the eleven standard headers (all empty for our requests)
/// 2. The canonicalized `x-ms-*` headers, sorted by name
/// 3. The canonicalized resource: `/{account}{path}` plus sorted query parameters
#[derive(Clone)]
struct SharedKeySigner {
    account: String,
    mac: HmacSha256,
}

impl SharedKeySigner {
    fn new(account: String, account_key: &str) -> Result<Self, AzureStorageError> {
        let key = general_purpose::STANDARD
            .decode(account_key.trim())
            .map_err(|e| {
                AzureStorageError::ConfigurationError(format!(
                    "account key is not valid base64: {}",
                    e
                ))
            })?;
        let mac = HmacSha256::new_from_slice(&key).map_err(|e| {
            AzureStorageError::ConfigurationError(format!("account key rejected: {}", e))
        })?;

        Ok(Self { account, mac })
    }

    /// Build the `Authorization` header value for a request without a body
    fn authorization(&self, method: &Method, url: &Url, ms_headers: &[(&str, &str)]) -> String {
        let string_to_sign = self.string_to_sign(method, url, ms_headers);
        let signature = self.sign(&string_to_sign);
        format!("SharedKey {}:{}", self.account, signature)
    }

    fn string_to_sign(&self, method: &Method, url: &Url, ms_headers: &[(&str, &str)]) -> String {
        let mut headers: Vec<(String, &str)> = ms_headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value))
            .collect();

        let mut query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.into_owned()))
            .collect();
        query.sort();
        let mut canonical_resource = format!("/{}{}", self.account, url.path());
        for (name, value) in query {
            canonical_resource.push_str(&format!("\n{}:{}", name, value));
        }

        // Content-Encoding, Content-Language, Content-Length, Content-MD5,
        // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
        // If-Unmodified-Since, Range: all empty for body-less requests.
        format!(
            "{}\n{}{}{}",
            method.as_str(),
            "\n".repeat(11),
            canonical_headers,
            canonical_resource
        )
    }

    fn sign(&self, string_to_sign: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(string_to_sign.as_bytes());
        general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// How requests are authorized
#[derive(Clone)]
enum Credentials {
    SharedKey(SharedKeySigner),
    Sas(String),
}

// ============================================================================
// Azure Storage Queue Provider
// ============================================================================

/// Response data the provider needs from a REST call
struct RestResponse {
    status: StatusCode,
    error_code: Option<String>,
    body: String,
}

/// Azure Storage Queue client bound to a single queue
///
/// ## Thread Safety
///
/// The provider is stateless apart from the pooled HTTP client and can be shared
/// across async tasks using `Arc`.
pub struct AzureStorageQueueProvider {
    http_client: HttpClient,
    endpoint: Url,
    queue_name: QueueName,
    credentials: Credentials,
    message_encoding: MessageEncoding,
    request_timeout: Duration,
}

impl AzureStorageQueueProvider {
    /// Create new Azure Storage Queue provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if:
    /// - The connection string cannot be parsed
    /// - Neither an account key nor a SAS token is available
    /// - The endpoint is not a valid base URL
    /// - The account key is not valid base64
    pub fn new(
        mut config: AzureStorageQueueConfig,
        queue_name: QueueName,
    ) -> Result<Self, QueueError> {
        config.apply_connection_string()?;

        let endpoint = config.endpoint()?;
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            QueueError::ConfigurationError(ConfigurationError::Invalid {
                message: format!("queue endpoint '{}' is not a valid URL: {}", endpoint, e),
            })
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(QueueError::ConfigurationError(ConfigurationError::Invalid {
                message: format!("queue endpoint '{}' cannot be used as a base URL", endpoint),
            }));
        }

        let credentials = match (&config.sas_token, &config.account_key) {
            (Some(sas), _) => Credentials::Sas(sas.trim_start_matches('?').to_string()),
            (None, Some(key)) => {
                let account = config.account_name.clone().ok_or_else(|| {
                    QueueError::ConfigurationError(ConfigurationError::Missing {
                        key: "account_name".to_string(),
                    })
                })?;
                Credentials::SharedKey(
                    SharedKeySigner::new(account, key).map_err(|e| e.to_queue_error())?,
                )
            }
            (None, None) => {
                return Err(QueueError::ConfigurationError(ConfigurationError::Missing {
                    key: "account_key or sas_token".to_string(),
                }))
            }
        };

        let request_timeout = config
            .request_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http_client = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                QueueError::ConfigurationError(ConfigurationError::Invalid {
                    message: format!("HTTP client could not be built: {}", e),
                })
            })?;

        Ok(Self {
            http_client,
            endpoint,
            queue_name,
            credentials,
            message_encoding: config.message_encoding,
            request_timeout,
        })
    }

    /// Build `{endpoint}/{queue}/messages[/{id}]?{params}`
    fn messages_url(
        &self,
        message_id: Option<&MessageId>,
        params: &[(&str, String)],
    ) -> Result<Url, AzureStorageError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                AzureStorageError::ConfigurationError(
                    "queue endpoint cannot be used as a base URL".to_string(),
                )
            })?;
            segments
                .pop_if_empty()
                .push(self.queue_name.as_str())
                .push("messages");
            if let Some(id) = message_id {
                segments.push(id.as_str());
            }
        }

        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                query.append_pair(name, value);
            }
        }

        if let Credentials::Sas(token) = &self.credentials {
            let combined = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, token),
                _ => token.clone(),
            };
            url.set_query(Some(&combined));
        }

        Ok(url)
    }

    /// Send a signed, body-less request
    async fn execute(&self, method: Method, url: Url) -> Result<RestResponse, AzureStorageError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let ms_headers = [
            ("x-ms-date", date.as_str()),
            ("x-ms-version", STORAGE_API_VERSION),
        ];

        let mut request = self.http_client.request(method.clone(), url.clone());
        for (name, value) in ms_headers {
            request = request.header(name, value);
        }
        if let Credentials::SharedKey(signer) = &self.credentials {
            request = request.header(
                "Authorization",
                signer.authorization(&method, &url, &ms_headers),
            );
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AzureStorageError::Timeout(self.request_timeout)
            } else if e.is_connect() {
                AzureStorageError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AzureStorageError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let error_code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| {
            AzureStorageError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        Ok(RestResponse {
            status,
            error_code,
            body,
        })
    }

    /// Map a non-success response to a storage error
    fn error_from_response(
        &self,
        response: &RestResponse,
        message_id: Option<&MessageId>,
    ) -> AzureStorageError {
        let (xml_code, xml_message) = parse_error_response(&response.body);
        let code = response
            .error_code
            .clone()
            .or(xml_code)
            .unwrap_or_else(|| "Unknown".to_string());
        let message = xml_message.unwrap_or_else(|| "Unknown error".to_string());
        let status = response.status.as_u16();

        match (code.as_str(), message_id) {
            ("QueueNotFound", _) | ("QueueBeingDeleted", _) => {
                AzureStorageError::QueueNotFound(self.queue_name.to_string())
            }
            ("MessageNotFound", Some(id)) | ("PopReceiptMismatch", Some(id)) => {
                AzureStorageError::MessageNotFound(id.to_string())
            }
            (_, Some(id)) if status == 404 => AzureStorageError::MessageNotFound(id.to_string()),
            (_, None) if status == 404 => {
                AzureStorageError::QueueNotFound(self.queue_name.to_string())
            }
            _ if status == 401 || status == 403 => {
                AzureStorageError::Authentication(format!("{}: {}", code, message))
            }
            _ if status >= 500 || status == 408 || status == 429 => {
                AzureStorageError::ServiceError {
                    status,
                    code,
                    message,
                }
            }
            _ => AzureStorageError::RequestRejected {
                status,
                code,
                message,
            },
        }
    }

    /// Parse the Get Messages XML response
    fn parse_receive_response(
        &self,
        xml: &str,
        lease_duration: Duration,
    ) -> Result<Vec<QueueMessage>, AzureStorageError> {
        use quick_xml::events::Event;
        use quick_xml::Reader;

        // Message text is opaque, so surrounding whitespace is kept.
        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);

        let mut messages = Vec::new();
        let mut current: Option<RawMessage> = None;
        let mut field: Option<MessageField> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let name = e.name();
                    if name.as_ref() == b"QueueMessage" {
                        current = Some(RawMessage::default());
                        field = None;
                    } else {
                        field = MessageField::from_element(name.as_ref());
                    }
                }
                Ok(Event::Text(e)) => {
                    if let (Some(raw), Some(target)) = (current.as_mut(), field) {
                        let text = e.unescape().map_err(|e| SerializationError::InvalidXml {
                            message: e.to_string(),
                        })?;
                        raw.set(target, text.into_owned());
                    }
                }
                Ok(Event::End(ref e)) => {
                    if e.name().as_ref() == b"QueueMessage" {
                        if let Some(raw) = current.take() {
                            messages.push(self.convert_message(raw, lease_duration)?);
                        }
                    }
                    field = None;
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(SerializationError::InvalidXml {
                        message: e.to_string(),
                    }
                    .into())
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(messages)
    }

    fn convert_message(
        &self,
        raw: RawMessage,
        lease_duration: Duration,
    ) -> Result<QueueMessage, AzureStorageError> {
        let id_text = raw.message_id.ok_or_else(|| SerializationError::MissingElement {
            element: "MessageId".to_string(),
        })?;
        let id: MessageId = id_text
            .parse()
            .map_err(|_| SerializationError::InvalidValue {
                element: "MessageId".to_string(),
                value: id_text.clone(),
            })?;

        let pop_receipt = raw.pop_receipt.ok_or_else(|| SerializationError::MissingElement {
            element: "PopReceipt".to_string(),
        })?;

        let dequeue_text = raw.dequeue_count.unwrap_or_else(|| "1".to_string());
        let delivery_attempt_count =
            dequeue_text
                .parse::<u32>()
                .map_err(|_| SerializationError::InvalidValue {
                    element: "DequeueCount".to_string(),
                    value: dequeue_text.clone(),
                })?;

        let lease_expires_at = raw
            .time_next_visible
            .as_deref()
            .and_then(|value| Timestamp::parse_rfc1123(value).ok())
            .unwrap_or_else(|| {
                Timestamp::from_datetime(
                    Utc::now()
                        + chrono::Duration::from_std(lease_duration)
                            .unwrap_or_else(|_| chrono::Duration::zero()),
                )
            });

        let inserted_at = raw
            .insertion_time
            .as_deref()
            .and_then(|value| Timestamp::parse_rfc1123(value).ok());

        let body = self.decode_body(&id, raw.message_text.unwrap_or_default());

        Ok(QueueMessage {
            id,
            body,
            delivery_attempt_count,
            lease: LeaseHandle::new(pop_receipt, lease_expires_at),
            inserted_at,
        })
    }

    fn decode_body(&self, id: &MessageId, text: String) -> String {
        match self.message_encoding {
            MessageEncoding::Text => text,
            MessageEncoding::Base64 => {
                let decoded = general_purpose::STANDARD
                    .decode(text.trim())
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok());
                match decoded {
                    Some(body) => body,
                    None => {
                        warn!(
                            message_id = %id,
                            "Message text is not base64 encoded UTF-8; passing it through unchanged"
                        );
                        text
                    }
                }
            }
        }
    }
}

#[async_trait]
impl QueueClient for AzureStorageQueueProvider {
    async fn receive(
        &self,
        max_messages: u32,
        lease_duration: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let count = max_messages.clamp(1, ProviderType::AzureStorage.max_batch_size());
        let visibility_timeout = lease_duration
            .as_secs()
            .clamp(1, MAX_VISIBILITY_TIMEOUT_SECONDS);

        let url = self
            .messages_url(
                None,
                &[
                    ("numofmessages", count.to_string()),
                    ("visibilitytimeout", visibility_timeout.to_string()),
                ],
            )
            .map_err(|e| e.to_queue_error())?;

        let response = self
            .execute(Method::GET, url)
            .await
            .map_err(|e| e.to_queue_error())?;

        if !response.status.is_success() {
            return Err(self.error_from_response(&response, None).to_queue_error());
        }

        let messages = self
            .parse_receive_response(&response.body, lease_duration)
            .map_err(|e| e.to_queue_error())?;

        debug!(
            queue = %self.queue_name,
            count = messages.len(),
            "Received messages from storage queue"
        );

        Ok(messages)
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let url = self
            .messages_url(
                Some(&message.id),
                &[("popreceipt", message.lease.handle().to_string())],
            )
            .map_err(|e| e.to_queue_error())?;

        let response = self
            .execute(Method::DELETE, url)
            .await
            .map_err(|e| e.to_queue_error())?;

        if response.status.is_success() {
            return Ok(());
        }

        Err(self
            .error_from_response(&response, Some(&message.id))
            .to_queue_error())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AzureStorage
    }
}

// ============================================================================
// XML Helpers
// ============================================================================

/// Elements of a `<QueueMessage>` the provider reads
#[derive(Debug, Clone, Copy)]
enum MessageField {
    MessageId,
    InsertionTime,
    PopReceipt,
    TimeNextVisible,
    DequeueCount,
    MessageText,
}

impl MessageField {
    fn from_element(name: &[u8]) -> Option<Self> {
        match name {
            b"MessageId" => Some(Self::MessageId),
            b"InsertionTime" => Some(Self::InsertionTime),
            b"PopReceipt" => Some(Self::PopReceipt),
            b"TimeNextVisible" => Some(Self::TimeNextVisible),
            b"DequeueCount" => Some(Self::DequeueCount),
            b"MessageText" => Some(Self::MessageText),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct RawMessage {
    message_id: Option<String>,
    insertion_time: Option<String>,
    pop_receipt: Option<String>,
    time_next_visible: Option<String>,
    dequeue_count: Option<String>,
    message_text: Option<String>,
}

impl RawMessage {
    fn set(&mut self, field: MessageField, value: String) {
        let slot = match field {
            MessageField::MessageText => {
                self.message_text = Some(value);
                return;
            }
            MessageField::MessageId => &mut self.message_id,
            MessageField::InsertionTime => &mut self.insertion_time,
            MessageField::PopReceipt => &mut self.pop_receipt,
            MessageField::TimeNextVisible => &mut self.time_next_visible,
            MessageField::DequeueCount => &mut self.dequeue_count,
        };
        *slot = Some(value.trim().to_string());
    }
}

/// Extract `<Code>` and `<Message>` from a storage error body
fn parse_error_response(xml: &str) -> (Option<String>, Option<String>) {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Code" => in_code = true,
                b"Message" => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    (error_code, error_message)
}
