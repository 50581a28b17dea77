//! Hub REST broadcaster compatible with Azure SignalR Service.
//!
//! Each broadcast is a single request:
//!
//! ```text
//! POST {endpoint}/api/v1/hubs/{hub}
//! Authorization: Bearer <HS256 token, aud = request URL>
//!
//! {"target": "<client method>", "arguments": ["<payload>"]}
//! ```
//!
//! The access token is signed with the `AccessKey` from the connection string
//! and is valid for one hour.

use super::{BroadcastError, NotificationBroadcaster};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

#[cfg(test)]
#[path = "signalr_tests.rs"]
mod tests;

/// Lifetime of the bearer token attached to each request
const TOKEN_LIFETIME_MINUTES: i64 = 60;

/// Longest response body echoed into a `Rejected` error
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Parsed SignalR connection string
///
/// Format: `Endpoint=https://<name>.service.signalr.net;AccessKey=<key>;Version=1.0;`
/// with an optional `Port=<port>`.
#[derive(Clone)]
pub struct SignalRConnection {
    endpoint: Url,
    access_key: String,
}

impl std::fmt::Debug for SignalRConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRConnection")
            .field("endpoint", &self.endpoint.as_str())
            .field("access_key", &"<redacted>")
            .finish()
    }
}

impl SignalRConnection {
    /// Parse a connection string
    pub fn parse(connection_string: &str) -> Result<Self, BroadcastError> {
        let mut endpoint = None;
        let mut access_key = None;
        let mut port = None;

        for (index, segment) in connection_string.split(';').enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (key, value) = segment.split_once('=').ok_or_else(|| {
                configuration(format!(
                    "connection string segment {} is not a key=value pair",
                    index
                ))
            })?;

            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.trim().to_string()),
                "accesskey" => access_key = Some(value.trim().to_string()),
                "port" => {
                    let parsed = value.trim().parse::<u16>().map_err(|_| {
                        configuration(format!("connection string port '{}' is invalid", value))
                    })?;
                    port = Some(parsed);
                }
                _ => {}
            }
        }

        let endpoint = endpoint
            .ok_or_else(|| configuration("connection string has no Endpoint".to_string()))?;
        let access_key = access_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| configuration("connection string has no AccessKey".to_string()))?;

        let mut endpoint = Url::parse(endpoint.trim_end_matches('/')).map_err(|e| {
            configuration(format!("connection string endpoint is not a valid URL: {}", e))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(configuration(
                "connection string endpoint cannot be used as a base URL".to_string(),
            ));
        }
        if let Some(port) = port {
            endpoint
                .set_port(Some(port))
                .map_err(|_| configuration("connection string port cannot be applied".to_string()))?;
        }

        Ok(Self {
            endpoint,
            access_key,
        })
    }

    /// Service endpoint including any port override
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Claims of the hub access token
#[derive(Debug, Serialize, Deserialize)]
struct HubAccessClaims {
    aud: String,
    iat: i64,
    exp: i64,
}

/// Request body of a hub broadcast
#[derive(Serialize)]
struct HubInvocation<'a> {
    target: &'a str,
    arguments: [&'a str; 1],
}

/// Broadcaster that sends every notification to all clients of one hub
pub struct SignalRBroadcaster {
    http_client: HttpClient,
    hub_url: String,
    target: String,
    encoding_key: EncodingKey,
}

impl SignalRBroadcaster {
    /// Create a broadcaster for `hub`, invoking `target` on every client
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Configuration`] if the connection string is
    /// malformed, the hub or target is empty, or the HTTP client cannot be built.
    pub fn new(
        connection: SignalRConnection,
        hub: &str,
        target: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, BroadcastError> {
        let hub = hub.trim();
        if hub.is_empty() || !hub.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(configuration(format!(
                "hub name '{}' must be non-empty and contain only letters, digits or underscores",
                hub
            )));
        }

        let target = target.into();
        if target.trim().is_empty() {
            return Err(configuration("hub target must not be empty".to_string()));
        }

        let base = connection.endpoint.as_str().trim_end_matches('/');
        let hub_url = format!("{}/api/v1/hubs/{}", base, hub.to_ascii_lowercase());

        let http_client = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| configuration(format!("HTTP client could not be built: {}", e)))?;

        Ok(Self {
            http_client,
            hub_url,
            target,
            encoding_key: EncodingKey::from_secret(connection.access_key.as_bytes()),
        })
    }

    /// Create a broadcaster from a connection string
    pub fn from_connection_string(
        connection_string: &str,
        hub: &str,
        target: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, BroadcastError> {
        let connection = SignalRConnection::parse(connection_string)?;
        Self::new(connection, hub, target, request_timeout)
    }

    /// URL every broadcast is posted to
    pub fn hub_url(&self) -> &str {
        &self.hub_url
    }

    fn access_token(&self) -> Result<String, BroadcastError> {
        let now = Utc::now();
        let claims = HubAccessClaims {
            aud: self.hub_url.clone(),
            iat: now.timestamp(),
            exp: (now + ChronoDuration::minutes(TOKEN_LIFETIME_MINUTES)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| configuration(format!("failed to sign hub access token: {}", e)))
    }
}

#[async_trait]
impl NotificationBroadcaster for SignalRBroadcaster {
    async fn broadcast(
        &self,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<(), BroadcastError> {
        if cancel.is_cancelled() {
            return Err(BroadcastError::Cancelled);
        }

        let body = serde_json::to_vec(&HubInvocation {
            target: &self.target,
            arguments: [payload],
        })?;

        let request = self
            .http_client
            .post(&self.hub_url)
            .bearer_auth(self.access_token()?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BroadcastError::Cancelled),
            response = request => response.map_err(|e| BroadcastError::Unavailable {
                message: if e.is_timeout() {
                    format!("request timed out: {}", e)
                } else {
                    format!("request failed: {}", e)
                },
            })?,
        };

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Notification broadcast to hub");
            return Ok(());
        }

        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BroadcastError::Cancelled),
            text = response.text() => text.unwrap_or_default(),
        };
        Err(BroadcastError::Rejected {
            status: status.as_u16(),
            message: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }
}

fn configuration(message: String) -> BroadcastError {
    BroadcastError::Configuration { message }
}
