//! Provider adapters
//!
//! One adapter per third-party email API. Each adapter translates a
//! normalized [`SendRequest`] into the provider's wire format, issues the
//! bounded HTTP call, and folds the outcome (success, provider error or
//! transport failure) into a [`SendResult`]. Nothing escapes `send` as an
//! error.

pub mod emailit;
pub mod registry;
pub mod zoho;

use crate::domain::{Connection, ConnectionPatch, SendRequest, SendResult};
use crate::error::{DispatchError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;

pub use emailit::EmailitAdapter;
pub use registry::ProviderRegistry;
pub use zoho::ZohoAdapter;

/// Timeout for auth and auxiliary API calls (token exchange, account lookup,
/// attachment uploads)
pub const API_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);
/// Timeout for the send call itself
pub const SEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// One credential field an adapter expects on its connections
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    /// Encrypted at rest and masked in listings
    pub encrypt: bool,
}

/// Declared credential schema of an adapter, used by the credential store for
/// validation and encryption decisions
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub fields: &'static [FieldSpec],
}

impl FieldSchema {
    pub fn is_encrypted(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name && f.encrypt)
    }

    /// Check that every required field is present and non-empty.
    pub fn validate(&self, connection: &Connection) -> Result<()> {
        for field in self.fields.iter().filter(|f| f.required) {
            match connection.credential(field.name) {
                Some(value) if !value.is_empty() => {}
                _ => {
                    return Err(DispatchError::Configuration(format!(
                        "Connection '{}' is missing required field '{}'",
                        connection.id, field.name
                    )))
                }
            }
        }
        Ok(())
    }
}

/// OAuth endpoints an adapter derives from its connection (region-dependent)
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub token_url: String,
}

/// Result of an adapter's `authenticate` call.
///
/// A successful outcome may carry a [`ConnectionPatch`] with fresh tokens or
/// provider-reported account data to persist on the connection.
#[derive(Debug)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: String,
    pub patch: ConnectionPatch,
}

impl AuthOutcome {
    pub fn ok(message: impl Into<String>, patch: ConnectionPatch) -> Self {
        Self {
            success: true,
            message: message.into(),
            patch,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            patch: ConnectionPatch::default(),
        }
    }
}

/// Common capability set of all provider adapters.
///
/// New providers implement this trait and register with the
/// [`ProviderRegistry`]; the orchestrator never changes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry key, e.g. `"emailit"`
    fn provider_type(&self) -> &'static str;

    /// Credential fields this adapter expects on a connection
    fn describe_schema(&self) -> FieldSchema;

    /// Whether sends require a valid OAuth token
    fn requires_oauth(&self) -> bool {
        false
    }

    /// Token endpoint for OAuth adapters, derived from connection data
    fn oauth_endpoints(&self, _connection: &Connection) -> Option<OAuthEndpoints> {
        None
    }

    /// Verify (and for OAuth providers, establish) the connection credentials
    async fn authenticate(&self, connection: &Connection) -> AuthOutcome;

    /// Send one email. Never returns an error: every failure becomes a
    /// `SendResult` with `success: false`.
    async fn send(&self, request: &SendRequest, connection: &Connection) -> SendResult;
}

/// Whether a repeated attempt against this status may succeed.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Fixed fallback messages keyed by HTTP status, used when the response body
/// carries nothing human-readable.
pub(crate) fn default_status_message(status: StatusCode) -> String {
    match status {
        StatusCode::BAD_REQUEST => "Bad request. Please check your email data.".to_string(),
        StatusCode::UNAUTHORIZED => "Unauthorized. Please check your API key.".to_string(),
        StatusCode::FORBIDDEN => "Forbidden. Access denied.".to_string(),
        StatusCode::NOT_FOUND => "Not found. Please check the API endpoint.".to_string(),
        StatusCode::UNPROCESSABLE_ENTITY => {
            "Validation failed. The provider rejected the request.".to_string()
        }
        StatusCode::TOO_MANY_REQUESTS => {
            "Rate limit exceeded. Please try again later.".to_string()
        }
        StatusCode::INTERNAL_SERVER_ERROR => {
            "Internal server error. Please try again later.".to_string()
        }
        other => format!("HTTP error {} occurred.", other.as_u16()),
    }
}

/// Extract a human-readable error from a provider response body.
///
/// Precedence: explicit `message` field, then `error` (a string, or an
/// object's `message` key, or "Unknown error" for an object carrying
/// neither), then the first entry of an `errors` array, then the fixed
/// status table.
pub(crate) fn extract_error_message(
    body: Option<&serde_json::Value>,
    status: StatusCode,
) -> String {
    if let Some(body) = body {
        if let Some(message) = body.get("message").and_then(|v| v.as_str()) {
            return message.to_string();
        }
        if let Some(error) = body.get("error") {
            if let Some(text) = error.as_str() {
                return text.to_string();
            }
            if let Some(text) = error.get("message").and_then(|v| v.as_str()) {
                return text.to_string();
            }
            if error.is_object() {
                return "Unknown error".to_string();
            }
        }
        if let Some(first) = body.get("errors").and_then(|v| v.as_array()).and_then(|a| a.first()) {
            if let Some(text) = first.as_str() {
                return text.to_string();
            }
            if let Some(text) = first.get("message").and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    default_status_message(status)
}
