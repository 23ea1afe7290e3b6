//! Emailit provider adapter
//!
//! Single-call JSON API: `POST /v1/emails` with bearer auth; attachments are
//! embedded inline as base64 blobs. Success is HTTP 200 or 202.

use super::{
    extract_error_message, is_retryable_status, AuthOutcome, FieldSchema, FieldSpec,
    ProviderAdapter, SEND_TIMEOUT,
};
use crate::domain::{Connection, ConnectionPatch, Recipient, SendRequest, SendResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://api.emailit.com";

static FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "api_key",
    required: true,
    encrypt: true,
}];

pub struct EmailitAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl Default for EmailitAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailitAdapter {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the adapter at a different API host (tests, proxies).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn send_url(&self) -> String {
        format!("{}/v1/emails", self.base_url)
    }

    fn format_list(recipients: &[Recipient]) -> String {
        recipients
            .iter()
            .map(Recipient::format)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Build the JSON send payload. Attachment references that fail to
    /// resolve are skipped; the email still goes out without them.
    async fn build_payload(&self, request: &SendRequest, connection: &Connection) -> Value {
        let from = request
            .from_override
            .as_ref()
            .map(Recipient::format)
            .unwrap_or_else(|| connection.from_address());

        let mut payload = json!({
            "from": from,
            "to": Self::format_list(&request.to),
            "subject": request.subject,
        });

        if request.is_html {
            payload["html"] = json!(request.body);
        } else {
            payload["text"] = json!(request.body);
        }

        if let Some(reply_to) = request.reply_to.first() {
            payload["reply_to"] = json!(reply_to.email);
        }

        let mut headers = serde_json::Map::new();
        if !request.cc.is_empty() {
            headers.insert("cc".to_string(), json!(Self::format_list(&request.cc)));
        }
        if !request.bcc.is_empty() {
            headers.insert("bcc".to_string(), json!(Self::format_list(&request.bcc)));
        }
        if !headers.is_empty() {
            payload["headers"] = Value::Object(headers);
        }

        let mut attachments = Vec::new();
        for reference in &request.attachments {
            match reference.resolve().await {
                Ok(data) => attachments.push(json!({
                    "filename": data.name,
                    "content": BASE64.encode(&data.bytes),
                    "content_type": data.mime_type,
                })),
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unresolvable Emailit attachment");
                }
            }
        }
        if !attachments.is_empty() {
            payload["attachments"] = Value::Array(attachments);
        }

        payload
    }
}

#[async_trait]
impl ProviderAdapter for EmailitAdapter {
    fn provider_type(&self) -> &'static str {
        "emailit"
    }

    fn describe_schema(&self) -> FieldSchema {
        FieldSchema { fields: FIELDS }
    }

    async fn authenticate(&self, connection: &Connection) -> AuthOutcome {
        // Emailit has no dedicated auth handshake: the API key is verified on
        // the first send.
        match connection.credential("api_key") {
            Some(key) if !key.is_empty() => {
                AuthOutcome::ok("Emailit connection ready.", ConnectionPatch::default())
            }
            _ => AuthOutcome::failed("Emailit connection is missing an API key."),
        }
    }

    async fn send(&self, request: &SendRequest, connection: &Connection) -> SendResult {
        let api_key = match connection.credential("api_key") {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => return SendResult::config_error("Emailit connection is missing an API key."),
        };

        let payload = self.build_payload(request, connection).await;

        let response = self
            .http
            .post(self.send_url())
            .bearer_auth(&api_key)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                return SendResult::failure(format!("Emailit send failed: {}", err), None, true)
            }
        };

        let status = response.status();
        let body: Option<Value> = response.json().await.ok();

        if status == reqwest::StatusCode::OK || status == reqwest::StatusCode::ACCEPTED {
            let message_id = body
                .as_ref()
                .and_then(|b| b.get("id"))
                .and_then(|v| v.as_str())
                .map(String::from);
            return SendResult::sent("Email sent successfully via Emailit.", message_id);
        }

        let mut message = format!(
            "Email sending failed via Emailit: {}",
            extract_error_message(body.as_ref(), status)
        );
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            message.push_str(
                " Your sending domain must be verified in Emailit before you can send emails; \
                 verify it in your Emailit dashboard at https://app.emailit.com/domains",
            );
        }

        SendResult::failure(message, Some(status.as_u16()), is_retryable_status(status))
    }
}
