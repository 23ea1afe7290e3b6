//! Zoho Mail provider adapter
//!
//! OAuth-based provider with region-dependent endpoints. Sending goes through
//! `POST /api/accounts/{account_id}/messages` with a `Zoho-oauthtoken` auth
//! header; attachments are uploaded one by one ahead of the send and referenced
//! in the final payload.

use super::{
    extract_error_message, is_retryable_status, AuthOutcome, FieldSchema, FieldSpec,
    OAuthEndpoints, ProviderAdapter, API_TIMEOUT, SEND_TIMEOUT,
};
use crate::domain::{Connection, ConnectionPatch, OAuthToken, Recipient, SendRequest, SendResult};
use crate::oauth::{exchange_authorization_code, refresh_access_token};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

static FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "region",
        required: true,
        encrypt: false,
    },
    FieldSpec {
        name: "client_id",
        required: true,
        encrypt: false,
    },
    FieldSpec {
        name: "client_secret",
        required: true,
        encrypt: true,
    },
    FieldSpec {
        name: "auth_code",
        required: false,
        encrypt: true,
    },
    FieldSpec {
        name: "redirect_url",
        required: false,
        encrypt: false,
    },
    FieldSpec {
        name: "account_id",
        required: false,
        encrypt: false,
    },
];

/// Mail API domain per Zoho region. Unrecognized regions fall back to the
/// `com` domain (forward-compat with regions Zoho adds later); the fallback
/// is logged so a typo does not fail silently.
fn mail_host(region: &str) -> &'static str {
    match region {
        "com" => "mail.zoho.com",
        "in" => "mail.zoho.in",
        "eu" => "mail.zoho.eu",
        "com.au" => "mail.zoho.com.au",
        "jp" => "mail.zoho.jp",
        "ca" => "mail.zohocloud.ca",
        "com.cn" => "mail.zoho.com.cn",
        other => {
            tracing::warn!(region = other, "Unknown Zoho region, falling back to com");
            "mail.zoho.com"
        }
    }
}

fn accounts_region(region: &str) -> &str {
    match region {
        "com" | "in" | "eu" | "com.au" | "jp" | "ca" | "com.cn" => region,
        _ => "com",
    }
}

/// Build the Zoho consent-screen URL a user visits to obtain an
/// authorization code for a new connection.
pub fn zoho_authorize_url(region: &str, client_id: &str, redirect_uri: &str) -> String {
    let mut url = url::Url::parse(&format!(
        "https://accounts.zoho.{}/oauth/v2/auth",
        accounts_region(region)
    ))
    .expect("static Zoho auth URL is valid");
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", "ZohoMail.messages.CREATE ZohoMail.accounts.READ")
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent");
    url.to_string()
}

pub struct ZohoAdapter {
    http: reqwest::Client,
    token_url_override: Option<String>,
    mail_base_override: Option<String>,
}

impl Default for ZohoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ZohoAdapter {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url_override: None,
            mail_base_override: None,
        }
    }

    /// Route token and mail API traffic to fixed endpoints instead of the
    /// region-derived ones (tests, proxies).
    pub fn with_endpoints(token_url: impl Into<String>, mail_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url_override: Some(token_url.into()),
            mail_base_override: Some(mail_base.into().trim_end_matches('/').to_string()),
        }
    }

    fn region<'a>(&self, connection: &'a Connection) -> &'a str {
        connection.credential("region").unwrap_or("com")
    }

    fn token_url(&self, connection: &Connection) -> String {
        self.token_url_override.clone().unwrap_or_else(|| {
            format!(
                "https://accounts.zoho.{}/oauth/v2/token",
                accounts_region(self.region(connection))
            )
        })
    }

    fn mail_base(&self, connection: &Connection) -> String {
        self.mail_base_override
            .clone()
            .unwrap_or_else(|| format!("https://{}", mail_host(self.region(connection))))
    }

    fn format_recipients(recipients: &[Recipient]) -> String {
        recipients
            .iter()
            .map(Recipient::format)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Fetch the primary account id (and its authoritative from address) for
    /// the authenticated user.
    async fn fetch_account_details(
        &self,
        connection: &Connection,
        access_token: &str,
    ) -> Option<(String, Option<String>)> {
        let url = format!("{}/api/accounts", self.mail_base(connection));
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Zoho-oauthtoken {}", access_token))
            .timeout(API_TIMEOUT)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let body: Value = response.json().await.ok()?;
        let account = body.get("data")?.get(0)?;
        let account_id = account.get("accountId")?.as_str()?.to_string();
        let from_email = account
            .get("sendMailDetails")
            .and_then(|d| d.get(0))
            .and_then(|d| d.get("fromAddress"))
            .and_then(|v| v.as_str())
            .map(String::from);
        Some((account_id, from_email))
    }

    /// Upload attachments one by one; each upload returns a reference object
    /// embedded in the send payload. A failed upload is skipped; the email
    /// still goes out without that attachment.
    async fn upload_attachments(
        &self,
        request: &SendRequest,
        connection: &Connection,
        account_id: &str,
        access_token: &str,
    ) -> Vec<Value> {
        let mut references = Vec::new();
        for reference in &request.attachments {
            let data = match reference.resolve().await {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unresolvable Zoho attachment");
                    continue;
                }
            };

            let url = format!(
                "{}/api/accounts/{}/messages/attachments",
                self.mail_base(connection),
                account_id
            );
            let response = self
                .http
                .post(&url)
                .query(&[("fileName", data.name.as_str())])
                .header("Authorization", format!("Zoho-oauthtoken {}", access_token))
                .header("Content-Type", "application/octet-stream")
                .timeout(API_TIMEOUT)
                .body(data.bytes)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Value>().await {
                        Ok(body) => {
                            if let Some(data) = body.get("data") {
                                references.push(data.clone());
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, name = %data.name, "Unreadable Zoho attachment upload response");
                        }
                    }
                }
                Ok(response) => {
                    tracing::warn!(
                        status = response.status().as_u16(),
                        name = %data.name,
                        "Zoho attachment upload rejected, sending without it"
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, name = %data.name, "Zoho attachment upload failed, sending without it");
                }
            }
        }
        references
    }
}

#[async_trait]
impl ProviderAdapter for ZohoAdapter {
    fn provider_type(&self) -> &'static str {
        "zoho"
    }

    fn describe_schema(&self) -> FieldSchema {
        FieldSchema { fields: FIELDS }
    }

    fn requires_oauth(&self) -> bool {
        true
    }

    fn oauth_endpoints(&self, connection: &Connection) -> Option<OAuthEndpoints> {
        Some(OAuthEndpoints {
            token_url: self.token_url(connection),
        })
    }

    /// Full OAuth establishment: exchange a fresh authorization code (or fall
    /// back to the stored refresh token), then resolve the account id used by
    /// the messages API.
    async fn authenticate(&self, connection: &Connection) -> AuthOutcome {
        let client_id = connection.credential("client_id").unwrap_or_default();
        let client_secret = connection.credential("client_secret").unwrap_or_default();
        let token_url = self.token_url(connection);

        let token_set = if let Some(code) = connection
            .credential("auth_code")
            .filter(|c| !c.is_empty())
        {
            let redirect_uri = connection.credential("redirect_url").unwrap_or_default();
            exchange_authorization_code(
                &self.http,
                &token_url,
                code,
                redirect_uri,
                client_id,
                client_secret,
            )
            .await
        } else if let Some(token) = &connection.oauth {
            refresh_access_token(
                &self.http,
                &token_url,
                client_id,
                client_secret,
                &token.refresh_token,
            )
            .await
        } else {
            return AuthOutcome::failed(
                "No authorization code or refresh token provided. Please authenticate first.",
            );
        };

        let token_set = match token_set {
            Ok(set) => set,
            Err(err) => return AuthOutcome::failed(format!("Zoho OAuth error: {}", err)),
        };

        let previous_refresh = connection
            .oauth
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .unwrap_or_default();
        let oauth = OAuthToken {
            access_token: token_set.access_token.clone(),
            refresh_token: token_set.refresh_token.unwrap_or(previous_refresh),
            expires_at: Utc::now() + Duration::seconds(token_set.expires_in),
        };

        let Some((account_id, from_email)) = self
            .fetch_account_details(connection, &oauth.access_token)
            .await
        else {
            return AuthOutcome::failed("Failed to get Zoho account details.");
        };

        let mut patch = ConnectionPatch {
            oauth: Some(oauth),
            from_email,
            ..Default::default()
        };
        patch
            .credentials
            .insert("account_id".to_string(), account_id);

        AuthOutcome::ok("Successfully authenticated with Zoho Mail.", patch)
    }

    async fn send(&self, request: &SendRequest, connection: &Connection) -> SendResult {
        let account_id = match connection.credential("account_id") {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return SendResult::config_error("Failed to get Zoho account details."),
        };

        let access_token = match &connection.oauth {
            Some(token) if !token.access_token.is_empty() => token.access_token.clone(),
            _ => {
                return SendResult::config_error(
                    "Zoho connection has no access token. Please authenticate first.",
                )
            }
        };

        let from = request
            .from_override
            .as_ref()
            .map(Recipient::format)
            .unwrap_or_else(|| connection.from_address());

        let mut payload = json!({
            "fromAddress": from,
            "toAddress": Self::format_recipients(&request.to),
            "subject": request.subject,
            "content": request.body,
            "mailFormat": if request.is_html { "html" } else { "plaintext" },
        });

        if !request.cc.is_empty() {
            payload["ccAddress"] = json!(Self::format_recipients(&request.cc));
        }
        if !request.bcc.is_empty() {
            payload["bccAddress"] = json!(Self::format_recipients(&request.bcc));
        }

        if !request.attachments.is_empty() {
            let references = self
                .upload_attachments(request, connection, &account_id, &access_token)
                .await;
            if !references.is_empty() {
                payload["attachments"] = Value::Array(references);
            }
        }

        let send_url = format!(
            "{}/api/accounts/{}/messages",
            self.mail_base(connection),
            account_id
        );

        let response = self
            .http
            .post(&send_url)
            .header(
                "Authorization",
                format!("Zoho-oauthtoken {}", access_token),
            )
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                return SendResult::failure(
                    format!("Zoho Mail send failed: {}", err),
                    None,
                    true,
                )
            }
        };

        let status = response.status();
        let body: Option<Value> = response.json().await.ok();

        if status == reqwest::StatusCode::OK && body.is_some() {
            let message_id = body
                .as_ref()
                .and_then(|b| b.get("data"))
                .and_then(|d| d.get("messageId"))
                .and_then(|v| v.as_str())
                .map(String::from);
            return SendResult::sent("Email sent successfully via Zoho Mail.", message_id);
        }

        let detail = body
            .as_ref()
            .and_then(|b| b.get("data"))
            .and_then(|d| d.get("errorCode"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| extract_error_message(body.as_ref(), status));

        SendResult::failure(
            format!("Email sending failed via Zoho Mail. {}", detail),
            Some(status.as_u16()),
            is_retryable_status(status),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn connection() -> Connection {
        Connection {
            id: "zoho-1".to_string(),
            provider_type: "zoho".to_string(),
            from_email: "me@zohomail.com".to_string(),
            from_name: Some("Me".to_string()),
            priority: 1,
            credentials: HashMap::from([
                ("region".to_string(), "in".to_string()),
                ("client_id".to_string(), "cid".to_string()),
                ("client_secret".to_string(), "secret".to_string()),
                ("account_id".to_string(), "acc-42".to_string()),
            ]),
            oauth: Some(OAuthToken {
                access_token: "at".to_string(),
                refresh_token: "rt".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
            }),
        }
    }

    #[test]
    fn test_region_domain_map() {
        assert_eq!(mail_host("com"), "mail.zoho.com");
        assert_eq!(mail_host("in"), "mail.zoho.in");
        assert_eq!(mail_host("ca"), "mail.zohocloud.ca");
        assert_eq!(mail_host("com.cn"), "mail.zoho.com.cn");
        // Unknown regions default rather than fail
        assert_eq!(mail_host("mars"), "mail.zoho.com");
        assert_eq!(accounts_region("mars"), "com");
    }

    #[test]
    fn test_region_derived_endpoints() {
        let adapter = ZohoAdapter::new();
        let conn = connection();
        assert_eq!(
            adapter.token_url(&conn),
            "https://accounts.zoho.in/oauth/v2/token"
        );
        assert_eq!(adapter.mail_base(&conn), "https://mail.zoho.in");

        let endpoints = adapter.oauth_endpoints(&conn).unwrap();
        assert!(endpoints.token_url.contains("accounts.zoho.in"));
    }

    #[test]
    fn test_endpoint_overrides() {
        let adapter = ZohoAdapter::with_endpoints("http://localhost/token", "http://localhost/");
        let conn = connection();
        assert_eq!(adapter.token_url(&conn), "http://localhost/token");
        assert_eq!(adapter.mail_base(&conn), "http://localhost");
    }

    #[test]
    fn test_authorize_url() {
        let url = zoho_authorize_url("eu", "cid-1", "https://app.example.com/cb");
        assert!(url.starts_with("https://accounts.zoho.eu/oauth/v2/auth?"));
        assert!(url.contains("client_id=cid-1"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("ZohoMail.messages.CREATE"));
    }

    #[test]
    fn test_recipient_join_has_no_spaces() {
        let joined = ZohoAdapter::format_recipients(&[
            Recipient::new("a@x.com"),
            Recipient::with_name("b@x.com", "B"),
        ]);
        assert_eq!(joined, "a@x.com,B <b@x.com>");
    }

    #[tokio::test]
    async fn test_missing_account_id_fails_before_any_call() {
        let adapter = ZohoAdapter::new();
        let mut conn = connection();
        conn.credentials.remove("account_id");

        let request = SendRequest::new(vec![Recipient::new("to@x.com")], "Hi", "body");
        let result = adapter.send(&request, &conn).await;

        assert!(!result.success);
        assert!(!result.retryable);
        assert_eq!(result.message, "Failed to get Zoho account details.");
    }

    #[tokio::test]
    async fn test_missing_access_token_is_config_error() {
        let adapter = ZohoAdapter::new();
        let mut conn = connection();
        conn.oauth = None;

        let request = SendRequest::new(vec![Recipient::new("to@x.com")], "Hi", "body");
        let result = adapter.send(&request, &conn).await;

        assert!(!result.success);
        assert!(result.message.contains("access token"));
    }

    #[tokio::test]
    async fn test_authenticate_without_code_or_refresh_token() {
        let adapter = ZohoAdapter::new();
        let mut conn = connection();
        conn.oauth = None;

        let outcome = adapter.authenticate(&conn).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("authorization code"));
    }
}
