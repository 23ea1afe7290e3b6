//! OAuth token lifecycle management
//!
//! Authorization-code exchange and refresh-token rotation for OAuth-based
//! providers, plus the proactive [`TokenManager::ensure_valid`] check the
//! orchestrator runs before every send. Tokens are refreshed ahead of expiry
//! by a grace window larger than the slowest expected provider round-trip, so
//! a token can never expire mid-request.

use crate::domain::{Connection, ConnectionPatch, OAuthToken};
use crate::error::{DispatchError, Result};
use crate::provider::{OAuthEndpoints, API_TIMEOUT};
use crate::store::CredentialStore;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Lead time before expiry at which a refresh is triggered
pub const TOKEN_GRACE_SECONDS: i64 = 500;

/// Token set returned by a provider's token endpoint
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    /// Present only when the provider rotates refresh tokens
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

impl TokenSet {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(self.expires_in)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
}

/// One-time exchange of an authorization code for a token set.
pub async fn exchange_authorization_code(
    http: &reqwest::Client,
    token_url: &str,
    code: &str,
    redirect_uri: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<TokenSet> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ];
    token_request(http, token_url, &params).await
}

/// Obtain a fresh access token from a refresh token.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenSet> {
    let params = [
        ("grant_type", "refresh_token"),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("refresh_token", refresh_token),
    ];
    token_request(http, token_url, &params).await
}

async fn token_request(
    http: &reqwest::Client,
    token_url: &str,
    params: &[(&str, &str)],
) -> Result<TokenSet> {
    let response = http
        .post(token_url)
        .timeout(API_TIMEOUT)
        .form(params)
        .send()
        .await
        .map_err(|e| DispatchError::Auth(format!("Token request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| DispatchError::Auth(format!("Failed to read token response: {}", e)))?;
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();

    // Zoho reports OAuth errors with HTTP 200 and an `error` field, so both
    // paths are checked.
    if !status.is_success() || parsed.get("error").is_some() {
        let message = parsed
            .get("error_description")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| {
                parsed
                    .get("error")
                    .and_then(|v| v.as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body));
        return Err(DispatchError::Auth(message));
    }

    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| DispatchError::Auth(format!("Failed to parse token response: {}", e)))?;

    if token.access_token.is_empty() || token.expires_in <= 0 {
        return Err(DispatchError::Auth(
            "Failed to retrieve authentication tokens. Please try to re-authenticate.".to_string(),
        ));
    }

    Ok(TokenSet {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_in: token.expires_in,
    })
}

/// Keeps connection tokens valid across sends.
pub struct TokenManager {
    http: reqwest::Client,
    store: Arc<dyn CredentialStore>,
    grace: Duration,
}

impl TokenManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_grace(store, Duration::seconds(TOKEN_GRACE_SECONDS))
    }

    pub fn with_grace(store: Arc<dyn CredentialStore>, grace: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            store,
            grace,
        }
    }

    /// Ensure the connection's access token outlives the grace window,
    /// refreshing and persisting it when it does not.
    ///
    /// The patch is applied atomically through the credential store, and the
    /// previous refresh token is retained unless the provider rotated it. An
    /// irrecoverable refresh failure surfaces as [`DispatchError::Auth`];
    /// the connection must be re-authorized out of band.
    pub async fn ensure_valid(
        &self,
        connection: &Connection,
        endpoints: &OAuthEndpoints,
    ) -> Result<Connection> {
        let token = connection.oauth.as_ref().ok_or_else(|| {
            DispatchError::Auth(format!(
                "Connection '{}' has no OAuth tokens. Please authenticate first.",
                connection.id
            ))
        })?;

        if !token.expires_within(self.grace) {
            return Ok(connection.clone());
        }

        let client_id = connection.credential("client_id").unwrap_or_default();
        let client_secret = connection.credential("client_secret").unwrap_or_default();

        tracing::debug!(
            connection_id = %connection.id,
            "Access token inside grace window, refreshing"
        );

        let set = refresh_access_token(
            &self.http,
            &endpoints.token_url,
            client_id,
            client_secret,
            &token.refresh_token,
        )
        .await
        .map_err(|e| DispatchError::Auth(format!("Failed to refresh token: {}", e)))?;

        let refreshed = OAuthToken {
            access_token: set.access_token.clone(),
            refresh_token: set
                .refresh_token
                .clone()
                .unwrap_or_else(|| token.refresh_token.clone()),
            expires_at: set.expires_at(),
        };

        let patch = ConnectionPatch {
            oauth: Some(refreshed),
            ..Default::default()
        };
        self.store.apply_patch(&connection.id, patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockCredentialStore;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection(expires_in: Duration) -> Connection {
        Connection {
            id: "zoho-1".to_string(),
            provider_type: "zoho".to_string(),
            from_email: "me@zohomail.com".to_string(),
            from_name: None,
            priority: 1,
            credentials: HashMap::from([
                ("client_id".to_string(), "cid".to_string()),
                ("client_secret".to_string(), "secret".to_string()),
            ]),
            oauth: Some(OAuthToken {
                access_token: "old-at".to_string(),
                refresh_token: "old-rt".to_string(),
                expires_at: Utc::now() + expires_in,
            }),
        }
    }

    #[tokio::test]
    async fn test_valid_token_issues_no_refresh() {
        // Store must not be touched at all
        let store = MockCredentialStore::new();
        let manager = TokenManager::new(Arc::new(store));

        let conn = connection(Duration::seconds(3600));
        let endpoints = OAuthEndpoints {
            token_url: "http://unused.invalid/token".to_string(),
        };

        let result = manager.ensure_valid(&conn, &endpoints).await.unwrap();
        assert_eq!(result.oauth.unwrap().access_token, "old-at");
    }

    #[tokio::test]
    async fn test_expiring_token_refreshes_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-rt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-at",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = MockCredentialStore::new();
        store.expect_apply_patch().returning(|id, patch| {
            let mut conn = connection(Duration::seconds(0));
            conn.id = id.to_string();
            conn.oauth = patch.oauth;
            Ok(conn)
        });

        let manager = TokenManager::new(Arc::new(store));
        let conn = connection(Duration::seconds(100));
        let endpoints = OAuthEndpoints {
            token_url: format!("{}/oauth/v2/token", server.uri()),
        };

        let updated = manager.ensure_valid(&conn, &endpoints).await.unwrap();
        let token = updated.oauth.unwrap();
        assert_eq!(token.access_token, "new-at");
        // No rotation in the response: old refresh token retained
        assert_eq!(token.refresh_token, "old-rt");
        assert!(token.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_adopted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-at",
                "refresh_token": "rotated-rt",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let mut store = MockCredentialStore::new();
        store.expect_apply_patch().returning(|id, patch| {
            let mut conn = connection(Duration::seconds(0));
            conn.id = id.to_string();
            conn.oauth = patch.oauth;
            Ok(conn)
        });

        let manager = TokenManager::new(Arc::new(store));
        let conn = connection(Duration::seconds(100));
        let endpoints = OAuthEndpoints {
            token_url: format!("{}/oauth/v2/token", server.uri()),
        };

        let updated = manager.ensure_valid(&conn, &endpoints).await.unwrap();
        assert_eq!(updated.oauth.unwrap().refresh_token, "rotated-rt");
    }

    #[tokio::test]
    async fn test_refresh_failure_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "refresh token revoked"
            })))
            .mount(&server)
            .await;

        let manager = TokenManager::new(Arc::new(MockCredentialStore::new()));
        let conn = connection(Duration::seconds(100));
        let endpoints = OAuthEndpoints {
            token_url: format!("{}/oauth/v2/token", server.uri()),
        };

        let err = manager.ensure_valid(&conn, &endpoints).await.unwrap_err();
        assert!(matches!(err, DispatchError::Auth(_)));
        assert!(err.to_string().contains("refresh token revoked"));
    }

    #[tokio::test]
    async fn test_missing_tokens_is_auth_error() {
        let manager = TokenManager::new(Arc::new(MockCredentialStore::new()));
        let mut conn = connection(Duration::seconds(100));
        conn.oauth = None;
        let endpoints = OAuthEndpoints {
            token_url: "http://unused.invalid/token".to_string(),
        };

        assert!(matches!(
            manager.ensure_valid(&conn, &endpoints).await,
            Err(DispatchError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_code_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let set = exchange_authorization_code(
            &http,
            &format!("{}/oauth/v2/token", server.uri()),
            "the-code",
            "https://app.example.com/cb",
            "cid",
            "secret",
        )
        .await
        .unwrap();

        assert_eq!(set.access_token, "at");
        assert_eq!(set.refresh_token.as_deref(), Some("rt"));
        assert!(set.expires_at() > Utc::now());
    }

    #[tokio::test]
    async fn test_token_response_without_access_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"expires_in": 3600})))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = refresh_access_token(&http, &server.uri(), "cid", "secret", "rt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("re-authenticate"));
    }
}
