//! Provider connection (credential set) domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// A configured provider credential set used for one outbound identity.
///
/// `credentials` holds provider-specific fields as declared by the adapter's
/// field schema; fields marked `encrypt` there are stored ciphered by the
/// credential store and arrive here decrypted when loaded for a send.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Connection {
    pub id: String,

    /// Must match a registered adapter's `provider_type`
    pub provider_type: String,

    #[validate(email)]
    pub from_email: String,

    pub from_name: Option<String>,

    /// Lower value wins when a caller picks among several connections
    pub priority: u32,

    pub credentials: HashMap<String, String>,

    /// Present only for OAuth-based providers
    pub oauth: Option<OAuthToken>,
}

impl Connection {
    pub fn credential(&self, field: &str) -> Option<&str> {
        self.credentials.get(field).map(String::as_str)
    }

    /// The `From:` line for this connection, honoring an explicit name.
    pub fn from_address(&self) -> String {
        match &self.from_name {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.from_email),
            _ => self.from_email.clone(),
        }
    }
}

/// OAuth token set attached to a connection.
///
/// Mutated in place on every refresh. A refresh must never discard a
/// still-valid refresh token unless the provider rotates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl OAuthToken {
    /// Whether the access token expires within `grace` from now.
    pub fn expires_within(&self, grace: chrono::Duration) -> bool {
        Utc::now() + grace > self.expires_at
    }
}

/// Partial update applied to a stored connection.
///
/// Only the carried fields are touched; unrelated credentials survive the
/// patch untouched (no partial overwrite of the rest of the record).
#[derive(Debug, Clone, Default)]
pub struct ConnectionPatch {
    pub credentials: HashMap<String, String>,
    pub oauth: Option<OAuthToken>,
    pub from_email: Option<String>,
}

impl ConnectionPatch {
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty() && self.oauth.is_none() && self.from_email.is_none()
    }
}

/// Listing view of a connection. Credential fields the adapter schema marks
/// as encrypted are masked and never leave the store in plaintext.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub id: String,
    pub provider_type: String,
    pub from_email: String,
    pub from_name: Option<String>,
    pub priority: u32,
    pub credentials: HashMap<String, String>,
}

/// Mask used in place of encrypted credential values in listings
pub const MASKED_VALUE: &str = "***";

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn connection() -> Connection {
        Connection {
            id: "conn-1".to_string(),
            provider_type: "emailit".to_string(),
            from_email: "noreply@example.com".to_string(),
            from_name: Some("Example".to_string()),
            priority: 1,
            credentials: HashMap::from([("api_key".to_string(), "em_123".to_string())]),
            oauth: None,
        }
    }

    #[test]
    fn test_from_address() {
        assert_eq!(connection().from_address(), "Example <noreply@example.com>");

        let mut bare = connection();
        bare.from_name = None;
        assert_eq!(bare.from_address(), "noreply@example.com");
    }

    #[test]
    fn test_credential_lookup() {
        let conn = connection();
        assert_eq!(conn.credential("api_key"), Some("em_123"));
        assert_eq!(conn.credential("missing"), None);
    }

    #[test]
    fn test_token_expiry_grace() {
        let token = OAuthToken {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_at: Utc::now() + Duration::seconds(100),
        };
        assert!(token.expires_within(Duration::seconds(500)));
        assert!(!token.expires_within(Duration::seconds(10)));
    }

    #[test]
    fn test_patch_emptiness() {
        assert!(ConnectionPatch::default().is_empty());

        let patch = ConnectionPatch {
            from_email: Some("sender@example.com".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_connection_validation() {
        assert!(connection().validate().is_ok());

        let mut bad = connection();
        bad.from_email = "not-an-email".to_string();
        assert!(bad.validate().is_err());
    }
}
