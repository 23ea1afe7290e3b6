//! Configuration management for MailBridge Core

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Crate configuration, read from `MAILBRIDGE_*` environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Base64-encoded 32-byte key for credential encryption at rest
    pub encryption_key: String,
    /// Connection used when a dispatch call names none
    pub default_connection: Option<String>,
    /// Seconds before expiry at which OAuth tokens are refreshed
    pub token_grace_secs: i64,
    /// Retry settings for `dispatch_with_retry`
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            encryption_key: env::var("MAILBRIDGE_ENCRYPTION_KEY")
                .context("MAILBRIDGE_ENCRYPTION_KEY is required")?,
            default_connection: env::var("MAILBRIDGE_DEFAULT_CONNECTION").ok(),
            token_grace_secs: env::var("MAILBRIDGE_TOKEN_GRACE_SECS")
                .unwrap_or_else(|_| crate::oauth::TOKEN_GRACE_SECONDS.to_string())
                .parse()
                .context("Invalid MAILBRIDGE_TOKEN_GRACE_SECS")?,
            retry: RetryConfig {
                max_attempts: env::var("MAILBRIDGE_RETRY_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .context("Invalid MAILBRIDGE_RETRY_MAX_ATTEMPTS")?,
                base_backoff: Duration::from_millis(
                    env::var("MAILBRIDGE_RETRY_BASE_BACKOFF_MS")
                        .unwrap_or_else(|_| "500".to_string())
                        .parse()
                        .context("Invalid MAILBRIDGE_RETRY_BASE_BACKOFF_MS")?,
                ),
            },
        })
    }
}

impl From<&RetryConfig> for crate::dispatch::RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_backoff: config.base_backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; tests touching them share this lock
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_missing_key_is_an_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        env::remove_var("MAILBRIDGE_ENCRYPTION_KEY");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("MAILBRIDGE_ENCRYPTION_KEY"));
    }

    #[test]
    fn test_unparseable_retry_value_is_an_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        env::set_var("MAILBRIDGE_ENCRYPTION_KEY", "a-key");
        env::set_var("MAILBRIDGE_RETRY_MAX_ATTEMPTS", "lots");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("MAILBRIDGE_RETRY_MAX_ATTEMPTS"));

        env::remove_var("MAILBRIDGE_RETRY_MAX_ATTEMPTS");
        env::remove_var("MAILBRIDGE_ENCRYPTION_KEY");
    }

    #[test]
    fn test_defaults() {
        let config = Config {
            encryption_key: "key".to_string(),
            default_connection: None,
            token_grace_secs: crate::oauth::TOKEN_GRACE_SECONDS,
            retry: RetryConfig {
                max_attempts: 3,
                base_backoff: Duration::from_millis(500),
            },
        };
        let policy: crate::dispatch::RetryPolicy = (&config.retry).into();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_backoff, Duration::from_millis(500));
    }
}
