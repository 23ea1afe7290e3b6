//! Dispatch orchestrator
//!
//! Resolves the connection, keeps OAuth tokens fresh, invokes the provider
//! adapter, and records the outcome. Every attempt produces exactly one
//! `SendResult` and one delivery log entry; logging is best-effort and never
//! alters the result it records.

use crate::domain::{DeliveryLogEntry, DeliveryStatus, SendRequest, SendResult};
use crate::error::DispatchError;
use crate::log::DeliveryLog;
use crate::oauth::TokenManager;
use crate::provider::{ProviderAdapter, ProviderRegistry};
use crate::store::CredentialStore;
use std::sync::Arc;
use std::time::Duration;

/// Backoff schedule for [`Dispatcher::dispatch_with_retry`].
///
/// Applied only to results the adapter marked retryable; configuration and
/// auth failures are terminal on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based); doubles each retry
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn CredentialStore>,
    tokens: TokenManager,
    log: Arc<dyn DeliveryLog>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn CredentialStore>,
        log: Arc<dyn DeliveryLog>,
    ) -> Self {
        let tokens = TokenManager::new(Arc::clone(&store));
        Self {
            registry,
            store,
            tokens,
            log,
        }
    }

    /// Replace the token manager, e.g. to shrink the refresh grace in tests
    pub fn with_token_manager(mut self, tokens: TokenManager) -> Self {
        self.tokens = tokens;
        self
    }

    /// Send one message over the named connection, or the store's default
    /// when `connection_id` is `None`.
    ///
    /// Never panics and never returns `Err`: every failure mode collapses
    /// into a `SendResult` so the caller sees one uniform outcome shape.
    pub async fn dispatch(
        &self,
        request: &SendRequest,
        connection_id: Option<&str>,
    ) -> SendResult {
        let resolved_id = match connection_id {
            Some(id) => Some(id.to_string()),
            None => match self.store.default_connection().await {
                Ok(id) => id,
                Err(e) => {
                    return SendResult::config_error(format!(
                        "Could not resolve default connection: {}",
                        e
                    ))
                }
            },
        };
        let Some(resolved_id) = resolved_id else {
            return SendResult::config_error(
                "No connection specified and no default connection is configured.",
            );
        };

        let connection = match self.store.get(&resolved_id).await {
            Ok(Some(connection)) => connection,
            Ok(None) => {
                let result = SendResult::config_error(format!(
                    "Connection '{}' does not exist.",
                    resolved_id
                ));
                self.record_outcome(&resolved_id, &result).await;
                return result;
            }
            Err(e) => {
                let result =
                    SendResult::config_error(format!("Failed to load connection: {}", e));
                self.record_outcome(&resolved_id, &result).await;
                return result;
            }
        };

        let Some(adapter) = self.registry.get(&connection.provider_type) else {
            let result = SendResult::config_error(format!(
                "No provider registered for type '{}'.",
                connection.provider_type
            ));
            self.record_outcome(&resolved_id, &result).await;
            return result;
        };

        if let Err(e) = adapter.describe_schema().validate(&connection) {
            let result = SendResult::config_error(e.to_string());
            self.record_outcome(&resolved_id, &result).await;
            return result;
        }

        let connection = match self.refresh_if_needed(adapter.as_ref(), connection).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(
                    connection_id = %resolved_id,
                    error = %e,
                    "token refresh failed, aborting send"
                );
                let result = SendResult::failure(e.to_string(), None, false);
                self.record_outcome(&resolved_id, &result).await;
                return result;
            }
        };

        let result = adapter.send(request, &connection).await;
        self.record_outcome(&resolved_id, &result).await;
        result
    }

    /// Like [`dispatch`](Self::dispatch), re-attempting retryable failures
    /// per `policy`. Each attempt is logged individually.
    pub async fn dispatch_with_retry(
        &self,
        request: &SendRequest,
        connection_id: Option<&str>,
        policy: &RetryPolicy,
    ) -> SendResult {
        let mut attempt = 1;
        loop {
            let result = self.dispatch(request, connection_id).await;
            if result.success || !result.retryable || attempt >= policy.max_attempts {
                return result;
            }
            let delay = policy.backoff_for(attempt);
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying transient send failure"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Record a `Blocked` outcome decided by an external policy layer.
    ///
    /// Pass-through only: the orchestrator never classifies a message as
    /// blocked itself.
    pub async fn record_blocked(&self, connection_id: &str) {
        let entry = DeliveryLogEntry::new(DeliveryStatus::Blocked, connection_id, None);
        if let Err(e) = self.log.record(entry).await {
            tracing::error!(connection_id, error = %e, "failed to record blocked entry");
        }
    }

    async fn refresh_if_needed(
        &self,
        adapter: &dyn ProviderAdapter,
        connection: crate::domain::Connection,
    ) -> crate::error::Result<crate::domain::Connection> {
        if !adapter.requires_oauth() {
            return Ok(connection);
        }
        let endpoints = adapter.oauth_endpoints(&connection).ok_or_else(|| {
            DispatchError::Configuration(format!(
                "Connection '{}' is missing OAuth endpoint configuration.",
                connection.id
            ))
        })?;
        self.tokens.ensure_valid(&connection, &endpoints).await
    }

    async fn record_outcome(&self, connection_id: &str, result: &SendResult) {
        let status = if result.success {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Failed
        };
        let entry = DeliveryLogEntry::new(
            status,
            connection_id,
            result.provider_message_id.clone(),
        );
        if let Err(e) = self.log.record(entry).await {
            tracing::error!(connection_id, error = %e, "failed to record delivery entry");
        }
    }
}
