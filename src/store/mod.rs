//! Credential store
//!
//! Holds per-connection provider configuration, encrypted at rest. Which
//! credential fields are ciphered is driven by the adapter's field schema
//! (`encrypt` flag); OAuth tokens are always ciphered. Listings mask
//! encrypted fields; plaintext secrets only ever flow to adapters via
//! [`CredentialStore::get`].

use crate::crypto::FieldCipher;
use crate::domain::{Connection, ConnectionPatch, ConnectionSummary, OAuthToken};
use crate::domain::connection::MASKED_VALUE;
use crate::error::{DispatchError, Result};
use crate::provider::ProviderRegistry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use validator::Validate;

/// Read/write access to connection credential sets.
///
/// Mid-send updates (token refresh) and settings updates may race; per
/// connection the update is atomic and last-writer-wins, and a patch never
/// overwrites fields it does not carry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load a connection with credentials decrypted for adapter use
    async fn get(&self, id: &str) -> Result<Option<Connection>>;

    /// List connections with encrypted fields masked
    async fn list(&self) -> Result<Vec<ConnectionSummary>>;

    /// Insert or replace a connection
    async fn upsert(&self, connection: Connection) -> Result<()>;

    /// Apply a partial update atomically, returning the updated connection
    async fn apply_patch(&self, id: &str, patch: ConnectionPatch) -> Result<Connection>;

    /// Id of the connection used when the caller names none
    async fn default_connection(&self) -> Result<Option<String>>;

    async fn set_default_connection(&self, id: &str) -> Result<()>;
}

struct StoreState {
    /// Connections with sensitive fields held as ciphertext
    connections: HashMap<String, Connection>,
    default_connection: Option<String>,
}

/// In-memory credential store with AES-GCM field encryption at rest.
pub struct EncryptedCredentialStore {
    cipher: FieldCipher,
    registry: Arc<ProviderRegistry>,
    state: RwLock<StoreState>,
}

impl EncryptedCredentialStore {
    pub fn new(cipher: FieldCipher, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            cipher,
            registry,
            state: RwLock::new(StoreState {
                connections: HashMap::new(),
                default_connection: None,
            }),
        }
    }

    fn encrypt_token(&self, token: &OAuthToken) -> Result<OAuthToken> {
        Ok(OAuthToken {
            access_token: self.cipher.encrypt(&token.access_token)?,
            refresh_token: self.cipher.encrypt(&token.refresh_token)?,
            expires_at: token.expires_at,
        })
    }

    fn decrypt_token(&self, token: &OAuthToken) -> Result<OAuthToken> {
        Ok(OAuthToken {
            access_token: self.cipher.decrypt(&token.access_token)?,
            refresh_token: self.cipher.decrypt(&token.refresh_token)?,
            expires_at: token.expires_at,
        })
    }

    fn encrypt_connection(&self, mut connection: Connection) -> Result<Connection> {
        let schema = self
            .registry
            .get(&connection.provider_type)
            .map(|a| a.describe_schema());
        for (field, value) in connection.credentials.iter_mut() {
            let encrypt = schema
                .as_ref()
                .map(|s| s.is_encrypted(field))
                .unwrap_or(false);
            if encrypt {
                *value = self.cipher.encrypt(value)?;
            }
        }
        if let Some(token) = &connection.oauth {
            connection.oauth = Some(self.encrypt_token(token)?);
        }
        Ok(connection)
    }

    fn decrypt_connection(&self, mut connection: Connection) -> Result<Connection> {
        let schema = self
            .registry
            .get(&connection.provider_type)
            .map(|a| a.describe_schema());
        for (field, value) in connection.credentials.iter_mut() {
            let encrypt = schema
                .as_ref()
                .map(|s| s.is_encrypted(field))
                .unwrap_or(false);
            if encrypt {
                *value = self.cipher.decrypt(value)?;
            }
        }
        if let Some(token) = &connection.oauth {
            connection.oauth = Some(self.decrypt_token(token)?);
        }
        Ok(connection)
    }
}

#[async_trait]
impl CredentialStore for EncryptedCredentialStore {
    async fn get(&self, id: &str) -> Result<Option<Connection>> {
        let state = self.state.read().await;
        state
            .connections
            .get(id)
            .cloned()
            .map(|c| self.decrypt_connection(c))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<ConnectionSummary>> {
        let state = self.state.read().await;
        let mut summaries: Vec<ConnectionSummary> = state
            .connections
            .values()
            .map(|connection| {
                let schema = self
                    .registry
                    .get(&connection.provider_type)
                    .map(|a| a.describe_schema());
                let credentials = connection
                    .credentials
                    .iter()
                    .map(|(field, value)| {
                        let masked = schema
                            .as_ref()
                            .map(|s| s.is_encrypted(field))
                            .unwrap_or(false);
                        (
                            field.clone(),
                            if masked {
                                MASKED_VALUE.to_string()
                            } else {
                                value.clone()
                            },
                        )
                    })
                    .collect();
                ConnectionSummary {
                    id: connection.id.clone(),
                    provider_type: connection.provider_type.clone(),
                    from_email: connection.from_email.clone(),
                    from_name: connection.from_name.clone(),
                    priority: connection.priority,
                    credentials,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn upsert(&self, connection: Connection) -> Result<()> {
        connection
            .validate()
            .map_err(|e| DispatchError::Configuration(e.to_string()))?;

        let adapter = self.registry.get(&connection.provider_type).ok_or_else(|| {
            DispatchError::Configuration(format!(
                "No provider registered for type '{}'",
                connection.provider_type
            ))
        })?;
        adapter.describe_schema().validate(&connection)?;

        let encrypted = self.encrypt_connection(connection)?;
        let mut state = self.state.write().await;
        state.connections.insert(encrypted.id.clone(), encrypted);
        Ok(())
    }

    async fn apply_patch(&self, id: &str, patch: ConnectionPatch) -> Result<Connection> {
        let mut state = self.state.write().await;
        let stored = state.connections.get_mut(id).ok_or_else(|| {
            DispatchError::Configuration(format!("Connection '{}' not found", id))
        })?;

        let schema = self
            .registry
            .get(&stored.provider_type)
            .map(|a| a.describe_schema());

        for (field, value) in patch.credentials {
            let encrypt = schema
                .as_ref()
                .map(|s| s.is_encrypted(&field))
                .unwrap_or(false);
            let value = if encrypt {
                self.cipher.encrypt(&value)?
            } else {
                value
            };
            stored.credentials.insert(field, value);
        }
        if let Some(token) = patch.oauth {
            stored.oauth = Some(self.encrypt_token(&token)?);
        }
        if let Some(from_email) = patch.from_email {
            stored.from_email = from_email;
        }

        self.decrypt_connection(stored.clone())
    }

    async fn default_connection(&self) -> Result<Option<String>> {
        Ok(self.state.read().await.default_connection.clone())
    }

    async fn set_default_connection(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(id) {
            return Err(DispatchError::Configuration(format!(
                "Connection '{}' not found",
                id
            )));
        }
        state.default_connection = Some(id.to_string());
        Ok(())
    }
}
