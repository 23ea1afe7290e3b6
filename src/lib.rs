//! MailBridge Core - Multi-Provider Email Dispatch
//!
//! This crate provides the core functionality for routing transactional
//! email through pluggable provider adapters (Emailit, Zoho Mail), with
//! encrypted credential storage, OAuth token lifecycle management, and a
//! delivery log.

pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod log;
pub mod oauth;
pub mod provider;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{Dispatcher, RetryPolicy};
pub use domain::{Connection, SendRequest, SendResult};
pub use error::{DispatchError, Result};
pub use provider::{ProviderAdapter, ProviderRegistry};
pub use store::{CredentialStore, EncryptedCredentialStore};
