//! Unified error handling for the dispatch core

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors raised by the stages that run before an adapter takes over.
///
/// Adapters themselves never return errors from `send`: every failure path
/// there is folded into a [`crate::domain::SendResult`]. This taxonomy covers
/// the credential store, token manager, and orchestration stages.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    #[error("Permanent provider error: {0}")]
    PermanentProvider(String),

    #[error("Credential encryption error: {0}")]
    Crypto(#[from] crate::crypto::CipherError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DispatchError {
    /// Whether a repeated attempt may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::TransientProvider(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DispatchError::Configuration("missing api_key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing api_key");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DispatchError::TransientProvider("503".to_string()).is_retryable());
        assert!(!DispatchError::Configuration("bad".to_string()).is_retryable());
        assert!(!DispatchError::Auth("expired".to_string()).is_retryable());
        assert!(!DispatchError::PermanentProvider("400".to_string()).is_retryable());
    }

    #[test]
    fn test_error_conversion() {
        let err: DispatchError = anyhow::anyhow!("something went wrong").into();
        assert!(matches!(err, DispatchError::Internal(_)));
    }
}
