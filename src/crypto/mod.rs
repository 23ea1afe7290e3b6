//! AES-256-GCM encryption for credentials at rest
//!
//! Connection credentials whose field schema is marked `encrypt` (API keys,
//! client secrets, OAuth tokens) are stored as ciphertext and only decrypted
//! when an adapter needs them for a send.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use thiserror::Error;

/// Encryption error types
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Invalid key: must be exactly 32 bytes (256 bits)")]
    InvalidKeyLength,

    #[error("Invalid base64 encoding: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid ciphertext format")]
    InvalidCiphertextFormat,
}

/// Symmetric cipher for individual credential fields.
///
/// Ciphertext wire format is `base64(nonce):base64(ciphertext)` with a random
/// 12-byte nonce per encryption, so encrypting the same plaintext twice never
/// yields the same stored value.
#[derive(Clone)]
pub struct FieldCipher {
    key: [u8; 32],
}

impl FieldCipher {
    /// Create a cipher from a raw 32-byte key
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Create a cipher from a base64-encoded 32-byte key
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let bytes = BASE64.decode(encoded)?;
        if bytes.len() != 32 {
            return Err(CipherError::InvalidKeyLength);
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    /// Create a cipher from the `MAILBRIDGE_ENCRYPTION_KEY` environment variable
    pub fn from_env() -> Result<Self, CipherError> {
        let encoded = std::env::var("MAILBRIDGE_ENCRYPTION_KEY")
            .map_err(|_| CipherError::InvalidKeyLength)?;
        Self::from_base64(&encoded)
    }

    /// Encrypt a plaintext credential field
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|_| CipherError::EncryptionFailed)?;

        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::EncryptionFailed)?;

        Ok(format!(
            "{}:{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(&ciphertext)
        ))
    }

    /// Decrypt a field previously produced by [`FieldCipher::encrypt`]
    pub fn decrypt(&self, encrypted: &str) -> Result<String, CipherError> {
        let (nonce_b64, ciphertext_b64) = encrypted
            .split_once(':')
            .ok_or(CipherError::InvalidCiphertextFormat)?;

        let nonce_bytes = BASE64.decode(nonce_b64)?;
        if nonce_bytes.len() != 12 {
            return Err(CipherError::InvalidCiphertextFormat);
        }
        let ciphertext = BASE64.decode(ciphertext_b64)?;

        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|_| CipherError::DecryptionFailed)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CipherError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> FieldCipher {
        FieldCipher::new([0x24u8; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let plaintext = "em_api_key_1234567890";

        let encrypted = cipher.encrypt(plaintext).unwrap();
        assert_ne!(encrypted, plaintext);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_random_nonce_differs_per_encryption() {
        let cipher = test_cipher();
        let a = cipher.encrypt("refresh-token").unwrap();
        let b = cipher.encrypt("refresh-token").unwrap();

        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), "refresh-token");
        assert_eq!(cipher.decrypt(&b).unwrap(), "refresh-token");
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let encrypted = test_cipher().encrypt("secret").unwrap();
        let other = FieldCipher::new([0xffu8; 32]);

        let result = other.decrypt(&encrypted);
        assert!(matches!(result, Err(CipherError::DecryptionFailed)));
    }

    #[test]
    fn test_decrypt_invalid_format() {
        let cipher = test_cipher();
        assert!(matches!(
            cipher.decrypt("no-separator"),
            Err(CipherError::InvalidCiphertextFormat)
        ));
        assert!(matches!(
            cipher.decrypt("!!!:abcd"),
            Err(CipherError::Base64Error(_))
        ));
    }

    #[test]
    fn test_key_from_base64() {
        let encoded = BASE64.encode([0x11u8; 32]);
        let cipher = FieldCipher::from_base64(&encoded).unwrap();
        let encrypted = cipher.encrypt("x").unwrap();
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "x");
    }

    #[test]
    fn test_key_from_base64_wrong_length() {
        let short = BASE64.encode([0x11u8; 16]);
        assert!(matches!(
            FieldCipher::from_base64(&short),
            Err(CipherError::InvalidKeyLength)
        ));
    }

    #[test]
    fn test_encrypt_empty_and_unicode() {
        let cipher = test_cipher();
        for plaintext in ["", "pässwörd £99", &"a".repeat(4096)] {
            let encrypted = cipher.encrypt(plaintext).unwrap();
            assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_ciphertext_format() {
        let encrypted = test_cipher().encrypt("value").unwrap();
        let (nonce_b64, ciphertext_b64) = encrypted.split_once(':').unwrap();
        assert_eq!(BASE64.decode(nonce_b64).unwrap().len(), 12);
        assert!(!ciphertext_b64.is_empty());
    }
}
