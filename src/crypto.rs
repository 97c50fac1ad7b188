//! Secret sealing for connection credentials using AES-256-GCM.
//!
//! Client secrets and OAuth tokens are stored as `version || nonce || ciphertext+tag`
//! with the owning connection and the secret slot bound in as additional
//! authenticated data, so a blob copied to another row or column fails to open.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(ZeroizingKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Which credential a sealed blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSlot {
    ClientSecret,
    AccessToken,
    RefreshToken,
}

impl SecretSlot {
    fn as_str(self) -> &'static str {
        match self {
            SecretSlot::ClientSecret => "client_secret",
            SecretSlot::AccessToken => "access_token",
            SecretSlot::RefreshToken => "refresh_token",
        }
    }
}

fn slot_aad(connection_id: Uuid, slot: SecretSlot) -> Vec<u8> {
    format!("qbo|{}|{}", connection_id, slot.as_str()).into_bytes()
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if !is_encrypted_payload(ciphertext) {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Determine if a payload is using the encrypted format
pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.len() >= MIN_ENCRYPTED_LEN && ciphertext[0] == VERSION_ENCRYPTED
}

/// Seals a connection secret for storage.
pub fn seal_secret(
    key: &CryptoKey,
    connection_id: Uuid,
    slot: SecretSlot,
    plaintext: &str,
) -> Result<Vec<u8>, CryptoError> {
    encrypt_bytes(key, &slot_aad(connection_id, slot), plaintext.as_bytes())
}

/// Opens a secret previously sealed with [`seal_secret`] for the same connection and slot.
pub fn open_secret(
    key: &CryptoKey,
    connection_id: Uuid,
    slot: SecretSlot,
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    let bytes = decrypt_bytes(key, &slot_aad(connection_id, slot), ciphertext)?;
    String::from_utf8(bytes).map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![42u8; 32]).unwrap()
    }

    #[test]
    fn seal_and_open_roundtrip() {
        let key = test_key();
        let id = Uuid::new_v4();
        let sealed = seal_secret(&key, id, SecretSlot::RefreshToken, "AB11-refresh").unwrap();
        assert!(is_encrypted_payload(&sealed));
        assert_eq!(
            open_secret(&key, id, SecretSlot::RefreshToken, &sealed).unwrap(),
            "AB11-refresh"
        );
    }

    #[test]
    fn blob_bound_to_slot_and_connection() {
        let key = test_key();
        let id = Uuid::new_v4();
        let sealed = seal_secret(&key, id, SecretSlot::AccessToken, "token").unwrap();

        assert!(open_secret(&key, id, SecretSlot::RefreshToken, &sealed).is_err());
        assert!(open_secret(&key, Uuid::new_v4(), SecretSlot::AccessToken, &sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = test_key();
        let id = Uuid::new_v4();
        let mut sealed = seal_secret(&key, id, SecretSlot::ClientSecret, "secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(
            open_secret(&key, id, SecretSlot::ClientSecret, &sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn plaintext_blobs_are_rejected() {
        let key = test_key();
        assert!(matches!(
            decrypt_bytes(&key, b"aad", b"plain-token"),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn nonces_differ_between_seals() {
        let key = test_key();
        let id = Uuid::new_v4();
        let a = seal_secret(&key, id, SecretSlot::AccessToken, "same").unwrap();
        let b = seal_secret(&key, id, SecretSlot::AccessToken, "same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn invalid_key_length_rejected() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }
}
