//! AES-256-GCM sealing of secrets stored at rest (provider credentials)

// generic-array 0.14 deprecation notes surface through aes-gcm 0.10
#![allow(deprecated)]

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

const NONCE_LENGTH: usize = 12;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Master key must be exactly 32 bytes or 64 hex characters")]
    InvalidKeyLength,

    #[error("Invalid hex key: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid encrypted data")]
    Truncated,

    #[error("Cipher failure")]
    Cipher,

    #[error("UTF-8 decode failed: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Encrypts and decrypts opaque secrets with a single master key
#[derive(Debug, Clone)]
pub struct EncryptionService {
    master_key: Arc<[u8; 32]>,
}

impl EncryptionService {
    /// Accepts a raw 32-byte key or a 64-character hex key
    pub fn new(master_key: &str) -> Result<Self, EncryptionError> {
        let key_bytes = match master_key.len() {
            32 => master_key.as_bytes().to_vec(),
            64 => hex::decode(master_key)?,
            _ => return Err(EncryptionError::InvalidKeyLength),
        };

        let key: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength)?;

        Ok(Self {
            master_key: Arc::new(key),
        })
    }

    /// Derive the master key from a passphrase with SHA-256
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);

        Self {
            master_key: Arc::new(key),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.master_key.as_slice()))
    }

    /// Returns base64(nonce || ciphertext)
    pub fn encrypt(&self, data: &[u8]) -> Result<String, EncryptionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, data)
            .map_err(|_| EncryptionError::Cipher)?;

        let mut sealed = nonce.to_vec();
        sealed.extend(ciphertext);
        Ok(BASE64.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<Vec<u8>, EncryptionError> {
        let data = BASE64.decode(sealed)?;
        if data.len() < NONCE_LENGTH {
            return Err(EncryptionError::Truncated);
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LENGTH);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| EncryptionError::Cipher)
    }

    pub fn encrypt_string(&self, data: &str) -> Result<String, EncryptionError> {
        self.encrypt(data.as_bytes())
    }

    pub fn decrypt_string(&self, sealed: &str) -> Result<String, EncryptionError> {
        Ok(String::from_utf8(self.decrypt(sealed)?)?)
    }

    /// A fresh random key in the 64-character hex form accepted by `new`
    pub fn generate_hex_key() -> String {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        hex::encode(key)
    }
}
