//! Field-level encryption: ChaCha20-Poly1305 AEAD.
//!
//! Designated fields are serialized to JSON, encrypted with a fresh 12 byte
//! nonce and stored as `enc:base64(nonce || ciphertext)`.

use super::RecordMiddleware;
use crate::core::{DbError, Record, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

const ENCRYPTED_PREFIX: &str = "enc:";
const NONCE_SIZE: usize = 12;

/// Which fields of which tables are stored encrypted.
#[derive(Debug, Clone, Default)]
pub struct EncryptedFields {
    tables: HashMap<String, Vec<String>>,
}

impl EncryptedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table<I, S>(mut self, table: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .entry(table.to_string())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn fields(&self, table: &str) -> &[String] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Secrets of the wallet store.
pub fn default_encrypted_fields() -> EncryptedFields {
    EncryptedFields::new()
        .table("wallets", ["privateKey", "mnemonic"])
        .table("paperWallets", ["privateKey"])
        .table("mnemonicPasswords", ["password"])
        .table("userSettings", ["pinHash", "totpSecret"])
}

pub struct FieldEncryption {
    cipher: ChaCha20Poly1305,
    fields: EncryptedFields,
}

impl FieldEncryption {
    /// Derives a 256-bit key from `passphrase` with SHA-256.
    pub fn new(passphrase: &str, fields: EncryptedFields) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self::from_raw_key(&key, fields)
    }

    pub fn from_raw_key(key: &[u8; 32], fields: EncryptedFields) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.into()),
            fields,
        }
    }

    pub fn is_encrypted(value: &JsonValue) -> bool {
        value.as_str().is_some_and(|s| s.starts_with(ENCRYPTED_PREFIX))
    }

    pub fn encrypt_value(&self, value: &JsonValue) -> Result<JsonValue> {
        let plaintext = serde_json::to_vec(value)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| DbError::EncryptionError("encryption failed".to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(JsonValue::String(format!("{}{}", ENCRYPTED_PREFIX, BASE64.encode(&combined))))
    }

    pub fn decrypt_value(&self, value: &JsonValue) -> Result<JsonValue> {
        let encoded = value
            .as_str()
            .and_then(|s| s.strip_prefix(ENCRYPTED_PREFIX))
            .ok_or_else(|| DbError::EncryptionError("value is not encrypted".to_string()))?;
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| DbError::EncryptionError(format!("invalid base64: {}", e)))?;
        if combined.len() < NONCE_SIZE {
            return Err(DbError::EncryptionError("ciphertext too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| DbError::EncryptionError("decryption failed (wrong key or tampered data)".to_string()))?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

impl RecordMiddleware for FieldEncryption {
    fn name(&self) -> &str {
        "field-encryption"
    }

    fn before_write(&self, table: &str, mut record: Record) -> Result<Record> {
        for field in self.fields.fields(table) {
            if let Some(value) = record.get_mut(field)
                && !value.is_null()
                && !Self::is_encrypted(value)
            {
                *value = self.encrypt_value(value)?;
            }
        }
        Ok(record)
    }

    fn after_read(&self, table: &str, mut record: Record) -> Result<Record> {
        for field in self.fields.fields(table) {
            if let Some(value) = record.get_mut(field)
                && Self::is_encrypted(value)
            {
                *value = self.decrypt_value(value)?;
            }
        }
        Ok(record)
    }
}
