//! Encrypted backup payloads
//!
//! A backup is `{data, metadata, checksum}`: `data` is the base64 AEAD
//! ciphertext of the JSON-serialized value, `checksum` the hex SHA-256 of
//! that ciphertext. The checksum is verified before any decryption is
//! attempted, so transport corruption (`ChecksumMismatch`) is reported
//! separately from a failed tag (`Authentication`).
//!
//! Two flavours:
//! - key backups, sealed with the backup subkey of the master key
//! - password backups, sealed with an Argon2id key derived from a passphrase
//!   and the `passwordSalt` carried in the metadata

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::crypto::{
    aead, b64_decode, b64_encode, derive_key_async, generate_salt, purposes, AeadCipher,
    KdfError, KdfProfile, Sealed,
};
use crate::master_key::{KeyError, MasterKeyManager};

/// Newest payload format this build writes and reads
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// `keyId` of payloads sealed under a passphrase
pub const PASSWORD_KEY_ID: &str = "password";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup checksum mismatch")]
    ChecksumMismatch,

    #[error("Backup authentication failed")]
    Authentication,

    #[error("Unsupported backup version: {0}")]
    UnsupportedVersion(u32),

    #[error("Unsupported backup algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Backup sealed under key {found}, current key is {expected}")]
    KeyMismatch { expected: String, found: String },

    #[error("decryption key not available")]
    KeyUnavailable,

    #[error("Malformed backup: {0}")]
    Malformed(String),

    #[error("Backup serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Derivation(#[from] KdfError),

    #[error("Backup encryption failed: {0}")]
    Encrypt(String),
}

impl From<KeyError> for BackupError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::KeyUnavailable => BackupError::KeyUnavailable,
            KeyError::Decrypt | KeyError::Unwrap => BackupError::Authentication,
            KeyError::Derivation(e) => BackupError::Derivation(e),
            other => BackupError::Encrypt(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlobMeta {
    /// Cipher id, e.g. `xchacha20-poly1305`
    pub algorithm: String,
    pub key_id: String,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_salt: Option<String>,
    /// Work factor of the password key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf: Option<KdfProfile>,
}

impl EncryptedBlobMeta {
    fn new(cipher: AeadCipher, key_id: impl Into<String>) -> Self {
        Self {
            algorithm: cipher.id().to_string(),
            key_id: key_id.into(),
            timestamp: Utc::now(),
            version: BACKUP_FORMAT_VERSION,
            nonce: None,
            password_salt: None,
            kdf: None,
        }
    }

    /// Fields bound into the AEAD tag
    fn aad(&self) -> Vec<u8> {
        format!("ALFA:backup:v{}:{}:{}", self.version, self.algorithm, self.key_id).into_bytes()
    }

    fn check_version(&self) -> Result<(), BackupError> {
        if self.version == 0 || self.version > BACKUP_FORMAT_VERSION {
            return Err(BackupError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    fn cipher(&self) -> Result<AeadCipher, BackupError> {
        AeadCipher::from_id(&self.algorithm)
            .ok_or_else(|| BackupError::UnsupportedAlgorithm(self.algorithm.clone()))
    }
}

/// Encrypted, checksummed snapshot of a `T`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBackupPayload<T> {
    pub data: String,
    pub metadata: EncryptedBlobMeta,
    pub checksum: String,
    #[serde(skip)]
    _value: PhantomData<fn() -> T>,
}

impl<T> EncryptedBackupPayload<T> {
    fn from_sealed(sealed: &Sealed, mut metadata: EncryptedBlobMeta) -> Self {
        metadata.nonce = Some(b64_encode(&sealed.nonce));
        Self {
            data: b64_encode(&sealed.ciphertext),
            metadata,
            checksum: checksum(&sealed.ciphertext),
            _value: PhantomData,
        }
    }

    pub fn to_json(&self) -> Result<String, BackupError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, BackupError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Version gate, checksum and field decoding; no decryption
    fn verified_parts(&self) -> Result<(AeadCipher, Sealed), BackupError> {
        self.metadata.check_version()?;
        let cipher = self.metadata.cipher()?;

        let ciphertext = b64_decode(&self.data)
            .ok_or_else(|| BackupError::Malformed("data is not base64".into()))?;
        if !checksum_matches(&ciphertext, &self.checksum) {
            return Err(BackupError::ChecksumMismatch);
        }

        let nonce = self
            .metadata
            .nonce
            .as_deref()
            .and_then(b64_decode)
            .ok_or_else(|| BackupError::Malformed("missing or invalid nonce".into()))?;

        Ok((cipher, Sealed { nonce, ciphertext }))
    }
}

fn checksum(ciphertext: &[u8]) -> String {
    hex::encode(Sha256::digest(ciphertext))
}

fn checksum_matches(ciphertext: &[u8], expected: &str) -> bool {
    let actual = checksum(ciphertext);
    actual.as_bytes().ct_eq(expected.as_bytes()).into()
}

// ═══════════════════════════════════════════════════════════════════════════════
// MASTER KEY BACKUPS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn create_backup<T: Serialize>(
    manager: &MasterKeyManager,
    value: &T,
) -> Result<EncryptedBackupPayload<T>, BackupError> {
    let key_id = manager.key_id().ok_or(BackupError::KeyUnavailable)?;
    let metadata = EncryptedBlobMeta::new(manager.cipher(), key_id);

    let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(value)?);
    let aad = metadata.aad();
    let sealed = manager.seal(purposes::BACKUP, Some(aad.as_slice()), &plaintext)?;

    tracing::info!(key_id = %metadata.key_id, bytes = sealed.ciphertext.len(), "backup created");
    Ok(EncryptedBackupPayload::from_sealed(&sealed, metadata))
}

pub fn restore_backup<T: DeserializeOwned>(
    manager: &MasterKeyManager,
    payload: &EncryptedBackupPayload<T>,
) -> Result<T, BackupError> {
    let (cipher, sealed) = payload.verified_parts()?;

    let current = manager.key_id().ok_or(BackupError::KeyUnavailable)?;
    if payload.metadata.key_id != current {
        return Err(BackupError::KeyMismatch {
            expected: current,
            found: payload.metadata.key_id.clone(),
        });
    }
    if cipher != manager.cipher() {
        return Err(BackupError::UnsupportedAlgorithm(payload.metadata.algorithm.clone()));
    }

    let aad = payload.metadata.aad();
    let plaintext = manager.open(purposes::BACKUP, Some(aad.as_slice()), &sealed)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASSWORD BACKUPS
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn create_password_backup<T: Serialize>(
    value: &T,
    passphrase: &SecretString,
    profile: KdfProfile,
    cipher: AeadCipher,
) -> Result<EncryptedBackupPayload<T>, BackupError> {
    if passphrase.expose_secret().is_empty() {
        return Err(BackupError::Derivation(KdfError::InvalidInput(
            "passphrase must not be empty".into(),
        )));
    }

    let salt = generate_salt()?;
    let key = derive_key_async(passphrase, &salt, profile).await?;

    let mut metadata = EncryptedBlobMeta::new(cipher, PASSWORD_KEY_ID);
    metadata.password_salt = Some(b64_encode(&salt));
    metadata.kdf = Some(profile);

    let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(value)?);
    let aad = metadata.aad();
    let sealed = aead::encrypt(cipher, key.expose_secret(), Some(aad.as_slice()), &plaintext)
        .map_err(|e| BackupError::Encrypt(e.to_string()))?;

    Ok(EncryptedBackupPayload::from_sealed(&sealed, metadata))
}

pub async fn restore_password_backup<T: DeserializeOwned>(
    payload: &EncryptedBackupPayload<T>,
    passphrase: &SecretString,
) -> Result<T, BackupError> {
    let (cipher, sealed) = payload.verified_parts()?;
    let meta = &payload.metadata;

    let salt = meta
        .password_salt
        .as_deref()
        .and_then(b64_decode)
        .ok_or_else(|| BackupError::Malformed("missing passwordSalt".into()))?;
    let profile = meta
        .kdf
        .ok_or_else(|| BackupError::Malformed("missing kdf profile".into()))?;

    let key = derive_key_async(passphrase, &salt, profile).await?;
    let aad = meta.aad();
    let plaintext = aead::open(cipher, key.expose_secret(), Some(aad.as_slice()), &sealed)
        .map_err(|_| BackupError::Authentication)?;

    Ok(serde_json::from_slice(&plaintext)?)
}
