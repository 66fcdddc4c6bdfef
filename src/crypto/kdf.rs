//! Argon2id KDF - derives the key-encryption key from a passphrase

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretBox, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Salt length generated for new records
pub const SALT_LEN: usize = 16;

/// Shortest salt accepted on the read path
pub const MIN_SALT_LEN: usize = 8;

/// Derived key length
pub const DERIVED_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KdfError {
    #[error("Key derivation primitive not ready: {0}")]
    NotReady(String),

    #[error("Invalid key derivation input: {0}")]
    InvalidInput(String),

    #[error("Key derivation failed: {0}")]
    Derivation(String),
}

/// Argon2id work factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfProfile {
    /// Iterations (time cost)
    pub ops_limit: u32,
    /// Memory in KiB
    pub mem_limit_kib: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_parallelism() -> u32 {
    1
}

impl Default for KdfProfile {
    fn default() -> Self {
        Self::fast()
    }
}

impl KdfProfile {
    pub fn new(ops_limit: u32, mem_limit_kib: u32, parallelism: u32) -> Self {
        Self {
            ops_limit,
            mem_limit_kib,
            parallelism,
        }
    }

    /// Interactive unlock
    pub fn fast() -> Self {
        Self::new(2, 64 * 1024, 1) // 64 MiB
    }

    /// Backups and other rarely-derived keys
    pub fn moderate() -> Self {
        Self::new(3, 256 * 1024, 1) // 256 MiB
    }

    fn params(&self) -> Result<Params, KdfError> {
        Params::new(
            self.mem_limit_kib,
            self.ops_limit,
            self.parallelism,
            Some(DERIVED_KEY_LEN),
        )
        .map_err(|e| KdfError::InvalidInput(format!("Invalid Argon2 params: {}", e)))
    }

    /// Check the profile without running a derivation
    pub fn validate(&self) -> Result<(), KdfError> {
        self.params().map(|_| ())
    }
}

/// Derive a 32-byte key from passphrase and salt
pub fn derive_key(
    passphrase: &SecretString,
    salt: &[u8],
    profile: &KdfProfile,
) -> Result<SecretBox<[u8; DERIVED_KEY_LEN]>, KdfError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(KdfError::InvalidInput(format!(
            "salt must be at least {} bytes, got {}",
            MIN_SALT_LEN,
            salt.len()
        )));
    }

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, profile.params()?);

    let mut output = Box::new([0u8; DERIVED_KEY_LEN]);
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut output[..])
        .map_err(|e| KdfError::Derivation(e.to_string()))?;

    Ok(SecretBox::new(output))
}

/// Derive on the blocking pool so other tasks keep running
pub async fn derive_key_async(
    passphrase: &SecretString,
    salt: &[u8],
    profile: KdfProfile,
) -> Result<SecretBox<[u8; DERIVED_KEY_LEN]>, KdfError> {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| KdfError::NotReady(e.to_string()))?;

    let passphrase = Zeroizing::new(passphrase.expose_secret().to_owned());
    let salt = salt.to_vec();

    handle
        .spawn_blocking(move || {
            let passphrase = SecretString::from(passphrase.as_str().to_owned());
            derive_key(&passphrase, &salt, &profile)
        })
        .await
        .map_err(|e| KdfError::NotReady(format!("derivation task aborted: {}", e)))?
}

/// Generate a random salt
pub fn generate_salt() -> Result<[u8; SALT_LEN], KdfError> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).map_err(|e| KdfError::NotReady(format!("RNG failed: {}", e)))?;
    Ok(salt)
}
