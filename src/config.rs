//! Core configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::{AeadCipher, KdfProfile};
use crate::error::{CoreError, Result};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::storage::{is_reserved_namespace, is_valid_key, RESERVED_NAMESPACE_PREFIX};

/// Default per-item ceiling (50 KiB)
pub const DEFAULT_MAX_ITEM_BYTES: usize = 50 * 1024;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    /// Namespace used when a call names none
    pub default_namespace: String,
    /// Serialized value ceiling per item
    pub max_item_bytes: usize,
    /// Argon2id work factor for the master key
    pub kdf: KdfProfile,
    /// Cipher for everything this core encrypts
    pub cipher: AeadCipher,
    /// Physical key of the persisted master-key record
    pub master_key_record: String,
    /// Namespace and key of the applied-migrations list
    pub migrations_namespace: String,
    pub migrations_key: String,
    /// Retained security events
    pub event_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.into(),
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
            kdf: KdfProfile::fast(),
            cipher: AeadCipher::XChaCha20Poly1305,
            master_key_record: "__alfa:master_key".into(),
            migrations_namespace: "__alfa".into(),
            migrations_key: "applied_migrations".into(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CoreConfig {
    /// Load from a JSON file; missing fields fall back to defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: CoreConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_item_bytes == 0 {
            return Err(CoreError::InvalidConfig("maxItemBytes must be > 0".into()));
        }
        if self.event_capacity == 0 {
            return Err(CoreError::InvalidConfig("eventCapacity must be > 0".into()));
        }
        if !is_valid_key(&self.default_namespace)
            || !is_valid_key(&self.migrations_namespace)
            || !is_valid_key(&self.migrations_key)
        {
            return Err(CoreError::InvalidConfig(
                "namespaces and keys may only use [A-Za-z0-9:_-]".into(),
            ));
        }
        if is_reserved_namespace(&self.default_namespace) {
            return Err(CoreError::InvalidConfig(format!(
                "defaultNamespace may not start with '{}'",
                RESERVED_NAMESPACE_PREFIX
            )));
        }
        if !is_reserved_namespace(&self.migrations_namespace)
            || !is_reserved_namespace(&self.master_key_record)
        {
            return Err(CoreError::InvalidConfig(format!(
                "internal records must live under '{}'",
                RESERVED_NAMESPACE_PREFIX
            )));
        }
        self.kdf
            .validate()
            .map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    pub fn with_kdf(mut self, kdf: KdfProfile) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_max_item_bytes(mut self, max_item_bytes: usize) -> Self {
        self.max_item_bytes = max_item_bytes;
        self
    }

    pub fn with_cipher(mut self, cipher: AeadCipher) -> Self {
        self.cipher = cipher;
        self
    }
}
