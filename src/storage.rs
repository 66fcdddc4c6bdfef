//! Secure storage - namespaced, validated, size-guarded key/value facade
//!
//! Every physical key is `<namespace>:<logical key>`. Values are serialized
//! before they reach the backend (strings as-is, everything else as JSON)
//! and may be routed through a [`ValueCipher`] per call.
//!
//! No operation here returns an error or panics past the API boundary:
//! writes report a [`SetResult`], reads collapse every failure to `None`.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::backend::KeyValueStore;
use crate::config::CoreConfig;
use crate::crypto::purposes;
use crate::events::{EventLevel, SecurityEventLog, SecurityEventType};
use crate::master_key::{KeyError, MasterKeyManager};

/// Written in place of a value that could not be serialized; read back as absent
pub const SERIALIZATION_SENTINEL: &str = "__SERIALIZATION_ERROR__";

/// Longest accepted logical key or namespace
pub const MAX_KEY_LEN: usize = 256;

/// Namespaces starting with this prefix hold internal records (master key,
/// migration history) and are closed to application handles
pub const RESERVED_NAMESPACE_PREFIX: &str = "__";

pub fn is_reserved_namespace(namespace: &str) -> bool {
    namespace.starts_with(RESERVED_NAMESPACE_PREFIX)
}

/// `[A-Za-z0-9:_-]+`, at most [`MAX_KEY_LEN`] bytes
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-'))
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageErrorKind {
    InvalidKey,
    ValueTooLarge,
    EncryptionUnavailable,
    EncryptFailed,
    SerializationFailed,
    QuotaExceeded,
    WriteFailed,
}

impl StorageErrorKind {
    /// Stable code exposed to callers
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey => "INVALID_KEY",
            Self::ValueTooLarge => "VALUE_TOO_LARGE",
            Self::EncryptionUnavailable => "ENCRYPTION_UNAVAILABLE",
            Self::EncryptFailed => "ENCRYPT_FAILED",
            Self::SerializationFailed => "SERIALIZATION_FAILED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::WriteFailed => "WRITE_FAILED",
        }
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of [`SecureStorage::set`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StorageErrorKind>,
    /// Serialized size of the value, before encryption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
}

impl SetResult {
    fn stored(bytes: usize) -> Self {
        Self {
            success: true,
            error: None,
            bytes: Some(bytes),
        }
    }

    fn rejected(kind: StorageErrorKind, bytes: Option<usize>) -> Self {
        Self {
            success: false,
            error: Some(kind),
            bytes,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.success
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE CIPHERS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("decryption key not available")]
    KeyUnavailable,

    #[error("cipher failed: {0}")]
    Failed(String),
}

/// Encrypt/decrypt hook applied to serialized values
pub trait ValueCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// Encrypts values with the storage subkey of the master key
pub struct MasterKeyCipher {
    manager: Arc<MasterKeyManager>,
}

impl MasterKeyCipher {
    pub fn new(manager: Arc<MasterKeyManager>) -> Self {
        Self { manager }
    }
}

fn cipher_error(e: KeyError) -> CipherError {
    match e {
        KeyError::KeyUnavailable => CipherError::KeyUnavailable,
        other => CipherError::Failed(other.to_string()),
    }
}

impl ValueCipher for MasterKeyCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        self.manager
            .encrypt_data_with(purposes::STORAGE, None, plaintext.as_bytes())
            .map_err(cipher_error)
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let plain = self
            .manager
            .decrypt_data_with(purposes::STORAGE, None, ciphertext)
            .map_err(cipher_error)?;
        String::from_utf8(plain.to_vec()).map_err(|e| CipherError::Failed(e.to_string()))
    }
}

type CipherFn = dyn Fn(&str) -> Result<String, CipherError> + Send + Sync;

/// Cipher built from a pair of caller-supplied closures
pub struct FnCipher {
    encrypt: Box<CipherFn>,
    decrypt: Box<CipherFn>,
}

impl FnCipher {
    pub fn new<E, D>(encrypt: E, decrypt: D) -> Self
    where
        E: Fn(&str) -> Result<String, CipherError> + Send + Sync + 'static,
        D: Fn(&str) -> Result<String, CipherError> + Send + Sync + 'static,
    {
        Self {
            encrypt: Box::new(encrypt),
            decrypt: Box::new(decrypt),
        }
    }
}

impl ValueCipher for FnCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        (self.encrypt)(plaintext)
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        (self.decrypt)(ciphertext)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE JSON
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON helpers that never fail loudly
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeJson;

impl SafeJson {
    /// Serialize, or return [`SERIALIZATION_SENTINEL`]
    pub fn stringify<T: Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "value could not be serialized");
            SERIALIZATION_SENTINEL.to_string()
        })
    }

    /// Parse, treating the sentinel and malformed input as absent
    pub fn parse<T: DeserializeOwned>(text: &str) -> Option<T> {
        if text == SERIALIZATION_SENTINEL {
            return None;
        }
        serde_json::from_str(text).ok()
    }

    pub fn parse_or<T: DeserializeOwned>(text: &str, fallback: T) -> T {
        Self::parse(text).unwrap_or(fallback)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECURE STORAGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-call options
#[derive(Clone, Default)]
pub struct StorageOptions {
    pub namespace: Option<String>,
    pub encrypt: bool,
    /// Overrides the storage handle's cipher for this call
    pub cipher: Option<Arc<dyn ValueCipher>>,
}

impl StorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    pub fn cipher(mut self, cipher: Arc<dyn ValueCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }
}

/// Namespaced handle over a [`KeyValueStore`]
#[derive(Clone)]
pub struct SecureStorage {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    max_item_bytes: usize,
    cipher: Option<Arc<dyn ValueCipher>>,
    events: Option<Arc<SecurityEventLog>>,
    /// May address reserved namespaces
    internal: bool,
}

impl SecureStorage {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &CoreConfig) -> Self {
        Self {
            store,
            namespace: config.default_namespace.clone(),
            max_item_bytes: config.max_item_bytes,
            cipher: None,
            events: None,
            internal: false,
        }
    }

    /// Handle allowed into reserved namespaces
    pub(crate) fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn ValueCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_events(mut self, events: Arc<SecurityEventLog>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn max_item_bytes(&self) -> usize {
        self.max_item_bytes
    }

    pub fn safe_json(&self) -> SafeJson {
        SafeJson
    }

    fn namespace_allowed(&self, namespace: &str) -> bool {
        is_valid_key(namespace) && (self.internal || !is_reserved_namespace(namespace))
    }

    /// Physical key for `key`, or `None` if the key or namespace is not allowed
    fn physical_key(&self, key: &str, opts: &StorageOptions) -> Option<String> {
        let namespace = opts.namespace.as_deref().unwrap_or(&self.namespace);
        if !is_valid_key(key) || !self.namespace_allowed(namespace) {
            return None;
        }
        Some(format!("{}:{}", namespace, key))
    }

    fn cipher_for<'a>(&'a self, opts: &'a StorageOptions) -> Option<&'a Arc<dyn ValueCipher>> {
        opts.cipher.as_ref().or(self.cipher.as_ref())
    }

    fn reject(&self, key: &str, kind: StorageErrorKind, bytes: Option<usize>) -> SetResult {
        tracing::warn!(key = %key, error = %kind, "storage write rejected");
        if let Some(events) = &self.events {
            events.record(
                SecurityEventType::StorageRejected,
                EventLevel::Warning,
                format!("write to '{}' rejected: {}", key, kind),
            );
        }
        SetResult::rejected(kind, bytes)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // WRITE
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> SetResult {
        self.set_with(key, value, &StorageOptions::default())
    }

    pub fn set_with<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        opts: &StorageOptions,
    ) -> SetResult {
        let Some(physical) = self.physical_key(key, opts) else {
            return self.reject(key, StorageErrorKind::InvalidKey, None);
        };

        let serialized = match serialize_value(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(error = %e, "serialization failed");
                return self.reject(key, StorageErrorKind::SerializationFailed, None);
            }
        };

        let bytes = serialized.len();
        if bytes > self.max_item_bytes {
            return self.reject(key, StorageErrorKind::ValueTooLarge, Some(bytes));
        }

        let payload = if opts.encrypt {
            let Some(cipher) = self.cipher_for(opts) else {
                return self.reject(key, StorageErrorKind::EncryptionUnavailable, Some(bytes));
            };
            match cipher.encrypt(&serialized) {
                Ok(ct) => ct,
                Err(CipherError::KeyUnavailable) => {
                    return self.reject(key, StorageErrorKind::EncryptionUnavailable, Some(bytes));
                }
                Err(CipherError::Failed(e)) => {
                    tracing::debug!(error = %e, "encrypt hook failed");
                    return self.reject(key, StorageErrorKind::EncryptFailed, Some(bytes));
                }
            }
        } else {
            serialized
        };

        match self.store.set(&physical, &payload) {
            Ok(()) => SetResult::stored(bytes),
            Err(e) if e.is_quota() => self.reject(key, StorageErrorKind::QuotaExceeded, Some(bytes)),
            Err(e) => {
                tracing::error!(error = %e, "backend write failed");
                self.reject(key, StorageErrorKind::WriteFailed, Some(bytes))
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.remove_with(key, &StorageOptions::default())
    }

    pub fn remove_with(&self, key: &str, opts: &StorageOptions) -> bool {
        let Some(physical) = self.physical_key(key, opts) else {
            return false;
        };
        match self.store.remove(&physical) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "remove failed");
                false
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // READ
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_with(key, &StorageOptions::default())
    }

    /// Typed read. Values written outside this layer that are not JSON are
    /// offered to `T` as a plain string.
    pub fn get_with<T: DeserializeOwned>(&self, key: &str, opts: &StorageOptions) -> Option<T> {
        let raw = self.get_raw(key, opts)?;
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(value),
            Err(_) => serde_json::from_value(Value::String(raw)).ok(),
        }
    }

    /// Serialized (and decrypted) value as stored
    pub fn get_raw(&self, key: &str, opts: &StorageOptions) -> Option<String> {
        let physical = self.physical_key(key, opts)?;

        let stored = match self.store.get(&physical) {
            Ok(stored) => stored?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "backend read failed");
                return None;
            }
        };

        let plain = if opts.encrypt {
            let cipher = self.cipher_for(opts)?;
            match cipher.decrypt(&stored) {
                Ok(plain) => plain,
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "stored value could not be decrypted");
                    return None;
                }
            }
        } else {
            stored
        };

        if plain == SERIALIZATION_SENTINEL {
            return None;
        }
        Some(plain)
    }

    pub fn contains(&self, key: &str, opts: &StorageOptions) -> bool {
        self.physical_key(key, opts)
            .map(|physical| matches!(self.store.get(&physical), Ok(Some(_))))
            .unwrap_or(false)
    }

    /// Logical keys in `namespace` (this handle's namespace if `None`)
    pub fn keys(&self, namespace: Option<&str>) -> Vec<String> {
        let namespace = namespace.unwrap_or(&self.namespace);
        if !self.namespace_allowed(namespace) {
            return Vec::new();
        }
        let prefix = format!("{}:", namespace);

        match self.store.list_keys() {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "listing keys failed");
                Vec::new()
            }
        }
    }
}

/// Strings pass through untouched; everything else becomes compact JSON
fn serialize_value<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::master_key::tests::ready_manager;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        theme: String,
        volume: u8,
    }

    fn storage_on(store: Arc<MemoryStore>) -> SecureStorage {
        SecureStorage::new(store, &CoreConfig::default())
    }

    fn failing_decrypt() -> Arc<dyn ValueCipher> {
        Arc::new(FnCipher::new(
            |p| Ok(format!("enc:{}", p)),
            |_| Err(CipherError::Failed("boom".into())),
        ))
    }

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("user:prefs_v2-a"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("INVALID KEY"));
        assert!(!is_valid_key("a/b"));
        assert!(!is_valid_key(&"k".repeat(MAX_KEY_LEN + 1)));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let store = Arc::new(MemoryStore::new());
        let storage = storage_on(store.clone());

        let result = storage.set("INVALID KEY", &1);
        assert!(!result.success);
        assert_eq!(result.error, Some(StorageErrorKind::InvalidKey));
        assert_eq!(store.write_count(), 0);

        assert_eq!(storage.get::<u32>("INVALID KEY"), None);
        assert!(!storage.remove("INVALID KEY"));
    }

    #[test]
    fn test_value_too_large_is_not_written() {
        let store = Arc::new(MemoryStore::new());
        let storage = storage_on(store.clone());

        let big = "x".repeat(50 * 1024 + 1);
        let result = storage.set("blob", big.as_str());
        assert_eq!(result.error, Some(StorageErrorKind::ValueTooLarge));
        assert_eq!(result.bytes, Some(big.len()));
        assert_eq!(store.write_count(), 0);

        let exact = "x".repeat(50 * 1024);
        assert!(storage.set("blob", exact.as_str()).success);
    }

    #[test]
    fn test_roundtrip_and_namespacing() {
        let store = Arc::new(MemoryStore::new());
        let storage = storage_on(store.clone()).with_namespace("settings");

        let prefs = Prefs {
            theme: "dark".into(),
            volume: 7,
        };
        let result = storage.set("prefs", &prefs);
        assert!(result.is_ok());
        assert_eq!(storage.get::<Prefs>("prefs"), Some(prefs));

        assert!(storage.set("greeting", "hello").success);
        assert_eq!(store.get("settings:greeting").unwrap().as_deref(), Some("hello"));
        assert_eq!(storage.get::<String>("greeting").as_deref(), Some("hello"));

        let mut keys = storage.keys(None);
        keys.sort();
        assert_eq!(keys, vec!["greeting".to_string(), "prefs".to_string()]);
        assert!(storage.keys(Some("other")).is_empty());

        assert!(storage.remove("prefs"));
        assert!(!storage.contains("prefs", &StorageOptions::default()));
    }

    #[test]
    fn test_per_call_namespace() {
        let store = Arc::new(MemoryStore::new());
        let storage = storage_on(store.clone());
        let opts = StorageOptions::new().namespace("legacy");

        assert!(storage.set_with("token", "abc", &opts).success);
        assert!(store.get("legacy:token").unwrap().is_some());
        assert_eq!(storage.get::<String>("token"), None);
        assert_eq!(storage.get_with::<String>("token", &opts).as_deref(), Some("abc"));
    }

    #[test]
    fn test_reserved_namespace_closed_to_app_handles() {
        let store = Arc::new(MemoryStore::new());
        store.set("__alfa:master_key", "{\"format\":\"wrapped\"}").unwrap();

        let storage = storage_on(store.clone()).with_namespace("__alfa");
        assert!(storage.keys(None).is_empty());
        assert_eq!(storage.get_raw("master_key", &StorageOptions::default()), None);
        assert!(!storage.remove("master_key"));
        assert_eq!(
            storage.set("master_key", "x").error,
            Some(StorageErrorKind::InvalidKey)
        );

        let app = storage_on(store.clone());
        let opts = StorageOptions::new().namespace("__alfa");
        assert!(!app.remove_with("master_key", &opts));
        assert!(!app.contains("master_key", &opts));
        assert!(app.keys(Some("__alfa")).is_empty());
        assert_eq!(
            store.get("__alfa:master_key").unwrap().as_deref(),
            Some("{\"format\":\"wrapped\"}")
        );

        let internal = storage_on(store).with_namespace("__alfa").internal();
        assert_eq!(internal.keys(None), vec!["master_key".to_string()]);
    }

    #[test]
    fn test_non_json_value_returned_raw() {
        let store = Arc::new(MemoryStore::new());
        store.set("default:legacy", "{not json").unwrap();
        store.set("default:num", "42").unwrap();

        let storage = storage_on(store);
        assert_eq!(storage.get::<String>("legacy").as_deref(), Some("{not json"));
        assert_eq!(storage.get::<u32>("legacy"), None);
        assert_eq!(storage.get::<u32>("num"), Some(42));
        assert_eq!(storage.get::<String>("num").as_deref(), Some("42"));
    }

    #[test]
    fn test_sentinel_is_absent() {
        let store = Arc::new(MemoryStore::new());
        store.set("default:broken", SERIALIZATION_SENTINEL).unwrap();

        let storage = storage_on(store);
        assert_eq!(storage.get::<String>("broken"), None);
        assert!(storage.contains("broken", &StorageOptions::default()));
    }

    #[test]
    fn test_encrypt_without_cipher() {
        let store = Arc::new(MemoryStore::new());
        store.set("default:secret", "cipher text").unwrap();
        let storage = storage_on(store.clone());
        let opts = StorageOptions::new().encrypted();

        let result = storage.set_with("secret", "value", &opts);
        assert_eq!(result.error, Some(StorageErrorKind::EncryptionUnavailable));
        assert_eq!(storage.get_with::<String>("secret", &opts), None);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_failing_hooks_are_isolated() {
        let store = Arc::new(MemoryStore::new());
        let storage = storage_on(store.clone());
        let opts = StorageOptions::new().encrypted().cipher(failing_decrypt());

        assert!(storage.set_with("token", "abc", &opts).success);
        assert_eq!(store.get("default:token").unwrap().as_deref(), Some("enc:abc"));
        assert_eq!(storage.get_with::<String>("token", &opts), None);

        let broken: Arc<dyn ValueCipher> = Arc::new(FnCipher::new(
            |_| Err(CipherError::Failed("no".into())),
            |c| Ok(c.to_string()),
        ));
        let opts = StorageOptions::new().encrypted().cipher(broken);
        assert_eq!(
            storage.set_with("token", "abc", &opts).error,
            Some(StorageErrorKind::EncryptFailed)
        );
    }

    #[test]
    fn test_quota_exceeded() {
        let store = Arc::new(MemoryStore::with_quota(32));
        let events = Arc::new(SecurityEventLog::new());
        let storage = storage_on(store).with_events(events.clone());

        assert!(storage.set("a", "small").success);
        let result = storage.set("b", "this value will not fit in the quota");
        assert_eq!(result.error, Some(StorageErrorKind::QuotaExceeded));
        assert_eq!(events.count_of(&SecurityEventType::StorageRejected), 1);
        assert_eq!(storage.get::<String>("a").as_deref(), Some("small"));
    }

    #[tokio::test]
    async fn test_master_key_cipher() {
        let manager = ready_manager().await;
        let store = Arc::new(MemoryStore::new());
        let storage = storage_on(store.clone())
            .with_cipher(Arc::new(MasterKeyCipher::new(manager.clone())));
        let opts = StorageOptions::new().encrypted();

        assert!(storage.set_with("card", &vec![1, 2, 3], &opts).success);
        let stored = store.get("default:card").unwrap().unwrap();
        assert!(!stored.contains("[1,2,3]"));
        assert_eq!(storage.get_with::<Vec<u8>>("card", &opts), Some(vec![1, 2, 3]));

        manager.lock();
        assert_eq!(storage.get_with::<Vec<u8>>("card", &opts), None);
        assert_eq!(
            storage.set_with("card", &vec![4], &opts).error,
            Some(StorageErrorKind::EncryptionUnavailable)
        );
        assert_eq!(store.get("default:card").unwrap().as_deref(), Some(stored.as_str()));
    }

    #[test]
    fn test_safe_json() {
        assert_eq!(SafeJson::stringify(&vec![1, 2]), "[1,2]");
        assert_eq!(SafeJson::parse::<Vec<u8>>("[1,2]"), Some(vec![1, 2]));
        assert_eq!(SafeJson::parse::<Vec<u8>>(SERIALIZATION_SENTINEL), None);
        assert_eq!(SafeJson::parse::<u8>("oops"), None);
        assert_eq!(SafeJson::parse_or("oops", 5u8), 5);

        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1u8], 1u8);
        assert_eq!(SafeJson::stringify(&bad), SERIALIZATION_SENTINEL);
    }
}
