//! Master key manager
//!
//! Owns the process master key. Lifecycle:
//! `Uninitialized -> Initializing -> Ready -> Locked`.
//!
//! With a passphrase the master key is wrapped under an Argon2id KEK and the
//! record `{version, salt, kdf, cipher, record}` is persisted under the
//! configured physical key. Without a passphrase the key lives for the
//! session only and nothing is written.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretBox, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::backend::KeyValueStore;
use crate::config::CoreConfig;
use crate::crypto::{
    aead, b64_decode, b64_encode, derive_key_async, derive_subkey, generate_salt,
    key_fingerprint, purposes, AeadCipher, AeadError, KdfError, KdfProfile, Sealed, KEY_LEN,
};
use crate::events::{EventLevel, SecurityEventLog, SecurityEventType};

/// Format version of the persisted master-key record
pub const MASTER_RECORD_VERSION: u32 = 1;

const MASTER_WRAP_AAD: &[u8] = b"ALFA:securestore:master-key:v1";
const KEY_WRAP_AAD: &[u8] = b"ALFA:securestore:wrapped-key:v1";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Locked, disposed or never initialized
    #[error("decryption key not available")]
    KeyUnavailable,

    #[error("key unwrap failed")]
    Unwrap,

    #[error("decryption failed")]
    Decrypt,

    #[error("a master key record exists; a passphrase is required to unlock it")]
    PassphraseRequired,

    #[error("master key record corrupted: {0}")]
    CorruptedRecord(String),

    #[error(transparent)]
    Derivation(#[from] KdfError),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<AeadError> for KeyError {
    fn from(e: AeadError) -> Self {
        match e {
            AeadError::Decrypt => KeyError::Decrypt,
            other => KeyError::Encrypt(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// `wrapped` holds AEAD ciphertext of the raw key bytes
    Raw,
    /// No key material was persisted
    None,
}

/// A key sealed under the master key (or the master key under its KEK)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKeyRecord {
    pub wrapped: Option<String>,
    pub nonce: Option<String>,
    pub format: KeyFormat,
    pub created: DateTime<Utc>,
}

impl WrappedKeyRecord {
    /// Record for a key that exists only in memory
    pub fn unpersisted() -> Self {
        Self {
            wrapped: None,
            nonce: None,
            format: KeyFormat::None,
            created: Utc::now(),
        }
    }

    fn from_sealed(sealed: &Sealed) -> Self {
        Self {
            wrapped: Some(b64_encode(&sealed.ciphertext)),
            nonce: Some(b64_encode(&sealed.nonce)),
            format: KeyFormat::Raw,
            created: Utc::now(),
        }
    }

    fn to_sealed(&self) -> Option<Sealed> {
        if self.format != KeyFormat::Raw {
            return None;
        }
        Some(Sealed {
            nonce: b64_decode(self.nonce.as_deref()?)?,
            ciphertext: b64_decode(self.wrapped.as_deref()?)?,
        })
    }
}

/// Persisted master-key record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasterKeyFile {
    version: u32,
    salt: String,
    kdf: KdfProfile,
    cipher: AeadCipher,
    record: WrappedKeyRecord,
}

struct MasterKey {
    secret: SecretBox<[u8; KEY_LEN]>,
    id: String,
}

impl MasterKey {
    fn new(bytes: [u8; KEY_LEN]) -> Self {
        let id = key_fingerprint(&bytes);
        Self {
            secret: SecretBox::new(Box::new(bytes)),
            id,
        }
    }

    fn generate() -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(aead::random_bytes::<KEY_LEN>()?);
        Ok(Self::new(*bytes))
    }
}

struct Inner {
    state: ManagerState,
    key: Option<MasterKey>,
}

/// Outcome of the most recent initialization attempt, shared with callers
/// that were waiting on it
#[derive(Clone)]
struct Attempt {
    number: u64,
    outcome: Result<(), KeyError>,
}

pub struct MasterKeyManager {
    store: Arc<dyn KeyValueStore>,
    record_key: String,
    kdf: KdfProfile,
    cipher: AeadCipher,
    events: Arc<SecurityEventLog>,
    inner: RwLock<Inner>,
    init_lock: tokio::sync::Mutex<()>,
    attempts: AtomicU64,
    last_attempt: RwLock<Option<Attempt>>,
}

impl MasterKeyManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        config: &CoreConfig,
        events: Arc<SecurityEventLog>,
    ) -> Self {
        Self {
            store,
            record_key: config.master_key_record.clone(),
            kdf: config.kdf,
            cipher: config.cipher,
            events,
            inner: RwLock::new(Inner {
                state: ManagerState::Uninitialized,
                key: None,
            }),
            init_lock: tokio::sync::Mutex::new(()),
            attempts: AtomicU64::new(0),
            last_attempt: RwLock::new(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Load or create the master key.
    ///
    /// Calls that arrive while another initialization is in flight wait for
    /// it and return its outcome instead of deriving again.
    pub async fn initialize(&self, passphrase: Option<&SecretString>) -> Result<(), KeyError> {
        if self.state() == ManagerState::Ready {
            return Ok(());
        }

        let seen = self.attempts.load(Ordering::SeqCst);
        let _guard = self.init_lock.lock().await;

        if self.attempts.load(Ordering::SeqCst) != seen {
            if let Some(attempt) = self.last_attempt.read().clone() {
                tracing::debug!(attempt = attempt.number, "joined in-flight master key initialization");
                // the key may have been locked between that attempt and now
                return match attempt.outcome {
                    Ok(()) if self.state() != ManagerState::Ready => Err(KeyError::KeyUnavailable),
                    outcome => outcome,
                };
            }
        }

        let previous = {
            let mut inner = self.inner.write();
            if inner.state == ManagerState::Ready {
                return Ok(());
            }
            let previous = inner.state;
            inner.state = ManagerState::Initializing;
            previous
        };

        tracing::info!(record = %self.record_key, "initializing master key");
        let outcome = match self.load_or_create(passphrase).await {
            Ok(key) => self.install(key),
            Err(e) => {
                let mut inner = self.inner.write();
                if inner.state == ManagerState::Initializing {
                    inner.state = previous;
                }
                Err(e)
            }
        };

        match &outcome {
            Ok(()) => {}
            Err(KeyError::Unwrap) => self.events.record(
                SecurityEventType::UnwrapFailed,
                EventLevel::Warning,
                "master key record could not be unwrapped",
            ),
            Err(e) => tracing::warn!(error = %e, "master key initialization failed"),
        }

        let number = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_attempt.write() = Some(Attempt {
            number,
            outcome: outcome.clone(),
        });

        outcome
    }

    fn install(&self, key: MasterKey) -> Result<(), KeyError> {
        let id = key.id.clone();
        {
            let mut inner = self.inner.write();
            // lock() during derivation wins
            if inner.state != ManagerState::Initializing {
                return Err(KeyError::KeyUnavailable);
            }
            inner.key = Some(key);
            inner.state = ManagerState::Ready;
        }

        self.events.record(
            SecurityEventType::KeyInitialized,
            EventLevel::Info,
            format!("master key {} ready", id),
        );
        Ok(())
    }

    async fn load_or_create(&self, passphrase: Option<&SecretString>) -> Result<MasterKey, KeyError> {
        let existing = self
            .store
            .get(&self.record_key)
            .map_err(|e| KeyError::Storage(e.to_string()))?;

        let existing = match existing {
            Some(raw) => {
                let file: MasterKeyFile = serde_json::from_str(&raw)
                    .map_err(|e| KeyError::CorruptedRecord(e.to_string()))?;
                (file.record.format == KeyFormat::Raw).then_some(file)
            }
            None => None,
        };

        match (existing, passphrase) {
            (Some(file), Some(passphrase)) => self.unlock_existing(&file, passphrase).await,
            (Some(_), None) => Err(KeyError::PassphraseRequired),
            (None, Some(passphrase)) => {
                let key = MasterKey::generate()?;
                self.persist(&key, passphrase).await?;
                tracing::info!(key_id = %key.id, "created new master key");
                Ok(key)
            }
            (None, None) => {
                let key = MasterKey::generate()?;
                tracing::info!(key_id = %key.id, "session-only master key (not persisted)");
                Ok(key)
            }
        }
    }

    async fn unlock_existing(
        &self,
        file: &MasterKeyFile,
        passphrase: &SecretString,
    ) -> Result<MasterKey, KeyError> {
        if file.version > MASTER_RECORD_VERSION {
            return Err(KeyError::CorruptedRecord(format!(
                "unsupported record version {}",
                file.version
            )));
        }

        let salt = b64_decode(&file.salt)
            .ok_or_else(|| KeyError::CorruptedRecord("salt is not base64".into()))?;
        let kek = derive_key_async(passphrase, &salt, file.kdf).await?;

        let sealed = file.record.to_sealed().ok_or(KeyError::Unwrap)?;
        let raw = aead::open(file.cipher, kek.expose_secret(), Some(MASTER_WRAP_AAD), &sealed)
            .map_err(|_| KeyError::Unwrap)?;

        let bytes: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::CorruptedRecord("master key has wrong length".into()))?;
        Ok(MasterKey::new(bytes))
    }

    async fn persist(&self, key: &MasterKey, passphrase: &SecretString) -> Result<(), KeyError> {
        let salt = generate_salt()?;
        let kek = derive_key_async(passphrase, &salt, self.kdf).await?;

        let sealed = aead::encrypt(
            self.cipher,
            kek.expose_secret(),
            Some(MASTER_WRAP_AAD),
            key.secret.expose_secret(),
        )?;

        let file = MasterKeyFile {
            version: MASTER_RECORD_VERSION,
            salt: b64_encode(&salt),
            kdf: self.kdf,
            cipher: self.cipher,
            record: WrappedKeyRecord::from_sealed(&sealed),
        };

        let json = serde_json::to_string(&file).map_err(|e| KeyError::Storage(e.to_string()))?;
        self.store
            .set(&self.record_key, &json)
            .map_err(|e| KeyError::Storage(e.to_string()))
    }

    /// Re-wrap the current master key under a new passphrase
    pub async fn change_passphrase(&self, new_passphrase: &SecretString) -> Result<(), KeyError> {
        let _guard = self.init_lock.lock().await;

        let bytes = self.with_key(|key| Ok(Zeroizing::new(*key.secret.expose_secret())))?;
        let key = MasterKey::new(*bytes);
        self.persist(&key, new_passphrase).await?;

        self.events.record(
            SecurityEventType::Other("passphrase_changed".into()),
            EventLevel::Info,
            format!("master key {} re-wrapped under a new passphrase", key.id),
        );
        Ok(())
    }

    /// Drop the in-memory key. Dependent operations fail with `KeyUnavailable`.
    pub fn lock(&self) {
        let was = {
            let mut inner = self.inner.write();
            let was = inner.state;
            inner.key = None;
            inner.state = ManagerState::Locked;
            was
        };

        if was != ManagerState::Locked {
            self.events.record(SecurityEventType::KeyLocked, EventLevel::Info, "master key locked");
        }
    }

    /// Drop the key and return to `Uninitialized`; the persisted record stays.
    pub fn dispose(&self) {
        let mut inner = self.inner.write();
        inner.key = None;
        inner.state = ManagerState::Uninitialized;
        tracing::debug!("master key manager disposed");
    }

    pub fn state(&self) -> ManagerState {
        self.inner.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ManagerState::Ready
    }

    /// Fingerprint of the current master key
    pub fn key_id(&self) -> Option<String> {
        self.inner.read().key.as_ref().map(|k| k.id.clone())
    }

    pub fn cipher(&self) -> AeadCipher {
        self.cipher
    }

    /// Whether a passphrase-protected record exists in the store
    pub fn has_persisted_record(&self) -> bool {
        matches!(self.store.get(&self.record_key), Ok(Some(_)))
    }

    fn with_key<T>(&self, f: impl FnOnce(&MasterKey) -> Result<T, KeyError>) -> Result<T, KeyError> {
        let inner = self.inner.read();
        match (inner.state, inner.key.as_ref()) {
            (ManagerState::Ready, Some(key)) => f(key),
            _ => Err(KeyError::KeyUnavailable),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // KEY WRAPPING
    // ═══════════════════════════════════════════════════════════════════════

    /// Seal `raw_key` under the master key with a fresh nonce
    pub fn wrap_key(&self, raw_key: &[u8]) -> Result<WrappedKeyRecord, KeyError> {
        self.with_key(|key| {
            let sealed = aead::encrypt(
                self.cipher,
                key.secret.expose_secret(),
                Some(KEY_WRAP_AAD),
                raw_key,
            )?;
            Ok(WrappedKeyRecord::from_sealed(&sealed))
        })
    }

    /// Recover raw key bytes from a record.
    ///
    /// Absent (`format: none`), malformed and tampered records all fail with
    /// `KeyError::Unwrap`.
    pub fn unwrap_key(&self, record: &WrappedKeyRecord) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        let result = self.with_key(|key| {
            let parsed = record.to_sealed();
            let present = parsed.is_some();
            // Absent and malformed records still pay for one AEAD attempt.
            let sealed = parsed.unwrap_or_else(|| Sealed {
                nonce: vec![0u8; self.cipher.nonce_len()],
                ciphertext: vec![0u8; KEY_LEN + aead::TAG_LEN],
            });
            let opened = aead::open(self.cipher, key.secret.expose_secret(), Some(KEY_WRAP_AAD), &sealed);
            match opened {
                Ok(raw) if present => Ok(raw),
                _ => Err(KeyError::Unwrap),
            }
        });

        if matches!(result, Err(KeyError::Unwrap)) {
            self.events.record(
                SecurityEventType::UnwrapFailed,
                EventLevel::Warning,
                "wrapped key record rejected",
            );
        }
        result
    }

    /// `unwrap_key` collapsed to "available or not"
    pub fn try_unwrap_key(&self, record: &WrappedKeyRecord) -> Option<Zeroizing<Vec<u8>>> {
        self.unwrap_key(record).ok()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DATA ENCRYPTION (purpose subkeys, never the master key itself)
    // ═══════════════════════════════════════════════════════════════════════

    pub fn seal(&self, purpose: &str, aad: Option<&[u8]>, plaintext: &[u8]) -> Result<Sealed, KeyError> {
        self.with_key(|key| {
            let subkey = derive_subkey(key.secret.expose_secret(), purpose);
            Ok(aead::encrypt(self.cipher, &subkey, aad, plaintext)?)
        })
    }

    pub fn open(
        &self,
        purpose: &str,
        aad: Option<&[u8]>,
        sealed: &Sealed,
    ) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        self.with_key(|key| {
            let subkey = derive_subkey(key.secret.expose_secret(), purpose);
            aead::open(self.cipher, &subkey, aad, sealed).map_err(|_| KeyError::Decrypt)
        })
    }

    /// Encrypt to base64(nonce || ciphertext)
    pub fn encrypt_data(&self, plaintext: &[u8]) -> Result<String, KeyError> {
        self.encrypt_data_with(purposes::STORAGE, None, plaintext)
    }

    pub fn decrypt_data(&self, encoded: &str) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        self.decrypt_data_with(purposes::STORAGE, None, encoded)
    }

    pub fn encrypt_data_with(
        &self,
        purpose: &str,
        aad: Option<&[u8]>,
        plaintext: &[u8],
    ) -> Result<String, KeyError> {
        let sealed = self.seal(purpose, aad, plaintext)?;
        Ok(b64_encode(&sealed.to_bytes()))
    }

    pub fn decrypt_data_with(
        &self,
        purpose: &str,
        aad: Option<&[u8]>,
        encoded: &str,
    ) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        if !self.is_ready() {
            return Err(KeyError::KeyUnavailable);
        }

        let result = b64_decode(encoded)
            .ok_or(KeyError::Decrypt)
            .and_then(|bytes| Sealed::from_bytes(&bytes, self.cipher).map_err(|_| KeyError::Decrypt))
            .and_then(|sealed| self.open(purpose, aad, &sealed));

        if matches!(result, Err(KeyError::Decrypt)) {
            self.events.record(
                SecurityEventType::DecryptFailed,
                EventLevel::Warning,
                format!("ciphertext rejected ({})", purpose),
            );
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::MemoryStore;

    pub(crate) fn test_config() -> CoreConfig {
        CoreConfig::default().with_kdf(KdfProfile::new(1, 64, 1))
    }

    pub(crate) fn pass(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn manager_on(store: Arc<MemoryStore>) -> MasterKeyManager {
        MasterKeyManager::new(store, &test_config(), Arc::new(SecurityEventLog::new()))
    }

    pub(crate) async fn ready_manager() -> Arc<MasterKeyManager> {
        let manager = manager_on(Arc::new(MemoryStore::new()));
        manager.initialize(Some(&pass("p1"))).await.unwrap();
        Arc::new(manager)
    }

    #[test]
    fn test_decrypt_before_initialize_fails() {
        let manager = manager_on(Arc::new(MemoryStore::new()));
        let err = manager.decrypt_data("AAAA").unwrap_err();
        assert_eq!(err, KeyError::KeyUnavailable);
        assert_eq!(err.to_string(), "decryption key not available");
        assert_eq!(manager.state(), ManagerState::Uninitialized);
    }

    #[tokio::test]
    async fn test_wrap_unwrap_then_lock() {
        let manager = manager_on(Arc::new(MemoryStore::new()));
        manager.initialize(Some(&pass("p1"))).await.unwrap();
        assert_eq!(manager.state(), ManagerState::Ready);

        let raw: Vec<u8> = (1..=32).collect();
        let record = manager.wrap_key(&raw).unwrap();
        assert_eq!(record.format, KeyFormat::Raw);
        assert_eq!(manager.unwrap_key(&record).unwrap().as_slice(), raw.as_slice());

        manager.lock();
        assert_eq!(manager.state(), ManagerState::Locked);
        assert_eq!(manager.unwrap_key(&record).unwrap_err(), KeyError::KeyUnavailable);
        assert_eq!(manager.wrap_key(&raw).unwrap_err(), KeyError::KeyUnavailable);
    }

    #[tokio::test]
    async fn test_tampered_record_fails() {
        let manager = ready_manager().await;
        let record = manager.wrap_key(&[9u8; 32]).unwrap();

        let mut ct = b64_decode(record.wrapped.as_deref().unwrap()).unwrap();
        ct[0] ^= 0x01;
        let tampered = WrappedKeyRecord {
            wrapped: Some(b64_encode(&ct)),
            ..record.clone()
        };
        assert_eq!(manager.unwrap_key(&tampered).unwrap_err(), KeyError::Unwrap);

        let mut nonce = b64_decode(record.nonce.as_deref().unwrap()).unwrap();
        nonce[3] ^= 0x80;
        let tampered = WrappedKeyRecord {
            nonce: Some(b64_encode(&nonce)),
            ..record
        };
        assert!(manager.try_unwrap_key(&tampered).is_none());
    }

    #[tokio::test]
    async fn test_unpersisted_record_is_absent() {
        let manager = ready_manager().await;
        let record = WrappedKeyRecord::unpersisted();
        assert_eq!(manager.unwrap_key(&record).unwrap_err(), KeyError::Unwrap);
    }

    #[tokio::test]
    async fn test_reopen_with_same_passphrase() {
        let store = Arc::new(MemoryStore::new());

        let first = manager_on(store.clone());
        first.initialize(Some(&pass("p1"))).await.unwrap();
        let record = first.wrap_key(b"data encryption key").unwrap();
        let id = first.key_id().unwrap();

        let second = manager_on(store);
        second.initialize(Some(&pass("p1"))).await.unwrap();
        assert_eq!(second.key_id().unwrap(), id);
        assert_eq!(second.unwrap_key(&record).unwrap().as_slice(), b"data encryption key");
    }

    #[tokio::test]
    async fn test_wrong_passphrase_is_retryable() {
        let store = Arc::new(MemoryStore::new());
        manager_on(store.clone()).initialize(Some(&pass("right"))).await.unwrap();

        let manager = manager_on(store);
        let err = manager.initialize(Some(&pass("wrong"))).await.unwrap_err();
        assert_eq!(err, KeyError::Unwrap);
        assert_eq!(manager.state(), ManagerState::Uninitialized);

        manager.initialize(Some(&pass("right"))).await.unwrap();
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_initialize_derives_once() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_on(store.clone());
        let p = pass("p1");

        let (a, b) = tokio::join!(manager.initialize(Some(&p)), manager.initialize(Some(&p)));
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(manager.is_ready());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_waiter_sees_lock_after_joined_success() {
        let manager = manager_on(Arc::new(MemoryStore::new()));
        let guard = manager.init_lock.lock().await;

        let finish_then_lock = async {
            *manager.last_attempt.write() = Some(Attempt {
                number: manager.attempts.fetch_add(1, Ordering::SeqCst) + 1,
                outcome: Ok(()),
            });
            manager.lock();
            drop(guard);
        };

        let p = pass("p1");
        let (waiter, ()) = tokio::join!(manager.initialize(Some(&p)), finish_then_lock);
        assert_eq!(waiter, Err(KeyError::KeyUnavailable));
        assert_eq!(manager.state(), ManagerState::Locked);
    }

    #[tokio::test]
    async fn test_session_only_key_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_on(store.clone());
        manager.initialize(None).await.unwrap();

        assert!(manager.is_ready());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_existing_record_requires_passphrase() {
        let store = Arc::new(MemoryStore::new());
        manager_on(store.clone()).initialize(Some(&pass("p1"))).await.unwrap();

        let manager = manager_on(store);
        assert_eq!(manager.initialize(None).await.unwrap_err(), KeyError::PassphraseRequired);
    }

    #[tokio::test]
    async fn test_data_roundtrip_and_garbage() {
        let manager = ready_manager().await;
        let ct = manager.encrypt_data(b"hello").unwrap();
        assert_eq!(manager.decrypt_data(&ct).unwrap().as_slice(), b"hello");
        assert_eq!(manager.decrypt_data("not base64!").unwrap_err(), KeyError::Decrypt);
    }

    #[tokio::test]
    async fn test_change_passphrase() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_on(store.clone());
        manager.initialize(Some(&pass("old"))).await.unwrap();
        let id = manager.key_id();
        manager.change_passphrase(&pass("new")).await.unwrap();

        let reopened = manager_on(store);
        assert_eq!(reopened.initialize(Some(&pass("old"))).await.unwrap_err(), KeyError::Unwrap);
        reopened.initialize(Some(&pass("new"))).await.unwrap();
        assert_eq!(reopened.key_id(), id);
    }

    #[tokio::test]
    async fn test_lock_then_reinitialize() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_on(store);
        manager.initialize(Some(&pass("p1"))).await.unwrap();
        let id = manager.key_id();

        manager.lock();
        assert!(manager.key_id().is_none());
        manager.initialize(Some(&pass("p1"))).await.unwrap();
        assert_eq!(manager.key_id(), id);
    }
}
