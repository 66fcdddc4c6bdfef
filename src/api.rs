//! ALFA SecureStore - public API
//!
//! `SecureCore` owns one master key context, its event log and the backing
//! store. Every storage handle, state adapter and migration runner it hands
//! out shares that context.

use std::path::Path;
use std::sync::Arc;

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::backend::{FileStore, KeyValueStore, MemoryStore};
use crate::backup::{self, BackupError, EncryptedBackupPayload};
use crate::config::CoreConfig;
use crate::error::Result;
use crate::events::{EventLevel, SecurityEvent, SecurityEventLog, SecurityEventType};
use crate::key_bundle::{resolve_key_bundle, KeyBundle};
use crate::master_key::{ManagerState, MasterKeyManager};
use crate::migration::{self, LegacyMigration, Migration, MigrationReport, MigrationRunner};
use crate::persistence::EncryptedStateStorage;
use crate::storage::{MasterKeyCipher, SecureStorage};

/// ALFA SecureStore core
///
/// ```rust,ignore
/// use alfa_securestore::SecureCore;
///
/// let core = SecureCore::open_file("store.json", CoreConfig::default())?;
/// core.initialize_master_key(Some(&passphrase)).await?;
///
/// let storage = core.create_secure_storage(Some("settings"));
/// storage.set_with("token", "abc", &StorageOptions::new().encrypted());
///
/// core.lock();
/// ```
pub struct SecureCore {
    store: Arc<dyn KeyValueStore>,
    config: CoreConfig,
    manager: Arc<MasterKeyManager>,
    events: Arc<SecurityEventLog>,
}

impl SecureCore {
    // ═══════════════════════════════════════════════════════════════════════
    // CONSTRUCTION
    // ═══════════════════════════════════════════════════════════════════════

    pub fn new(store: Arc<dyn KeyValueStore>, config: CoreConfig) -> Result<Self> {
        config.validate()?;
        let events = Arc::new(SecurityEventLog::with_capacity(config.event_capacity));
        let manager = Arc::new(MasterKeyManager::new(store.clone(), &config, events.clone()));

        Ok(Self {
            store,
            config,
            manager,
            events,
        })
    }

    /// Core over a JSON file store
    pub fn open_file<P: AsRef<Path>>(path: P, config: CoreConfig) -> Result<Self> {
        let store = FileStore::open(path)?;
        Self::new(Arc::new(store), config)
    }

    /// Core whose data lives only as long as the process
    pub fn in_memory(config: CoreConfig) -> Result<Self> {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<MasterKeyManager> {
        &self.manager
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MASTER KEY
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn initialize_master_key(&self, passphrase: Option<&SecretString>) -> Result<()> {
        Ok(self.manager.initialize(passphrase).await?)
    }

    pub async fn change_passphrase(&self, new_passphrase: &SecretString) -> Result<()> {
        Ok(self.manager.change_passphrase(new_passphrase).await?)
    }

    pub fn lock(&self) {
        self.manager.lock();
    }

    /// Drop the key context; a later `initialize_master_key` starts over
    pub fn dispose(&self) {
        self.manager.dispose();
    }

    pub fn state(&self) -> ManagerState {
        self.manager.state()
    }

    pub fn is_ready(&self) -> bool {
        self.manager.is_ready()
    }

    pub fn key_id(&self) -> Option<String> {
        self.manager.key_id()
    }

    pub fn encrypt_data(&self, plaintext: &[u8]) -> Result<String> {
        Ok(self.manager.encrypt_data(plaintext)?)
    }

    pub fn decrypt_data(&self, ciphertext: &str) -> Result<Zeroizing<Vec<u8>>> {
        Ok(self.manager.decrypt_data(ciphertext)?)
    }

    /// Classify and open a stored key bundle
    pub fn resolve_key_bundle(&self, raw: &Value) -> Result<KeyBundle> {
        Ok(resolve_key_bundle(raw, &self.manager)?)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STORAGE
    // ═══════════════════════════════════════════════════════════════════════

    /// Storage handle for `namespace` (configured default if `None`),
    /// encrypting through the master key when asked to
    pub fn create_secure_storage(&self, namespace: Option<&str>) -> SecureStorage {
        let storage = SecureStorage::new(self.store.clone(), &self.config)
            .with_cipher(Arc::new(MasterKeyCipher::new(self.manager.clone())))
            .with_events(self.events.clone());
        match namespace {
            Some(ns) => storage.with_namespace(ns),
            None => storage,
        }
    }

    /// Persistence backend for state containers
    pub fn state_storage(&self) -> Arc<EncryptedStateStorage> {
        Arc::new(EncryptedStateStorage::new(self.store.clone(), self.manager.clone()))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MIGRATIONS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn run_migrations(&self, migrations: &[Migration]) -> MigrationReport {
        let runner = MigrationRunner::new(self.create_secure_storage(None), &self.config, self.events.clone());
        runner.run(migrations)
    }

    /// Move a plaintext value written under `legacy_key` into secure storage
    pub fn migrate_legacy_key(&self, legacy_key: &str, options: &LegacyMigration) -> bool {
        let storage = self.create_secure_storage(None);
        let migrated = migration::migrate_legacy_key(self.store.as_ref(), &storage, legacy_key, options);
        if migrated {
            self.events.record(
                SecurityEventType::LegacyMigrated,
                EventLevel::Info,
                format!("legacy key '{}' moved into secure storage", legacy_key),
            );
        }
        migrated
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BACKUPS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn create_backup<T: Serialize>(&self, value: &T) -> Result<EncryptedBackupPayload<T>> {
        let payload = backup::create_backup(&self.manager, value)?;
        self.events.record(
            SecurityEventType::BackupCreated,
            EventLevel::Info,
            format!("backup created under key {}", payload.metadata.key_id),
        );
        Ok(payload)
    }

    pub fn restore_backup<T: DeserializeOwned>(&self, payload: &EncryptedBackupPayload<T>) -> Result<T> {
        match backup::restore_backup(&self.manager, payload) {
            Ok(value) => {
                self.events.record(SecurityEventType::BackupRestored, EventLevel::Info, "backup restored");
                Ok(value)
            }
            Err(e) => {
                if matches!(e, BackupError::ChecksumMismatch | BackupError::Authentication) {
                    self.events.record(
                        SecurityEventType::Other("backup_rejected".into()),
                        EventLevel::Critical,
                        format!("backup rejected: {}", e),
                    );
                }
                Err(e.into())
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SECURITY EVENTS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn log_security_event(&self, event: SecurityEvent) {
        self.events.log(event);
    }

    /// Current history, most recent last
    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.events.list()
    }

    pub fn events(&self) -> &Arc<SecurityEventLog> {
        &self.events
    }
}
