//! # ALFA SecureStore - client-side encryption and secure storage core
//!
//! ## Components:
//! - Master key manager (Argon2id-wrapped master key, single-flight unlock)
//! - AEAD engine (XChaCha20-Poly1305 / AES-256-GCM)
//! - Key bundle resolver for every historical on-disk bundle shape
//! - Namespaced, size-guarded secure storage with per-item encryption
//! - One-time migrations and legacy plaintext key migration
//! - Encrypted persistence for state containers
//! - Encrypted, checksummed backups
//! - Bounded security event log

pub mod api;
pub mod backend;
pub mod backup;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod key_bundle;
pub mod logging;
pub mod master_key;
pub mod migration;
pub mod persistence;
pub mod storage;

// Re-exports
pub use api::SecureCore;
pub use backend::{BackendError, FileStore, KeyValueStore, MemoryStore};
pub use backup::{BackupError, EncryptedBackupPayload, EncryptedBlobMeta};
pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use events::{EventLevel, SecurityEvent, SecurityEventLog, SecurityEventType};
pub use key_bundle::{BundleError, KeyBundle, StoredKeyBundle};
pub use master_key::{KeyError, ManagerState, MasterKeyManager, WrappedKeyRecord};
pub use migration::{LegacyMigration, Migration, MigrationReport, MigrationRunner};
pub use persistence::{EncryptedStateStorage, PersistedState, PersistenceError, StateStorage};
pub use storage::{SafeJson, SecureStorage, SetResult, StorageErrorKind, StorageOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// System name
pub const SYSTEM_NAME: &str = "ALFA_SECURESTORE";
