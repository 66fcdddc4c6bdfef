//! Encrypted persistence for state containers
//!
//! [`EncryptedStateStorage`] implements the `get_item`/`set_item`/`remove_item`
//! contract a state container persists through. Snapshots are sealed with the
//! state subkey of the master key, bound to the item name as AAD. A snapshot
//! that cannot be opened reads as "no prior state".

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::backend::{BackendError, KeyValueStore};
use crate::crypto::purposes;
use crate::master_key::{KeyError, MasterKeyManager};
use crate::storage::is_valid_key;

/// Namespace of persisted state snapshots
pub const STATE_NAMESPACE: &str = "state";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("decryption key not available")]
    KeyUnavailable,

    #[error("Invalid state name: {0}")]
    InvalidName(String),

    #[error("State encryption failed: {0}")]
    Encrypt(String),

    #[error("State serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<KeyError> for PersistenceError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::KeyUnavailable => PersistenceError::KeyUnavailable,
            other => PersistenceError::Encrypt(other.to_string()),
        }
    }
}

/// Read/write contract of a state persistence mechanism
pub trait StateStorage: Send + Sync {
    /// Serialized state, or `None` if there is none usable
    fn get_item(&self, name: &str) -> Option<String>;

    fn set_item(&self, name: &str, value: &str) -> Result<(), PersistenceError>;

    fn remove_item(&self, name: &str) -> Result<(), PersistenceError>;
}

pub struct EncryptedStateStorage {
    store: Arc<dyn KeyValueStore>,
    manager: Arc<MasterKeyManager>,
}

impl EncryptedStateStorage {
    pub fn new(store: Arc<dyn KeyValueStore>, manager: Arc<MasterKeyManager>) -> Self {
        Self { store, manager }
    }

    fn physical_key(name: &str) -> Result<String, PersistenceError> {
        if !is_valid_key(name) {
            return Err(PersistenceError::InvalidName(name.to_string()));
        }
        Ok(format!("{}:{}", STATE_NAMESPACE, name))
    }
}

impl StateStorage for EncryptedStateStorage {
    fn get_item(&self, name: &str) -> Option<String> {
        let key = Self::physical_key(name).ok()?;
        let sealed = match self.store.get(&key) {
            Ok(sealed) => sealed?,
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "state read failed");
                return None;
            }
        };

        let plain = match self
            .manager
            .decrypt_data_with(purposes::STATE, Some(name.as_bytes()), &sealed)
        {
            Ok(plain) => plain,
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "persisted state unreadable, starting fresh");
                return None;
            }
        };

        String::from_utf8(plain.to_vec()).ok()
    }

    fn set_item(&self, name: &str, value: &str) -> Result<(), PersistenceError> {
        let key = Self::physical_key(name)?;
        let sealed = self
            .manager
            .encrypt_data_with(purposes::STATE, Some(name.as_bytes()), value.as_bytes())?;
        self.store.set(&key, &sealed)?;
        tracing::debug!(name = %name, bytes = value.len(), "state persisted");
        Ok(())
    }

    fn remove_item(&self, name: &str) -> Result<(), PersistenceError> {
        let key = Self::physical_key(name)?;
        self.store.remove(&key)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTED STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize, Deserialize)]
struct Snapshot<T> {
    state: T,
    version: u32,
}

/// A state value mirrored into a [`StateStorage`] as `{state, version}`
pub struct PersistedState<T> {
    name: String,
    version: u32,
    storage: Arc<dyn StateStorage>,
    state: T,
}

impl<T> PersistedState<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Load the stored snapshot; anything missing, unreadable or of another
    /// version yields `T::default()`.
    pub fn rehydrate(name: impl Into<String>, version: u32, storage: Arc<dyn StateStorage>) -> Self {
        Self::rehydrate_with(name, version, storage, |_, _| None)
    }

    /// Like [`rehydrate`](Self::rehydrate), offering snapshots of another
    /// version to `migrate(state, stored_version)` first.
    pub fn rehydrate_with<F>(
        name: impl Into<String>,
        version: u32,
        storage: Arc<dyn StateStorage>,
        migrate: F,
    ) -> Self
    where
        F: FnOnce(Value, u32) -> Option<T>,
    {
        let name = name.into();
        let stored = storage
            .get_item(&name)
            .and_then(|raw| serde_json::from_str::<Snapshot<Value>>(&raw).ok());

        let state = match stored {
            Some(snapshot) if snapshot.version == version => {
                serde_json::from_value(snapshot.state).unwrap_or_else(|e| {
                    tracing::warn!(name = %name, error = %e, "snapshot does not match state shape");
                    T::default()
                })
            }
            Some(snapshot) => {
                tracing::info!(name = %name, from = snapshot.version, to = version, "migrating snapshot");
                migrate(snapshot.state, snapshot.version).unwrap_or_default()
            }
            None => T::default(),
        };

        Self {
            name,
            version,
            storage,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn state(&self) -> &T {
        &self.state
    }

    /// Write the current state
    pub fn persist(&self) -> Result<(), PersistenceError> {
        let snapshot = Snapshot {
            state: &self.state,
            version: self.version,
        };
        let json = serde_json::to_string(&snapshot)?;
        self.storage.set_item(&self.name, &json)
    }

    /// Mutate and persist. The in-memory state keeps the change even when the
    /// write fails.
    pub fn update(&mut self, f: impl FnOnce(&mut T)) -> Result<(), PersistenceError> {
        f(&mut self.state);
        self.persist()
    }

    pub fn replace(&mut self, state: T) -> Result<(), PersistenceError> {
        self.state = state;
        self.persist()
    }

    /// Reset to the default and erase the stored snapshot
    pub fn clear(&mut self) -> Result<(), PersistenceError> {
        self.state = T::default();
        self.storage.remove_item(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::master_key::tests::ready_manager;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Wallet {
        accounts: Vec<String>,
        selected: Option<usize>,
    }

    async fn adapter() -> (Arc<MemoryStore>, Arc<MasterKeyManager>, Arc<EncryptedStateStorage>) {
        let store = Arc::new(MemoryStore::new());
        let manager = ready_manager().await;
        let adapter = Arc::new(EncryptedStateStorage::new(store.clone(), manager.clone()));
        (store, manager, adapter)
    }

    #[tokio::test]
    async fn test_item_roundtrip_is_encrypted() {
        let (store, _, adapter) = adapter().await;

        adapter.set_item("wallet", r#"{"balance":12}"#).unwrap();
        let stored = store.get("state:wallet").unwrap().unwrap();
        assert!(!stored.contains("balance"));
        assert_eq!(adapter.get_item("wallet").as_deref(), Some(r#"{"balance":12}"#));

        adapter.remove_item("wallet").unwrap();
        assert_eq!(adapter.get_item("wallet"), None);
    }

    #[tokio::test]
    async fn test_unreadable_state_is_absent() {
        let (store, _, adapter) = adapter().await;

        store.set("state:garbage", "not a sealed blob").unwrap();
        assert_eq!(adapter.get_item("garbage"), None);

        // sealed under a different master key
        let other = EncryptedStateStorage::new(store.clone(), ready_manager().await);
        other.set_item("foreign", "{}").unwrap();
        assert_eq!(adapter.get_item("foreign"), None);

        // sealed for a different item name
        adapter.set_item("a", "{}").unwrap();
        let sealed = store.get("state:a").unwrap().unwrap();
        store.set("state:b", &sealed).unwrap();
        assert_eq!(adapter.get_item("b"), None);
    }

    #[tokio::test]
    async fn test_locked_manager_never_writes_plaintext() {
        let (store, manager, adapter) = adapter().await;
        adapter.set_item("wallet", "{}").unwrap();
        let writes = store.write_count();

        manager.lock();
        let err = adapter.set_item("wallet", r#"{"secret":true}"#).unwrap_err();
        assert!(matches!(err, PersistenceError::KeyUnavailable));
        assert_eq!(store.write_count(), writes);
        assert_eq!(adapter.get_item("wallet"), None);
    }

    #[tokio::test]
    async fn test_persisted_state_rehydrates() {
        let (_, _, adapter) = adapter().await;

        let mut wallet = PersistedState::<Wallet>::rehydrate("wallet", 1, adapter.clone());
        assert_eq!(wallet.state(), &Wallet::default());
        wallet
            .update(|w| {
                w.accounts.push("main".into());
                w.selected = Some(0);
            })
            .unwrap();

        let reloaded = PersistedState::<Wallet>::rehydrate("wallet", 1, adapter.clone());
        assert_eq!(reloaded.state().accounts, vec!["main".to_string()]);
        assert_eq!(reloaded.state().selected, Some(0));

        let newer = PersistedState::<Wallet>::rehydrate("wallet", 2, adapter.clone());
        assert_eq!(newer.state(), &Wallet::default());

        let migrated = PersistedState::<Wallet>::rehydrate_with("wallet", 2, adapter.clone(), |old, v| {
            assert_eq!(v, 1);
            serde_json::from_value(old).ok()
        });
        assert_eq!(migrated.state().selected, Some(0));
    }

    #[tokio::test]
    async fn test_corrupted_snapshot_defaults() {
        let (_, _, adapter) = adapter().await;
        adapter.set_item("wallet", r#"{"state":{"accounts":7},"version":1}"#).unwrap();

        let mut wallet = PersistedState::<Wallet>::rehydrate("wallet", 1, adapter.clone());
        assert_eq!(wallet.state(), &Wallet::default());

        wallet.clear().unwrap();
        assert_eq!(adapter.get_item("wallet"), None);
    }
}
