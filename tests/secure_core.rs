//! End-to-end behaviour of the core over a file store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

use alfa_securestore::crypto::KdfProfile;
use alfa_securestore::{
    CoreConfig, KeyError, KeyValueStore, LegacyMigration, ManagerState, Migration, PersistedState,
    SecureCore, SecurityEvent, SecurityEventType, EventLevel, StateStorage, StorageErrorKind,
    StorageOptions,
};

fn config() -> CoreConfig {
    CoreConfig::default().with_kdf(KdfProfile::new(1, 64, 1))
}

fn pass(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct Session {
    user: Option<String>,
    visits: u32,
}

#[tokio::test]
async fn wrap_unwrap_then_lock() {
    let dir = tempdir().unwrap();
    let core = SecureCore::open_file(dir.path().join("store.json"), config()).unwrap();

    let err = core.decrypt_data("AAAA").unwrap_err();
    assert_eq!(err.to_string(), "decryption key not available");

    core.initialize_master_key(Some(&pass("p1"))).await.unwrap();
    assert_eq!(core.state(), ManagerState::Ready);

    let raw: Vec<u8> = (1..=32).collect();
    let record = core.manager().wrap_key(&raw).unwrap();
    assert_eq!(core.manager().unwrap_key(&record).unwrap().as_slice(), raw.as_slice());

    core.lock();
    assert_eq!(core.manager().unwrap_key(&record).unwrap_err(), KeyError::KeyUnavailable);
}

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");
    let opts = StorageOptions::new().encrypted();

    let key_id = {
        let core = SecureCore::open_file(&path, config()).unwrap();
        core.initialize_master_key(Some(&pass("p1"))).await.unwrap();

        let storage = core.create_secure_storage(Some("profile"));
        assert!(storage.set_with("email", "ada@example.com", &opts).success);
        assert!(storage.set("lang", "en").success);

        let mut session = PersistedState::<Session>::rehydrate("session", 1, core.state_storage());
        session.update(|s| s.visits += 1).unwrap();

        core.key_id().unwrap()
    };

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("ada@example.com"));
    assert!(raw.contains("profile:lang"));

    let core = SecureCore::open_file(&path, config()).unwrap();
    let storage = core.create_secure_storage(Some("profile"));
    assert_eq!(storage.get_with::<String>("email", &opts), None);

    let err = core.initialize_master_key(Some(&pass("wrong"))).await.unwrap_err();
    assert!(err.is_security_critical());
    assert_eq!(core.state(), ManagerState::Uninitialized);

    core.initialize_master_key(Some(&pass("p1"))).await.unwrap();
    assert_eq!(core.key_id().unwrap(), key_id);
    assert_eq!(
        storage.get_with::<String>("email", &opts).as_deref(),
        Some("ada@example.com")
    );

    let session = PersistedState::<Session>::rehydrate("session", 1, core.state_storage());
    assert_eq!(session.state().visits, 1);
    assert_eq!(
        core.events().count_of(&SecurityEventType::UnwrapFailed),
        1
    );
}

#[tokio::test]
async fn storage_guards() {
    let core = SecureCore::in_memory(config()).unwrap();
    let storage = core.create_secure_storage(None);

    let result = storage.set("INVALID KEY", &1);
    assert_eq!(result.error, Some(StorageErrorKind::InvalidKey));

    let too_big = "x".repeat(core.config().max_item_bytes + 1);
    let result = storage.set("big", too_big.as_str());
    assert_eq!(result.error, Some(StorageErrorKind::ValueTooLarge));
    assert!(storage.keys(None).is_empty());

    // master key not initialized yet
    let result = storage.set_with("secret", "v", &StorageOptions::new().encrypted());
    assert_eq!(result.error, Some(StorageErrorKind::EncryptionUnavailable));
    assert_eq!(
        core.events().count_of(&SecurityEventType::StorageRejected),
        3
    );
}

#[tokio::test]
async fn migrations_run_once() {
    let core = SecureCore::in_memory(config()).unwrap();
    core.initialize_master_key(None).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let migrations = vec![
        Migration::new("2024-01-rename-theme", move |storage| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(storage.set("theme", "dark").success, "write failed");
            Ok(())
        }),
        Migration::new("2024-02-broken", |_| anyhow::bail!("not today")),
    ];

    let first = core.run_migrations(&migrations);
    assert_eq!(first.applied, vec!["2024-01-rename-theme"]);
    assert_eq!(first.failed.len(), 1);

    let second = core.run_migrations(&migrations);
    assert!(second.applied.is_empty());
    assert_eq!(second.skipped, vec!["2024-01-rename-theme"]);
    assert_eq!(second.failed.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn legacy_values_move_encrypted() {
    let store = Arc::new(alfa_securestore::MemoryStore::new());
    store.set("auth_token", "\"t-123\"").unwrap();

    let core = SecureCore::new(store.clone(), config()).unwrap();
    core.initialize_master_key(Some(&pass("p1"))).await.unwrap();

    let options = LegacyMigration::new().namespace("auth").encrypted();
    assert!(core.migrate_legacy_key("auth_token", &options));
    assert!(store.get("auth_token").unwrap().is_none());

    let sealed = store.get("auth:auth_token").unwrap().unwrap();
    assert!(!sealed.contains("t-123"));

    let storage = core.create_secure_storage(Some("auth"));
    let opts = StorageOptions::new().encrypted();
    assert_eq!(storage.get_with::<String>("auth_token", &opts).as_deref(), Some("t-123"));

    store.set("auth_token", "\"t-456\"").unwrap();
    assert!(!core.migrate_legacy_key("auth_token", &options));
    assert_eq!(storage.get_with::<String>("auth_token", &opts).as_deref(), Some("t-123"));
}

#[tokio::test]
async fn state_adapter_fails_soft() {
    let core = SecureCore::in_memory(config()).unwrap();
    core.initialize_master_key(Some(&pass("p1"))).await.unwrap();
    let adapter = core.state_storage();

    adapter.set_item("cart", r#"{"items":[1,2]}"#).unwrap();
    core.lock();
    assert_eq!(adapter.get_item("cart"), None);
    assert!(adapter.set_item("cart", "{}").is_err());

    let cart = PersistedState::<Session>::rehydrate("cart", 1, adapter);
    assert_eq!(cart.state(), &Session::default());
}

#[test]
fn event_log_keeps_latest_thousand() {
    let core = SecureCore::in_memory(config()).unwrap();
    for i in 0..1100 {
        core.log_security_event(SecurityEvent::new(
            SecurityEventType::Other("test".into()),
            EventLevel::Info,
            format!("event {}", i),
        ));
    }

    let events = core.security_events();
    assert_eq!(events.len(), 1000);
    assert_eq!(events[0].message, "event 100");
    assert_eq!(events[999].message, "event 1099");
}
