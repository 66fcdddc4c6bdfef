//! One-time migrations
//!
//! Applied migration ids are kept as a JSON array in secure storage and
//! rewritten after every successful step, so a crash mid-run neither replays
//! finished steps nor loses them. A failing step is logged, left unmarked
//! and retried on the next run.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::KeyValueStore;
use crate::config::CoreConfig;
use crate::events::{EventLevel, SecurityEventLog, SecurityEventType};
use crate::storage::{SecureStorage, StorageOptions};

pub type MigrationAction = dyn Fn(&SecureStorage) -> anyhow::Result<()> + Send + Sync;

/// Named, idempotent migration step
pub struct Migration {
    id: String,
    action: Box<MigrationAction>,
}

impl Migration {
    pub fn new<F>(id: impl Into<String>, action: F) -> Self
    where
        F: Fn(&SecureStorage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            action: Box::new(action),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMigration {
    pub id: String,
    pub error: String,
}

/// What a single `run` did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    /// Already present in the record
    pub skipped: Vec<String>,
    pub failed: Vec<FailedMigration>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct MigrationRunner {
    /// Handle passed to migration actions
    storage: SecureStorage,
    /// Handle holding the applied-id record
    record: SecureStorage,
    record_key: String,
    events: Arc<SecurityEventLog>,
}

impl MigrationRunner {
    pub fn new(storage: SecureStorage, config: &CoreConfig, events: Arc<SecurityEventLog>) -> Self {
        let record = storage
            .clone()
            .with_namespace(config.migrations_namespace.clone())
            .internal();
        Self {
            storage,
            record,
            record_key: config.migrations_key.clone(),
            events,
        }
    }

    /// Applied ids in application order; empty if the record is missing or unreadable
    pub fn applied_ids(&self) -> Vec<String> {
        self.load_applied().unwrap_or_default()
    }

    fn load_applied(&self) -> Result<Vec<String>, serde_json::Error> {
        match self.record.get_raw(&self.record_key, &StorageOptions::default()) {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw),
        }
    }

    fn persist(&self, applied: &[String]) -> bool {
        let result = self.record.set(&self.record_key, applied);
        if !result.success {
            tracing::error!(error = ?result.error, "could not persist migration record");
        }
        result.success
    }

    /// Run every migration not yet recorded, in order
    pub fn run(&self, migrations: &[Migration]) -> MigrationReport {
        let mut applied = match self.load_applied() {
            Ok(applied) => applied,
            Err(e) => {
                // never rewrite a history we cannot read
                tracing::error!(error = %e, "migration record unreadable, skipping migrations");
                self.events.record(
                    SecurityEventType::MigrationFailed,
                    EventLevel::Critical,
                    format!("migration record unreadable: {}", e),
                );
                return MigrationReport {
                    failed: migrations
                        .iter()
                        .map(|m| FailedMigration {
                            id: m.id.clone(),
                            error: "migration record unreadable".into(),
                        })
                        .collect(),
                    ..MigrationReport::default()
                };
            }
        };
        let mut done: HashSet<String> = applied.iter().cloned().collect();
        let mut report = MigrationReport::default();

        for migration in migrations {
            if done.contains(&migration.id) {
                report.skipped.push(migration.id.clone());
                continue;
            }

            match (migration.action)(&self.storage) {
                Ok(()) => {
                    applied.push(migration.id.clone());
                    done.insert(migration.id.clone());
                    self.persist(&applied);

                    self.events.record(
                        SecurityEventType::MigrationApplied,
                        EventLevel::Info,
                        format!("migration '{}' applied", migration.id),
                    );
                    report.applied.push(migration.id.clone());
                }
                Err(e) => {
                    self.events.record(
                        SecurityEventType::MigrationFailed,
                        EventLevel::Warning,
                        format!("migration '{}' failed: {:#}", migration.id, e),
                    );
                    report.failed.push(FailedMigration {
                        id: migration.id.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        tracing::info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "migrations finished"
        );
        report
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEGACY KEYS
// ═══════════════════════════════════════════════════════════════════════════════

pub type LegacyTransform = dyn Fn(Value) -> Value + Send + Sync;

/// How a legacy plaintext value is moved into secure storage
pub struct LegacyMigration {
    /// Logical key in secure storage (defaults to the legacy key)
    pub target_key: Option<String>,
    pub namespace: Option<String>,
    pub encrypt: bool,
    pub transform: Option<Box<LegacyTransform>>,
    /// Erase the legacy value once it has been written
    pub remove_legacy: bool,
}

impl Default for LegacyMigration {
    fn default() -> Self {
        Self {
            target_key: None,
            namespace: None,
            encrypt: false,
            transform: None,
            remove_legacy: true,
        }
    }
}

impl LegacyMigration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_key(mut self, key: impl Into<String>) -> Self {
        self.target_key = Some(key.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Box::new(f));
        self
    }

    pub fn keep_legacy(mut self) -> Self {
        self.remove_legacy = false;
        self
    }
}

/// Move `legacy_key` from the plaintext store into secure storage.
///
/// Returns `false` without touching anything when a secure value already
/// exists or the legacy value is absent.
pub fn migrate_legacy_key(
    legacy: &dyn KeyValueStore,
    storage: &SecureStorage,
    legacy_key: &str,
    options: &LegacyMigration,
) -> bool {
    let target = options.target_key.as_deref().unwrap_or(legacy_key);
    let opts = StorageOptions {
        namespace: options.namespace.clone(),
        encrypt: options.encrypt,
        cipher: None,
    };

    if storage.contains(target, &opts) {
        tracing::debug!(key = %target, "secure value exists, legacy migration skipped");
        return false;
    }

    let raw = match legacy.get(legacy_key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return false,
        Err(e) => {
            tracing::warn!(key = %legacy_key, error = %e, "legacy value unreadable");
            return false;
        }
    };

    let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
    let value = match &options.transform {
        Some(transform) => transform(value),
        None => value,
    };

    let result = storage.set_with(target, &value, &opts);
    if !result.success {
        tracing::warn!(key = %target, error = ?result.error, "legacy value could not be stored");
        return false;
    }

    if options.remove_legacy {
        if let Err(e) = legacy.remove(legacy_key) {
            tracing::warn!(key = %legacy_key, error = %e, "legacy value could not be erased");
        }
    }

    tracing::info!(from = %legacy_key, to = %target, "legacy key migrated");
    true
}
