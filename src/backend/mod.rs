//! Persistent key/value store contract and the bundled backends
//!
//! The core treats the backend as an opaque string store with atomic
//! single-key reads and writes. Quota exhaustion is reported as
//! [`BackendError::QuotaExceeded`] so the storage layer can turn it into a
//! typed result.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Storage quota exceeded: {needed} bytes needed, {limit} allowed")]
    QuotaExceeded { needed: usize, limit: usize },

    #[error("Store corrupted: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    fn remove(&self, key: &str) -> Result<(), BackendError>;

    fn list_keys(&self) -> Result<Vec<String>, BackendError>;
}

/// Bytes a set of entries occupies against a quota
pub(crate) fn footprint<'a>(entries: impl Iterator<Item = (&'a String, &'a String)>) -> usize {
    entries.map(|(k, v)| k.len() + v.len()).sum()
}
