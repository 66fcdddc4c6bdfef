//! Error types for ALFA SecureStore
//!
//! Each layer owns a small error enum; `CoreError` gathers them for callers
//! that drive the whole core through [`crate::SecureCore`].

use thiserror::Error;

use crate::backend::BackendError;
use crate::backup::BackupError;
use crate::crypto::{AeadError, KdfError};
use crate::key_bundle::BundleError;
use crate::master_key::KeyError;
use crate::persistence::PersistenceError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    KeyDerivation(#[from] KdfError),

    #[error(transparent)]
    Aead(#[from] AeadError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Errors that point at tampering or a wrong secret rather than a usage mistake.
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            Self::Key(KeyError::Unwrap)
                | Self::Aead(AeadError::Decrypt)
                | Self::Backup(BackupError::ChecksumMismatch)
                | Self::Backup(BackupError::Authentication)
        )
    }

    /// Errors caused by calling into a locked or never-initialized core.
    pub fn is_key_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Key(KeyError::KeyUnavailable)
                | Self::Persistence(PersistenceError::KeyUnavailable)
                | Self::Backup(BackupError::KeyUnavailable)
        )
    }
}
