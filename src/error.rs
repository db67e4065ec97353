//! Error taxonomy for folder sync.
//!
//! - [`SyncError::PermissionDenied`] - folder access refused or revoked; the
//!   user must enable sync again
//! - [`SyncError::NotEnabled`] - a sync operation was attempted while disabled
//! - [`SyncError::Io`] - reading or writing the backup file failed; the next
//!   debounced or manual sync is the retry path
//! - [`SyncError::Format`] - the backup document is malformed or foreign;
//!   local data is left untouched
//! - [`SyncError::Store`] - the local database failed

use thiserror::Error;

/// Result type alias for sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("folder permission denied: {0}")]
    PermissionDenied(String),

    #[error("folder sync is not enabled")]
    NotEnabled,

    #[error("backup I/O failed: {0}")]
    Io(String),

    #[error("invalid backup document: {0}")]
    Format(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SyncError {
    #[inline]
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    #[inline]
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    #[inline]
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}
