//! Sync error types.

use edublog_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("background sync registration failed: {0}")]
    BackgroundSync(String),

    #[error("sync task failed: {0}")]
    Task(String),
}
