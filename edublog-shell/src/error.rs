//! Shell error types.

use edublog_storage::StorageError;
use edublog_sync::SyncError;
use thiserror::Error;

pub type ShellResult<T> = Result<T, ShellError>;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("fetch {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("fetch {url} returned {status}")]
    BadStatus { url: String, status: u16 },

    #[error("cache error: {0}")]
    Storage(#[from] StorageError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("shell task failed: {0}")]
    Task(String),
}
