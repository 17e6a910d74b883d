//! Remote adapter error types.

use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by a remote apply.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The host could not be reached at all.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RemoteError {
    /// True if retrying the same request later may succeed.
    ///
    /// Auth failures count as transient: the session may be refreshed
    /// before the next drain.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Http(e) => !e.is_builder(),
            RemoteError::Status { status, .. } => {
                matches!(status, 401 | 403 | 408 | 429) || *status >= 500
            }
            RemoteError::Unavailable(_) => true,
            RemoteError::Serialization(_)
            | RemoteError::InvalidPayload(_)
            | RemoteError::Config(_) => false,
        }
    }

    /// True if the request can never succeed as written.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}
