//! Sync configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Background-sync tag registered for queued post and category writes.
pub const SYNC_TAG: &str = "sync-posts";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tag registered with the platform's background-sync facility.
    pub sync_tag: String,

    /// Upper bound on a single remote apply, in milliseconds.
    pub apply_timeout_ms: u64,

    /// Failed applies after which an entry is dead-lettered.
    /// `None` retries transient failures forever.
    pub max_attempts: Option<u32>,

    /// Dead-letter entries the remote rejects outright (validation errors).
    pub dead_letter_permanent: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_tag: SYNC_TAG.to_string(),
            apply_timeout_ms: 15_000,
            max_attempts: None,
            dead_letter_permanent: true,
        }
    }
}

impl SyncConfig {
    pub fn apply_timeout(&self) -> Duration {
        Duration::from_millis(self.apply_timeout_ms)
    }
}
