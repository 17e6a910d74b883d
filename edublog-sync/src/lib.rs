//! Offline-first sync core for EduBlog.
//!
//! - [`OperationQueue`]: durable FIFO of local writes, drained in sequence
//!   order against the remote backend, single flight.
//! - [`SyncTrigger`]: decides when to drain (reconnect, background-sync
//!   signal, or immediately after a write when no background sync exists).

pub mod config;
pub mod error;
pub mod queue;
pub mod trigger;

pub use config::{SyncConfig, SYNC_TAG};
pub use error::{SyncError, SyncResult};
pub use queue::{DrainReport, OperationQueue, RemoteApply};
pub use trigger::{BackgroundSync, SyncTrigger, TriggerOutcome};
