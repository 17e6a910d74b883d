//! Decides when the queue drains.
//!
//! - offline → online: drain now
//! - background sync available: register the sync tag after a write and
//!   drain when the platform delivers it
//! - no background sync: drain right after the write, best effort
//!
//! There is no retry timer. Entries that fail wait for the next write,
//! reconnect or background-sync signal.

use crate::error::SyncResult;
use crate::queue::{DrainReport, OperationQueue, RemoteApply};
use async_trait::async_trait;
use edublog_types::{Mutation, PendingOperation, Table};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Platform facility that defers work until connectivity is likely.
#[async_trait]
pub trait BackgroundSync: Send + Sync {
    /// Registers `tag`. The platform later delivers it to
    /// [`SyncTrigger::on_background_sync_signal`].
    async fn register(&self, tag: &str) -> SyncResult<()>;
}

/// What scheduling after a write did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The sync tag was registered; the drain happens on signal.
    Registered { tag: String },
    /// The queue was drained directly.
    Drained(DrainReport),
    /// Known offline; the drain waits for reconnect.
    Deferred,
}

pub struct SyncTrigger {
    queue: Arc<OperationQueue>,
    remote: Arc<dyn RemoteApply>,
    background: RwLock<Option<Arc<dyn BackgroundSync>>>,
    online: AtomicBool,
}

impl SyncTrigger {
    /// Creates a trigger without background-sync capability. Assumes online.
    pub fn new(queue: Arc<OperationQueue>, remote: Arc<dyn RemoteApply>) -> Self {
        Self {
            queue,
            remote,
            background: RwLock::new(None),
            online: AtomicBool::new(true),
        }
    }

    pub fn with_background_sync(self, background: Arc<dyn BackgroundSync>) -> Self {
        self.set_background_sync(Some(background));
        self
    }

    /// Installs or removes the background-sync capability.
    pub fn set_background_sync(&self, background: Option<Arc<dyn BackgroundSync>>) {
        let mut slot = self
            .background
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = background;
    }

    fn background(&self) -> Option<Arc<dyn BackgroundSync>> {
        self.background
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    pub fn sync_tag(&self) -> &str {
        &self.queue.config().sync_tag
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records connectivity. Returns true on an offline → online edge.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online != online {
            info!("connectivity changed: {}", if online { "online" } else { "offline" });
        }
        online && !was_online
    }

    /// Persists an entry, then schedules a drain.
    pub async fn enqueue(&self, table: Table, mutation: Mutation) -> SyncResult<PendingOperation> {
        let op = self.queue.enqueue(table, mutation).await?;
        self.schedule_best_effort().await;
        Ok(op)
    }

    /// Writes the record locally, persists the entry, then schedules a drain.
    ///
    /// Succeeds once the local write is durable, whatever the remote does.
    pub async fn record(&self, table: Table, mutation: Mutation) -> SyncResult<PendingOperation> {
        let op = self.queue.apply_local(table, mutation).await?;
        self.schedule_best_effort().await;
        Ok(op)
    }

    async fn schedule_best_effort(&self) {
        if let Err(e) = self.schedule_if_no_background_sync().await {
            warn!("sync after local write failed: {e}");
        }
    }

    pub async fn drain(&self) -> SyncResult<DrainReport> {
        self.queue.drain(self.remote.as_ref()).await
    }

    /// Handles the offline → online transition.
    pub async fn on_reconnect(&self) -> SyncResult<DrainReport> {
        self.set_online(true);
        info!("reconnected, draining sync queue");
        self.drain().await
    }

    /// Handles a tag delivered by the background-sync facility.
    /// Tags other than ours are ignored.
    pub async fn on_background_sync_signal(&self, tag: &str) -> SyncResult<Option<DrainReport>> {
        if tag != self.sync_tag() {
            debug!("ignoring background sync tag {tag:?}");
            return Ok(None);
        }
        self.drain().await.map(Some)
    }

    /// Registers the sync tag when background sync exists, otherwise drains.
    ///
    /// A failed registration falls back to a direct drain.
    pub async fn schedule_if_no_background_sync(&self) -> SyncResult<TriggerOutcome> {
        if let Some(background) = self.background() {
            let tag = self.sync_tag().to_string();
            match background.register(&tag).await {
                Ok(()) => {
                    debug!("registered background sync {tag:?}");
                    return Ok(TriggerOutcome::Registered { tag });
                }
                Err(e) => warn!("{e}, draining directly"),
            }
        }

        if !self.is_online() {
            debug!("offline, drain deferred until reconnect");
            return Ok(TriggerOutcome::Deferred);
        }
        self.drain().await.map(TriggerOutcome::Drained)
    }

    /// Follows a connectivity channel, draining on every offline → online edge.
    pub fn watch_connectivity(self: Arc<Self>, mut online: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.set_online(*online.borrow_and_update());
            while online.changed().await.is_ok() {
                let now_online = *online.borrow_and_update();
                if self.set_online(now_online) {
                    if let Err(e) = self.drain().await {
                        warn!("drain after reconnect failed: {e}");
                    }
                }
            }
            debug!("connectivity channel closed");
        })
    }
}
