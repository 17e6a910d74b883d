//! Durable operation queue and its drain.
//!
//! Entries are applied strictly in ascending sequence order. Each success is
//! removed from the store before the next entry is attempted, so a crash at
//! any point resumes after the last removed entry. An entry whose remote
//! apply succeeded but whose removal did not survive a crash is replayed;
//! the backend treats a replayed insert as success.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use edublog_remote::{RemoteBackend, RemoteResult};
use edublog_storage::{LocalStore, StorageResult};
use edublog_types::{DeadLetter, Mutation, PendingOperation, SequenceId, Table};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

/// Applies one pending operation to the remote store.
#[async_trait]
pub trait RemoteApply: Send + Sync {
    async fn apply(&self, op: &PendingOperation) -> RemoteResult<()>;
}

#[async_trait]
impl<T: RemoteBackend + ?Sized> RemoteApply for T {
    async fn apply(&self, op: &PendingOperation) -> RemoteResult<()> {
        match &op.mutation {
            Mutation::Create(record) => self.insert(op.table, record).await,
            Mutation::Update(record) => self.update(op.table, &record.id, &record.data).await,
            Mutation::Delete { id } => self.delete_by_id(op.table, id).await,
        }
    }
}

/// Outcome of one [`OperationQueue::drain`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries applied and removed.
    pub applied: usize,
    /// Entries that failed and stay queued.
    pub failed: usize,
    /// Entries moved to the dead-letter table.
    pub dead_lettered: usize,
    /// Passes over the queue (more than one when writes arrived mid-drain).
    pub passes: usize,
    /// True if another drain was running and was asked to make a further pass.
    pub skipped: bool,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.applied + self.failed + self.dead_lettered
    }
}

struct ApplyFailure {
    message: String,
    permanent: bool,
}

pub struct OperationQueue {
    store: LocalStore,
    config: SyncConfig,
    drain_lock: TokioMutex<()>,
    /// Set when a pass is wanted; consumed by whoever holds `drain_lock`.
    rerun: AtomicBool,
}

impl OperationQueue {
    pub fn new(store: LocalStore, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            drain_lock: TokioMutex::new(()),
            rerun: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// True while a drain holds the queue.
    pub fn is_draining(&self) -> bool {
        self.drain_lock.try_lock().is_err()
    }

    /// Runs a store call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(LocalStore) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
            .map_err(SyncError::from)
    }

    /// Persists a new entry. Never touches the network.
    pub async fn enqueue(&self, table: Table, mutation: Mutation) -> SyncResult<PendingOperation> {
        self.blocking(move |store| store.append_operation(table, &mutation))
            .await
    }

    /// Writes the record locally and persists the entry in one transaction.
    pub async fn apply_local(
        &self,
        table: Table,
        mutation: Mutation,
    ) -> SyncResult<PendingOperation> {
        self.blocking(move |store| store.apply_local(table, &mutation))
            .await
    }

    /// Queued entries, ascending by sequence id.
    pub async fn pending(&self) -> SyncResult<Vec<PendingOperation>> {
        self.blocking(|store| store.list_operations()).await
    }

    pub async fn pending_count(&self) -> SyncResult<usize> {
        self.blocking(|store| store.pending_count()).await
    }

    pub async fn dead_letters(&self) -> SyncResult<Vec<DeadLetter>> {
        self.blocking(|store| store.list_dead_letters()).await
    }

    /// Puts a dead letter back at the tail of the queue.
    pub async fn requeue_dead_letter(
        &self,
        seq: SequenceId,
    ) -> SyncResult<Option<PendingOperation>> {
        self.blocking(move |store| store.requeue_dead_letter(seq))
            .await
    }

    pub async fn discard_dead_letter(&self, seq: SequenceId) -> SyncResult<bool> {
        self.blocking(move |store| store.discard_dead_letter(seq))
            .await
    }

    /// Replays queued entries against `remote`.
    ///
    /// Only one drain runs at a time. A call made while another drain is in
    /// progress returns immediately with `skipped` set, and the running drain
    /// makes one more pass to pick up entries enqueued meanwhile. Entries
    /// already attempted by this drain are left for the next one.
    ///
    /// Remote failures are recorded per entry and never abort the drain.
    /// Local storage faults do.
    pub async fn drain<R>(&self, remote: &R) -> SyncResult<DrainReport>
    where
        R: RemoteApply + ?Sized,
    {
        let mut report = DrainReport::default();
        let mut attempted = HashSet::new();

        loop {
            self.rerun.store(true, Ordering::SeqCst);
            let Ok(guard) = self.drain_lock.try_lock() else {
                debug!("drain already running, requested another pass");
                report.skipped = report.passes == 0;
                return Ok(report);
            };

            while self.rerun.swap(false, Ordering::SeqCst) {
                report.passes += 1;
                self.drain_pass(remote, &mut attempted, &mut report).await?;
            }
            drop(guard);

            // A request that lost the lock race after our last check.
            if !self.rerun.load(Ordering::SeqCst) {
                break;
            }
        }

        if report.attempted() > 0 {
            info!(
                "drain finished: {} applied, {} failed, {} dead-lettered",
                report.applied, report.failed, report.dead_lettered
            );
        }
        Ok(report)
    }

    async fn drain_pass<R>(
        &self,
        remote: &R,
        attempted: &mut HashSet<SequenceId>,
        report: &mut DrainReport,
    ) -> SyncResult<()>
    where
        R: RemoteApply + ?Sized,
    {
        let snapshot = self.pending().await?;
        for op in snapshot {
            if !attempted.insert(op.sequence_id) {
                continue;
            }
            self.apply_one(remote, &op, report).await?;
        }
        Ok(())
    }

    async fn apply_one<R>(
        &self,
        remote: &R,
        op: &PendingOperation,
        report: &mut DrainReport,
    ) -> SyncResult<()>
    where
        R: RemoteApply + ?Sized,
    {
        let seq = op.sequence_id;
        let timeout = self.config.apply_timeout();
        let result = match tokio::time::timeout(timeout, remote.apply(op)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ApplyFailure {
                permanent: e.is_permanent(),
                message: e.to_string(),
            }),
            Err(_) => Err(ApplyFailure {
                message: format!("remote apply timed out after {}ms", timeout.as_millis()),
                permanent: false,
            }),
        };

        match result {
            Ok(()) => {
                self.blocking(move |store| store.remove_operation(seq)).await?;
                report.applied += 1;
                debug!("applied {seq} {} {}/{}", op.kind(), op.table, op.record_id());
            }
            Err(failure) => {
                warn!(
                    "apply {seq} {} {}/{} failed: {}",
                    op.kind(),
                    op.table,
                    op.record_id(),
                    failure.message
                );
                let budget_spent = self
                    .config
                    .max_attempts
                    .is_some_and(|max| op.attempts + 1 >= max);
                let message = failure.message;

                if (failure.permanent && self.config.dead_letter_permanent) || budget_spent {
                    self.blocking(move |store| store.dead_letter(seq, &message))
                        .await?;
                    report.dead_lettered += 1;
                    warn!("{seq} moved to dead letters");
                } else {
                    self.blocking(move |store| store.record_failure(seq, &message))
                        .await?;
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }
}
