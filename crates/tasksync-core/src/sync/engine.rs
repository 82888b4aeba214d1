//! Sync engine: one push/pull/resolve cycle at a time.
//!
//! A cycle moves `Idle → Pushing → Pulling → Resolving → Idle`. An
//! unreachable remote during push or pull moves it to `Failed`, abandons the
//! rest of the cycle with the queue untouched, and returns to `Idle`.
//!
//! The database lock is never held across a remote call. Each logical change
//! (one push result, one whole pull batch plus its watermark) is written in
//! its own transaction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use super::resolver::{resolve, Version};
use super::{
    PullBatch, PushItem, PushOutcome, Remote, RemoteError, RemoteTask, RetryPolicy, SyncError,
};
use crate::config::SyncConfig;
use crate::db::{
    ConflictLog, Database, SqliteSyncStateRepository, SqliteTaskStore, SyncQueue,
    SyncStateRepository, TaskQuery, TaskStore,
};
use crate::models::{
    QueueStats, SyncConflict, SyncQueueEntry, SyncStatus, Task, TaskId, Watermark,
};
use crate::state::EngineState;
use crate::util::unix_millis_now;

/// Counters for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Tasks durably accepted by the remote
    pub pushed: usize,
    /// Tasks whose push failed and will be retried
    pub retrying: usize,
    /// Tasks flagged `error` in this cycle
    pub failed: usize,
    /// Records received from the remote
    pub pulled: usize,
    /// Existing local tasks changed by pulled records
    pub updated: usize,
    /// Local tasks materialized from remote records
    pub created: usize,
    /// Resolutions where both sides had diverged
    pub conflicts: usize,
    /// Watermark persisted at the end of the cycle
    pub watermark: Option<Watermark>,
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Push and pull both reached the remote
    Completed(CycleReport),
    /// The remote could not be reached; nothing after `phase` ran
    Aborted {
        phase: EngineState,
        reason: String,
        report: CycleReport,
    },
    /// Another cycle was in flight; this trigger was folded into it
    Coalesced,
}

enum Phase {
    Continue,
    Abort(String),
}

/// Orchestrates sync cycles between the local store and a [`Remote`]
pub struct SyncEngine<R> {
    db: Arc<Mutex<Database>>,
    remote: R,
    config: SyncConfig,
    retry: RetryPolicy,
    cycle_lock: Mutex<()>,
    state: watch::Sender<EngineState>,
}

impl<R: Remote> SyncEngine<R> {
    /// Create an engine over a shared database handle
    pub fn new(db: Arc<Mutex<Database>>, remote: R, config: SyncConfig) -> Self {
        let retry = config.retry_policy();
        let (state, _) = watch::channel(EngineState::Idle);
        Self {
            db,
            remote,
            config,
            retry,
            cycle_lock: Mutex::new(()),
            state,
        }
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Current phase
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Observe phase transitions
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Run one cycle now
    pub async fn sync_now(&self) -> Result<CycleOutcome, SyncError> {
        self.run_cycle(unix_millis_now()).await
    }

    /// Run one cycle with `now` (Unix ms) as the cycle clock
    ///
    /// Returns [`CycleOutcome::Coalesced`] without doing anything when
    /// another cycle is already running. Storage failures abort the cycle
    /// and are returned as [`SyncError::Storage`].
    pub async fn run_cycle(&self, now: i64) -> Result<CycleOutcome, SyncError> {
        let Ok(_running) = self.cycle_lock.try_lock() else {
            tracing::debug!("Sync cycle already in flight; coalescing trigger");
            return Ok(CycleOutcome::Coalesced);
        };

        let result = self.cycle(now).await;
        match &result {
            Ok(CycleOutcome::Completed(report)) => tracing::info!(
                "Sync cycle completed: {} pushed, {} retrying, {} failed, {} pulled, {} created, {} updated, {} conflicts",
                report.pushed,
                report.retrying,
                report.failed,
                report.pulled,
                report.created,
                report.updated,
                report.conflicts
            ),
            Ok(CycleOutcome::Aborted { phase, reason, .. }) => {
                tracing::warn!("Sync cycle aborted while {phase:?}: {reason}");
            }
            Ok(CycleOutcome::Coalesced) => {}
            Err(error) => tracing::error!("Sync cycle failed: {error}"),
        }
        self.set_state(EngineState::Idle);
        result
    }

    async fn cycle(&self, now: i64) -> Result<CycleOutcome, SyncError> {
        let mut report = CycleReport::default();

        self.set_state(EngineState::Pushing);
        if let Phase::Abort(reason) = self.push_pending(now, &mut report).await? {
            return Ok(self.abort(EngineState::Pushing, reason, report));
        }

        self.set_state(EngineState::Pulling);
        let watermark = {
            let db = self.db.lock().await;
            SqliteSyncStateRepository::new(db.connection())
                .load()?
                .watermark
        };
        let batch = match self.call(self.remote.pull(watermark.as_ref())).await {
            Ok(batch) => batch,
            Err(error) => {
                return Ok(self.abort(EngineState::Pulling, error.to_string(), report));
            }
        };

        self.set_state(EngineState::Resolving);
        self.absorb_batch(&batch, watermark.as_ref(), now, &mut report)
            .await?;
        report.watermark = Some(batch.new_watermark);

        Ok(CycleOutcome::Completed(report))
    }

    fn abort(&self, phase: EngineState, reason: String, report: CycleReport) -> CycleOutcome {
        self.set_state(EngineState::Failed);
        CycleOutcome::Aborted {
            phase,
            reason,
            report,
        }
    }

    /// Push every eligible queue entry as one batch
    async fn push_pending(&self, now: i64, report: &mut CycleReport) -> Result<Phase, SyncError> {
        let batch = {
            let mut db = self.db.lock().await;
            db.transaction(|tx| self.eligible_tasks(tx, now))?
        };
        if batch.is_empty() {
            return Ok(Phase::Continue);
        }

        tracing::debug!("Pushing {} task(s)", batch.len());
        let items: Vec<PushItem> = batch.iter().map(PushItem::from).collect();
        let response = self.call(self.remote.push(&items)).await;

        let mut results = match response {
            Ok(results) => results
                .into_iter()
                .map(|result| (result.task_id, result.outcome))
                .collect::<HashMap<_, _>>(),
            Err(RemoteError::Unreachable(reason)) => return Ok(Phase::Abort(reason)),
            Err(error) => {
                tracing::warn!("Push batch failed: {error}");
                batch
                    .iter()
                    .map(|task| (task.id, PushOutcome::Failed(error.clone())))
                    .collect()
            }
        };

        let mut db = self.db.lock().await;
        for task in &batch {
            let outcome = results.remove(&task.id).unwrap_or_else(|| {
                PushOutcome::Failed(RemoteError::Protocol(format!(
                    "no push result for task {}",
                    task.id
                )))
            });
            db.transaction(|tx| match outcome {
                PushOutcome::Accepted { server_id } => {
                    self.apply_accepted(tx, task, server_id, now)?;
                    report.pushed += 1;
                    Ok(())
                }
                PushOutcome::Failed(error) => {
                    match self.apply_failed(tx, &task.id, &error.into(), now)? {
                        SyncStatus::Error => report.failed += 1,
                        _ => report.retrying += 1,
                    }
                    Ok(())
                }
            })?;
        }

        Ok(Phase::Continue)
    }

    fn eligible_tasks(&self, conn: &Connection, now: i64) -> crate::Result<Vec<Task>> {
        let queue = SyncQueue::new(conn);
        let store = SqliteTaskStore::new(conn);

        let mut tasks = Vec::new();
        for entry in queue.dequeue_eligible(now)? {
            if tasks.len() >= self.config.batch_size {
                break;
            }
            match store.get(&entry.task_id)? {
                Some(task) => tasks.push(task),
                None => queue.remove(&entry.task_id)?,
            }
        }
        Ok(tasks)
    }

    /// Record an accepted push of `pushed`
    ///
    /// If the task changed locally while the push was in flight, only the
    /// server id is kept and the entry stays queued for the newer version.
    fn apply_accepted(
        &self,
        conn: &Connection,
        pushed: &Task,
        server_id: String,
        now: i64,
    ) -> crate::Result<()> {
        let store = SqliteTaskStore::new(conn);
        let queue = SyncQueue::new(conn);
        let Some(mut current) = store.get(&pushed.id)? else {
            return Ok(());
        };

        match &current.server_id {
            None => current.server_id = Some(server_id),
            Some(existing) if *existing != server_id => {
                tracing::warn!(
                    "Remote acknowledged task {} as {server_id}, keeping {existing}",
                    current.id
                );
            }
            Some(_) => {}
        }

        if current.updated_at == pushed.updated_at {
            current.sync_status = SyncStatus::Synced;
            current.last_synced_at = Some(now);
            store.put(&current)?;
            queue.remove(&current.id)?;
            tracing::debug!("Task {} synced", current.id);
        } else {
            store.put(&current)?;
            queue.reset(&current.id, now)?;
            tracing::debug!("Task {} changed during push; re-queued", current.id);
        }
        Ok(())
    }

    fn apply_failed(
        &self,
        conn: &Connection,
        task_id: &TaskId,
        error: &SyncError,
        now: i64,
    ) -> crate::Result<SyncStatus> {
        let store = SqliteTaskStore::new(conn);
        let queue = SyncQueue::new(conn);

        let status = self.retry.record_failure(&queue, task_id, error, now)?;
        if let Some(mut task) = store.get(task_id)? {
            if task.sync_status != status {
                task.sync_status = status;
                store.put(&task)?;
            }
        }
        Ok(status)
    }

    /// Apply a pulled batch and advance the watermark in one transaction
    async fn absorb_batch(
        &self,
        batch: &PullBatch,
        previous: Option<&Watermark>,
        now: i64,
        report: &mut CycleReport,
    ) -> Result<(), SyncError> {
        report.pulled = batch.records.len();
        if batch.records.is_empty() && previous == Some(&batch.new_watermark) {
            return Ok(());
        }

        let mut db = self.db.lock().await;
        db.transaction(|tx| {
            let mut counts = CycleReport::default();
            for record in &batch.records {
                self.absorb_record(tx, record, now, &mut counts)?;
            }

            let repo = SqliteSyncStateRepository::new(tx);
            let mut state = repo.load()?;
            state.watermark = Some(batch.new_watermark.clone());
            repo.save(&state)?;

            report.created += counts.created;
            report.updated += counts.updated;
            report.conflicts += counts.conflicts;
            report.failed += counts.failed;
            Ok(())
        })?;
        Ok(())
    }

    fn absorb_record(
        &self,
        conn: &Connection,
        record: &RemoteTask,
        now: i64,
        counts: &mut CycleReport,
    ) -> crate::Result<()> {
        let store = SqliteTaskStore::new(conn);
        let queue = SyncQueue::new(conn);

        let Some(local) = Self::find_local(&store, record)? else {
            if record.is_deleted {
                tracing::debug!("Skipping deletion of unknown record {}", record.server_id);
                return Ok(());
            }
            let Some(updated_at) = record.updated_at.filter(|at| *at > 0) else {
                tracing::warn!(
                    "Skipping remote record {} without a valid updated_at",
                    record.server_id
                );
                return Ok(());
            };
            store.put(&materialize(record, updated_at, now))?;
            counts.created += 1;
            return Ok(());
        };

        let resolution = match resolve(Version::Local(&local), Version::Remote(record), now) {
            Ok(resolution) => resolution,
            Err(error) => {
                tracing::warn!("Cannot resolve task {}: {error}", local.id);
                queue.enqueue(&local.id, now)?;
                queue.park(&local.id, &error.to_string())?;
                if local.sync_status != SyncStatus::Error {
                    store.put(&Task {
                        sync_status: SyncStatus::Error,
                        ..local
                    })?;
                }
                counts.failed += 1;
                return Ok(());
            }
        };

        if resolution.conflicted {
            ConflictLog::new(conn).record(
                &local.id,
                local.updated_at,
                record.updated_at.unwrap_or_default(),
                resolution.winner,
                now,
            )?;
            counts.conflicts += 1;
        }
        if resolution.task == local {
            return Ok(());
        }

        store.put(&resolution.task)?;
        if resolution.task.sync_status == SyncStatus::Synced {
            queue.remove(&local.id)?;
        } else {
            queue.enqueue(&local.id, now)?;
        }
        counts.updated += 1;
        Ok(())
    }

    fn find_local(store: &SqliteTaskStore<'_>, record: &RemoteTask) -> crate::Result<Option<Task>> {
        if let Some(task) = store
            .query(&TaskQuery::by_server_id(record.server_id.clone()))?
            .into_iter()
            .next()
        {
            return Ok(Some(task));
        }
        // A push whose acknowledgement was lost comes back unlinked.
        match record.client_id {
            Some(client_id) => Ok(store
                .get(&client_id)?
                .filter(|task| task.server_id.is_none())),
            None => Ok(None),
        }
    }

    /// Clear a parked entry so the task is pushed on the next cycle
    ///
    /// Returns `false` when the task has no queue entry.
    pub async fn reset(&self, task_id: &TaskId) -> Result<bool, SyncError> {
        let now = unix_millis_now();
        let mut db = self.db.lock().await;
        let reset = db.transaction(|tx| {
            let queue = SyncQueue::new(tx);
            if !queue.reset(task_id, now)? {
                return Ok(false);
            }
            let store = SqliteTaskStore::new(tx);
            if let Some(mut task) = store.get(task_id)? {
                task.sync_status = SyncStatus::Pending;
                store.put(&task)?;
            }
            Ok(true)
        })?;
        Ok(reset)
    }

    /// Every queue entry, parked ones included
    pub async fn queue_entries(&self) -> Result<Vec<SyncQueueEntry>, SyncError> {
        let db = self.db.lock().await;
        Ok(SyncQueue::new(db.connection()).list()?)
    }

    /// Queue summary
    pub async fn queue_stats(&self) -> Result<QueueStats, SyncError> {
        let db = self.db.lock().await;
        Ok(SyncQueue::new(db.connection()).stats()?)
    }

    /// Most recent recorded conflicts
    pub async fn recent_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>, SyncError> {
        let db = self.db.lock().await;
        Ok(ConflictLog::new(db.connection()).recent(limit)?)
    }

    /// Persisted watermark
    pub async fn watermark(&self) -> Result<Option<Watermark>, SyncError> {
        let db = self.db.lock().await;
        Ok(SqliteSyncStateRepository::new(db.connection())
            .load()?
            .watermark)
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        tokio::time::timeout(self.config.request_timeout(), request)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    fn set_state(&self, state: EngineState) {
        self.state.send_replace(state);
    }
}

/// New local task for a remote record with no local counterpart
fn materialize(record: &RemoteTask, updated_at: i64, now: i64) -> Task {
    Task {
        id: record.client_id.unwrap_or_default(),
        server_id: Some(record.server_id.clone()),
        title: record.title.clone(),
        description: record.description.clone(),
        completed: record.completed,
        created_at: record.created_at,
        updated_at,
        is_deleted: false,
        sync_status: SyncStatus::Synced,
        last_synced_at: Some(now),
    }
}
