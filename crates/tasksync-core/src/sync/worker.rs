//! Background sync worker.
//!
//! Runs a cycle on a fixed interval and whenever [`SyncWorkerHandle::trigger`]
//! is called (for example after a local edit or when connectivity returns).
//! Triggers that arrive while a cycle is running collapse into one follow-up
//! cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{CycleOutcome, Remote, SyncEngine};
use crate::state::WorkerStatus;

/// Shortest interval between scheduled cycles
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running worker
pub struct SyncWorkerHandle {
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    status: watch::Receiver<WorkerStatus>,
    join: JoinHandle<()>,
}

impl SyncWorkerHandle {
    /// Request a cycle as soon as possible
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    /// Outcome of the most recent cycle
    pub fn status(&self) -> WorkerStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerStatus> {
        self.status.clone()
    }

    /// Stop the worker after the current cycle and wait for it to exit
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(error) = self.join.await {
            tracing::error!("Sync worker exited abnormally: {error}");
        }
    }
}

/// Spawn a worker driving `engine` every `interval`
///
/// Must be called from within a Tokio runtime. The first cycle runs
/// immediately. Intervals below [`MIN_INTERVAL`] are raised to it.
pub fn spawn<R>(engine: Arc<SyncEngine<R>>, interval: Duration) -> SyncWorkerHandle
where
    R: Remote + 'static,
{
    if interval < MIN_INTERVAL {
        tracing::warn!("Sync interval {interval:?} is too short, using {MIN_INTERVAL:?}");
    }
    let interval = interval.max(MIN_INTERVAL);
    let wake = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (status_tx, status_rx) = watch::channel(WorkerStatus::Idle);

    let join = tokio::spawn(run(
        engine,
        interval,
        Arc::clone(&wake),
        shutdown_rx,
        status_tx,
    ));

    SyncWorkerHandle {
        wake,
        shutdown: shutdown_tx,
        status: status_rx,
        join,
    }
}

async fn run<R: Remote>(
    engine: Arc<SyncEngine<R>>,
    interval: Duration,
    wake: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
    status: watch::Sender<WorkerStatus>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!("Sync worker started (interval {interval:?})");

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
            () = wake.notified() => {}
        }

        let previous = *status.borrow();
        status.send_replace(WorkerStatus::Syncing);
        let next = match engine.sync_now().await {
            Ok(CycleOutcome::Completed(_)) => WorkerStatus::Synced,
            Ok(CycleOutcome::Aborted { .. }) => WorkerStatus::Offline,
            Ok(CycleOutcome::Coalesced) => previous,
            Err(_) => WorkerStatus::Error,
        };
        status.send_replace(next);
    }

    tracing::info!("Sync worker stopped");
}
