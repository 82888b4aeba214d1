use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tasksync_core::models::{QueueStats, SyncQueueEntry, Watermark};
use tasksync_core::state::WorkerStatus;
use tasksync_core::sync::{worker, CycleReport, SyncEngine};
use tasksync_core::{CycleOutcome, SyncConfig};

use crate::commands::common::{
    format_sync_conflict_lines, format_sync_timestamp, normalize_task_identifier, open_engine,
    resolve_task, short_id, sync_conflict_to_item, Paths, SyncConflictItem,
};
use crate::error::CliError;
use crate::file_remote::FileRemote;

pub async fn run_sync(paths: &Paths, config: SyncConfig) -> Result<CycleReport, CliError> {
    let (_service, engine) = open_engine(paths, config)?;
    match engine.sync_now().await? {
        CycleOutcome::Completed(report) => {
            println!(
                "Sync completed: {} pushed, {} pulled, {} conflict(s)",
                report.pushed, report.pulled, report.conflicts
            );
            if report.retrying > 0 || report.failed > 0 {
                println!(
                    "{} task(s) will be retried, {} flagged as error",
                    report.retrying, report.failed
                );
            }
            Ok(report)
        }
        CycleOutcome::Aborted { reason, .. } => Err(CliError::SyncAborted(reason)),
        CycleOutcome::Coalesced => Ok(CycleReport::default()),
    }
}

#[derive(Debug, Serialize)]
struct SyncStatusReport {
    remote: String,
    watermark: Option<Watermark>,
    queue: QueueStats,
    entries: Vec<SyncQueueEntry>,
}

pub async fn run_sync_status(
    paths: &Paths,
    config: SyncConfig,
    as_json: bool,
) -> Result<(), CliError> {
    let (_service, engine) = open_engine(paths, config)?;
    let status = SyncStatusReport {
        remote: engine.remote().path().display().to_string(),
        watermark: engine.watermark().await?,
        queue: engine.queue_stats().await?,
        entries: engine.queue_entries().await?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("remote:    {}", status.remote);
    println!(
        "watermark: {}",
        status
            .watermark
            .as_ref()
            .map_or("(never pulled)", Watermark::as_str)
    );
    println!(
        "queue:     {} pending, {} parked",
        status.queue.pending, status.queue.parked
    );
    if let Some(oldest) = status.queue.oldest_enqueued_at {
        println!("oldest:    {}", format_sync_timestamp(oldest));
    }
    for entry in &status.entries {
        let state = if entry.parked { "parked" } else { "queued" };
        let error = entry.last_error.as_deref().unwrap_or("-");
        println!(
            "  {:<13}  {state:<6}  attempts={}  next={}  {error}",
            short_id(&entry.task_id),
            entry.attempt_count,
            format_sync_timestamp(entry.next_retry_at)
        );
    }
    Ok(())
}

pub async fn run_sync_conflicts(
    paths: &Paths,
    config: SyncConfig,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let (_service, engine) = open_engine(paths, config)?;
    let conflicts = engine.recent_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_reset(paths: &Paths, config: SyncConfig, id: &str) -> Result<(), CliError> {
    let normalized_id = normalize_task_identifier(id)?;
    let (service, engine) = open_engine(paths, config)?;
    let task = resolve_task(&normalized_id, &service).await?;

    if !engine.reset(&task.id).await? {
        return Err(CliError::NotQueued(task.id.to_string()));
    }
    println!("{}", task.id);
    Ok(())
}

pub async fn run_sync_watch(
    paths: &Paths,
    config: SyncConfig,
    interval_secs: Option<u64>,
) -> Result<(), CliError> {
    let interval = interval_secs.map_or_else(|| config.sync_interval(), Duration::from_secs);
    let (_service, engine) = open_engine(paths, config)?;
    watch_until_interrupted(engine, interval).await
}

async fn watch_until_interrupted(
    engine: Arc<SyncEngine<FileRemote>>,
    interval: Duration,
) -> Result<(), CliError> {
    let handle = worker::spawn(engine, interval);
    let mut status = handle.subscribe();
    println!("Watching for changes every {}s (Ctrl-C to stop)", interval.as_secs());

    let result = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                break signal.map_err(CliError::from);
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break Err(CliError::WorkerStopped);
                }
                let current = *status.borrow_and_update();
                match current {
                    WorkerStatus::Synced => println!("synced"),
                    WorkerStatus::Offline => println!("offline, will retry"),
                    WorkerStatus::Error => println!("local storage error, see logs"),
                    WorkerStatus::Idle | WorkerStatus::Syncing => {}
                }
            }
        }
    };

    handle.shutdown().await;
    result
}
