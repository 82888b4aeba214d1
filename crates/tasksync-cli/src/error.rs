use std::io;

use tasksync_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tasksync_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Task ID cannot be empty")]
    EmptyTaskId,
    #[error("Edited task title cannot be empty")]
    EmptyEditedTitle,
    #[error("Task not found for id/prefix: {0}")]
    TaskNotFound(String),
    #[error("{0}")]
    AmbiguousTaskId(String),
    #[error("Task {0} has no sync queue entry")]
    NotQueued(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Remote store error: {0}")]
    RemoteStore(String),
    #[error("Sync aborted: {0}")]
    SyncAborted(String),
    #[error("Sync worker stopped unexpectedly")]
    WorkerStopped,
}
