//! Contract between the sync engine and the remote authoritative store.
//!
//! Transport is deliberately absent: anything that can push a batch of task
//! payloads and return changes since a watermark can back the engine.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::RemoteError;
use crate::models::{Task, TaskId, Watermark};

/// Payload of one locally mutated task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushItem {
    /// Local identifier, echoed back by the remote as `client_id`
    pub task_id: TaskId,
    pub server_id: Option<String>,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
}

impl From<&Task> for PushItem {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            server_id: task.server_id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            completed: task.completed,
            created_at: task.created_at,
            updated_at: task.updated_at,
            is_deleted: task.is_deleted,
        }
    }
}

/// Per-item push outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    /// Durably accepted; `server_id` identifies the record remotely
    Accepted { server_id: String },
    Failed(RemoteError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub task_id: TaskId,
    pub outcome: PushOutcome,
}

/// A task as the remote currently stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub server_id: String,
    /// Local identifier of the device that created the record, if known
    pub client_id: Option<TaskId>,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub created_at: i64,
    /// `None` when the remote did not report a usable clock
    pub updated_at: Option<i64>,
    pub is_deleted: bool,
}

/// Remote changes after a watermark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullBatch {
    pub records: Vec<RemoteTask>,
    /// Position to resume from once every record is absorbed
    pub new_watermark: Watermark,
}

/// Remote endpoint consumed by the sync engine
pub trait Remote: Send + Sync {
    /// Propagate a batch of local mutations
    ///
    /// A whole-batch `Err` means no item is known to have been applied.
    fn push(
        &self,
        batch: &[PushItem],
    ) -> impl Future<Output = Result<Vec<PushResult>, RemoteError>> + Send;

    /// Changes since `since` (everything when `None`)
    fn pull(
        &self,
        since: Option<&Watermark>,
    ) -> impl Future<Output = Result<PullBatch, RemoteError>> + Send;
}

impl<R: Remote> Remote for Arc<R> {
    fn push(
        &self,
        batch: &[PushItem],
    ) -> impl Future<Output = Result<Vec<PushResult>, RemoteError>> + Send {
        (**self).push(batch)
    }

    fn pull(
        &self,
        since: Option<&Watermark>,
    ) -> impl Future<Output = Result<PullBatch, RemoteError>> + Send {
        (**self).pull(since)
    }
}
