//! Sync queue entry model

use serde::{Deserialize, Serialize};

use super::TaskId;

/// Outstanding local mutation of one task awaiting remote acceptance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub task_id: TaskId,
    /// Consecutive failed push attempts
    pub attempt_count: u32,
    /// Earliest retry time (Unix ms)
    pub next_retry_at: i64,
    /// Last failure reason, kept for diagnostics
    pub last_error: Option<String>,
    /// Excluded from automatic dequeue until explicitly reset
    pub parked: bool,
    /// When the entry was first created (Unix ms)
    pub enqueued_at: i64,
}

/// Queue summary for status displays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Entries still retried automatically
    pub pending: usize,
    /// Entries waiting for an operator reset
    pub parked: usize,
    /// Oldest entry creation time (Unix ms)
    pub oldest_enqueued_at: Option<i64>,
}
