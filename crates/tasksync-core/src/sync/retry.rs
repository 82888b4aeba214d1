//! Failure classification and retry scheduling.

use std::time::Duration;

use super::SyncError;
use crate::db::SyncQueue;
use crate::error::Result;
use crate::models::{SyncStatus, TaskId};

/// How a push failure is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retry later with backoff
    Retryable,
    /// Stop retrying until an operator resets the entry
    Permanent,
}

impl FailureClass {
    /// Classify a sync failure
    #[must_use]
    pub const fn of(error: &SyncError) -> Self {
        match error {
            SyncError::TransientNetwork(_) | SyncError::Storage(_) => Self::Retryable,
            SyncError::RemoteRejection(_) | SyncError::ConflictUnresolvable(_) => Self::Permanent,
        }
    }
}

/// Exponential backoff schedule and attempt limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Failed attempts after which the task is flagged `error`
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5 * 60),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt once `attempt_count` attempts have failed
    ///
    /// `base_delay * 2^(attempt_count - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1_u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Absolute retry time (Unix ms) for a failure recorded at `now`
    #[must_use]
    pub fn next_retry_at(&self, attempt_count: u32, now: i64) -> i64 {
        let delay = i64::try_from(self.backoff(attempt_count).as_millis()).unwrap_or(i64::MAX);
        now.saturating_add(delay)
    }

    /// Whether `attempt_count` failures exhaust the automatic retries
    #[must_use]
    pub const fn is_exhausted(&self, attempt_count: u32) -> bool {
        attempt_count >= self.max_attempts
    }

    /// Record a failed push of `task_id` in the queue
    ///
    /// Returns the sync status the task must take: `pending` while retries
    /// remain, `error` once the failure is permanent or retries ran out (the
    /// entry is then parked).
    pub fn record_failure(
        &self,
        queue: &SyncQueue<'_>,
        task_id: &TaskId,
        error: &SyncError,
        now: i64,
    ) -> Result<SyncStatus> {
        let reason = error.to_string();
        match FailureClass::of(error) {
            FailureClass::Permanent => {
                queue.park(task_id, &reason)?;
                tracing::warn!("Push of task {task_id} failed permanently: {reason}");
                Ok(SyncStatus::Error)
            }
            FailureClass::Retryable => {
                let Some(entry) = queue.mark_failed(task_id, &reason, self, now)? else {
                    return Ok(SyncStatus::Pending);
                };
                if self.is_exhausted(entry.attempt_count) {
                    queue.park(task_id, &reason)?;
                    tracing::warn!(
                        "Push of task {task_id} gave up after {} attempts: {reason}",
                        entry.attempt_count
                    );
                    Ok(SyncStatus::Error)
                } else {
                    tracing::debug!(
                        "Push of task {task_id} failed (attempt {}), retrying at {}: {reason}",
                        entry.attempt_count,
                        entry.next_retry_at
                    );
                    Ok(SyncStatus::Pending)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteTaskStore, TaskStore};
    use crate::models::{NewTask, Task};
    use crate::sync::RemoteError;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(6), Duration::from_secs(10));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn classification_follows_error_kind() {
        assert_eq!(
            FailureClass::of(&RemoteError::RateLimited.into()),
            FailureClass::Retryable
        );
        assert_eq!(
            FailureClass::of(&RemoteError::Unauthorized("nope".into()).into()),
            FailureClass::Permanent
        );
        assert_eq!(
            FailureClass::of(&SyncError::ConflictUnresolvable("no clock".into())),
            FailureClass::Permanent
        );
    }

    #[test]
    fn record_failure_exhausts_after_max_attempts() {
        let db = Database::open_in_memory().unwrap();
        let task = Task::new(NewTask::default());
        SqliteTaskStore::new(db.connection()).put(&task).unwrap();
        let policy = policy();
        let queue = SyncQueue::new(db.connection());
        queue.enqueue(&task.id, 0).unwrap();

        let error = SyncError::from(RemoteError::Timeout);
        assert_eq!(
            policy.record_failure(&queue, &task.id, &error, 0).unwrap(),
            SyncStatus::Pending
        );
        assert_eq!(
            policy.record_failure(&queue, &task.id, &error, 0).unwrap(),
            SyncStatus::Pending
        );
        assert_eq!(
            policy.record_failure(&queue, &task.id, &error, 0).unwrap(),
            SyncStatus::Error
        );

        let entry = queue.get(&task.id).unwrap().unwrap();
        assert_eq!(entry.attempt_count, 3);
        assert!(entry.parked);
    }

    #[test]
    fn record_failure_parks_permanent_failures_without_counting() {
        let db = Database::open_in_memory().unwrap();
        let task = Task::new(NewTask::default());
        SqliteTaskStore::new(db.connection()).put(&task).unwrap();
        let policy = policy();
        let queue = SyncQueue::new(db.connection());
        queue.enqueue(&task.id, 0).unwrap();

        let error = SyncError::from(RemoteError::InvalidPayload("empty title".into()));
        assert_eq!(
            policy.record_failure(&queue, &task.id, &error, 0).unwrap(),
            SyncStatus::Error
        );

        let entry = queue.get(&task.id).unwrap().unwrap();
        assert_eq!(entry.attempt_count, 0);
        assert!(entry.parked);
        assert!(entry.last_error.unwrap().contains("empty title"));
    }
}
