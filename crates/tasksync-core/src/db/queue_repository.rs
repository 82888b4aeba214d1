//! Sync queue storage and management.
//!
//! One row per task with an un-propagated local mutation. Writes run inside
//! the caller's transaction so queue membership changes together with the
//! task's `sync_status`.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{QueueStats, SyncQueueEntry, TaskId};
use crate::sync::RetryPolicy;
use crate::util::compact_text;

const ENTRY_COLUMNS: &str =
    "task_id, attempt_count, next_retry_at, last_error, parked, enqueued_at";

/// Sync queue over a connection or open transaction
pub struct SyncQueue<'a> {
    conn: &'a Connection,
}

impl<'a> SyncQueue<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Add an entry for `task_id` unless one already exists
    ///
    /// Redundant enqueues leave attempt count and backoff untouched.
    /// Returns `true` when a new entry was inserted.
    pub fn enqueue(&self, task_id: &TaskId, now: i64) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO sync_queue (task_id, attempt_count, next_retry_at, parked, enqueued_at)
             VALUES (?1, 0, ?2, 0, ?2)
             ON CONFLICT(task_id) DO NOTHING",
            params![task_id.as_str(), now],
        )?;
        Ok(inserted > 0)
    }

    /// Entries due at `now`, excluding parked ones
    ///
    /// Ordered by `next_retry_at`, then `task_id`, so replays are deterministic.
    pub fn dequeue_eligible(&self, now: i64) -> Result<Vec<SyncQueueEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM sync_queue
             WHERE parked = 0 AND next_retry_at <= ?
             ORDER BY next_retry_at ASC, task_id ASC"
        ))?;
        let entries = stmt
            .query_map(params![now], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Delete the entry; no-op if absent
    pub fn remove(&self, task_id: &TaskId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM sync_queue WHERE task_id = ?",
            params![task_id.as_str()],
        )?;
        Ok(())
    }

    /// Record a retryable failure and schedule the next attempt per `policy`
    ///
    /// Returns the updated entry, or `None` when the task has no entry.
    pub fn mark_failed(
        &self,
        task_id: &TaskId,
        reason: &str,
        policy: &RetryPolicy,
        now: i64,
    ) -> Result<Option<SyncQueueEntry>> {
        let Some(entry) = self.get(task_id)? else {
            return Ok(None);
        };

        let attempt_count = entry.attempt_count.saturating_add(1);
        let next_retry_at = policy.next_retry_at(attempt_count, now);
        self.conn.execute(
            "UPDATE sync_queue SET attempt_count = ?, next_retry_at = ?, last_error = ?
             WHERE task_id = ?",
            params![
                attempt_count,
                next_retry_at,
                compact_text(reason),
                task_id.as_str()
            ],
        )?;

        Ok(Some(SyncQueueEntry {
            attempt_count,
            next_retry_at,
            last_error: Some(compact_text(reason)),
            ..entry
        }))
    }

    /// Exclude the entry from automatic dequeue until [`Self::reset`]
    ///
    /// The attempt count is left as is.
    pub fn park(&self, task_id: &TaskId, reason: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_queue SET parked = 1, last_error = ? WHERE task_id = ?",
            params![compact_text(reason), task_id.as_str()],
        )?;
        Ok(())
    }

    /// Clear parking, attempts and error so the entry is due at `now`
    ///
    /// Returns `false` when the task has no entry.
    pub fn reset(&self, task_id: &TaskId, now: i64) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE sync_queue
             SET parked = 0, attempt_count = 0, next_retry_at = ?, last_error = NULL
             WHERE task_id = ?",
            params![now, task_id.as_str()],
        )?;
        Ok(updated > 0)
    }

    /// Get the entry for a task
    pub fn get(&self, task_id: &TaskId) -> Result<Option<SyncQueueEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM sync_queue WHERE task_id = ?"),
                params![task_id.as_str()],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// All entries, parked ones included
    pub fn list(&self) -> Result<Vec<SyncQueueEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM sync_queue ORDER BY enqueued_at ASC, task_id ASC"
        ))?;
        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Get queue statistics
    pub fn stats(&self) -> Result<QueueStats> {
        let (pending, parked, oldest): (usize, usize, Option<i64>) = self.conn.query_row(
            "SELECT COALESCE(SUM(parked = 0), 0), COALESCE(SUM(parked = 1), 0), MIN(enqueued_at)
             FROM sync_queue",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(QueueStats {
            pending,
            parked,
            oldest_enqueued_at: oldest,
        })
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<SyncQueueEntry> {
    let task_id: String = row.get(0)?;
    Ok(SyncQueueEntry {
        task_id: task_id.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        attempt_count: row.get(1)?,
        next_retry_at: row.get(2)?,
        last_error: row.get(3)?,
        parked: row.get::<_, i32>(4)? != 0,
        enqueued_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteTaskStore, TaskStore};
    use crate::models::{NewTask, Task};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }

    fn insert_task(db: &Database) -> TaskId {
        let task = Task::new(NewTask::default());
        SqliteTaskStore::new(db.connection()).put(&task).unwrap();
        task.id
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::new(db.connection());
        let id = insert_task(&db);

        assert!(queue.enqueue(&id, 1_000).unwrap());
        queue.mark_failed(&id, "timeout", &policy(), 1_000).unwrap();
        let before = queue.get(&id).unwrap().unwrap();

        assert!(!queue.enqueue(&id, 5_000).unwrap());
        assert_eq!(queue.get(&id).unwrap().unwrap(), before);
        assert_eq!(before.attempt_count, 1);
    }

    #[test]
    fn test_dequeue_eligible_orders_by_due_time_then_id() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::new(db.connection());

        let mut ids = vec![insert_task(&db), insert_task(&db), insert_task(&db)];
        for id in &ids {
            queue.enqueue(id, 100).unwrap();
        }
        // Push the first one into the future
        queue.mark_failed(&ids[0], "boom", &policy(), 100).unwrap();

        let due_now = queue.dequeue_eligible(100).unwrap();
        let mut expected = ids[1..].to_vec();
        expected.sort();
        assert_eq!(
            due_now.iter().map(|e| e.task_id).collect::<Vec<_>>(),
            expected
        );

        let later = queue.dequeue_eligible(100 + 2_000).unwrap();
        assert_eq!(later.len(), 3);
        assert_eq!(later.last().unwrap().task_id, ids.remove(0));
    }

    #[test]
    fn test_mark_failed_applies_backoff() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::new(db.connection());
        let id = insert_task(&db);
        queue.enqueue(&id, 0).unwrap();

        let first = queue.mark_failed(&id, "timeout", &policy(), 10_000).unwrap().unwrap();
        assert_eq!(first.attempt_count, 1);
        assert_eq!(first.next_retry_at, 12_000);
        assert_eq!(first.last_error.as_deref(), Some("timeout"));

        let second = queue.mark_failed(&id, "503", &policy(), 12_000).unwrap().unwrap();
        assert_eq!(second.attempt_count, 2);
        assert_eq!(second.next_retry_at, 16_000);
        assert_eq!(queue.get(&id).unwrap().unwrap(), second);
    }

    #[test]
    fn test_mark_failed_follows_given_policy() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::new(db.connection());
        let id = insert_task(&db);
        queue.enqueue(&id, 0).unwrap();

        let slow = RetryPolicy {
            base_delay: Duration::from_secs(30),
            ..policy()
        };
        let entry = queue.mark_failed(&id, "timeout", &slow, 1_000).unwrap().unwrap();
        assert_eq!(entry.next_retry_at, 31_000);
    }

    #[test]
    fn test_mark_failed_without_entry_is_none() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::new(db.connection());
        assert_eq!(queue.mark_failed(&TaskId::new(), "x", &policy(), 0).unwrap(), None);
    }

    #[test]
    fn test_parked_entries_are_not_dequeued_until_reset() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::new(db.connection());
        let id = insert_task(&db);
        queue.enqueue(&id, 0).unwrap();

        queue.park(&id, "invalid payload").unwrap();
        assert!(queue.dequeue_eligible(i64::MAX).unwrap().is_empty());
        let parked = queue.get(&id).unwrap().unwrap();
        assert!(parked.parked);
        assert_eq!(parked.attempt_count, 0);

        assert!(queue.reset(&id, 50).unwrap());
        let due = queue.dequeue_eligible(50).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].last_error, None);
    }

    #[test]
    fn test_remove_and_stats() {
        let db = Database::open_in_memory().unwrap();
        let queue = SyncQueue::new(db.connection());
        let a = insert_task(&db);
        let b = insert_task(&db);
        queue.enqueue(&a, 10).unwrap();
        queue.enqueue(&b, 20).unwrap();
        queue.park(&b, "unauthorized").unwrap();

        assert_eq!(
            queue.stats().unwrap(),
            QueueStats {
                pending: 1,
                parked: 1,
                oldest_enqueued_at: Some(10),
            }
        );

        queue.remove(&a).unwrap();
        queue.remove(&a).unwrap();
        assert_eq!(queue.list().unwrap().len(), 1);
        assert_eq!(queue.stats().unwrap().pending, 0);
    }
}
