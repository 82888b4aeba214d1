//! Shared task service used by clients.
//!
//! Every mutation writes the task and its sync queue entry in the same
//! transaction, so a task is never `pending` without an entry.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::db::{Database, SqliteTaskStore, SyncQueue, TaskQuery, TaskStore};
use crate::error::{Error, Result};
use crate::models::{NewTask, Task, TaskId, TaskUpdate};
use crate::util::unix_millis_now;

/// Thread-safe service for local task operations.
#[derive(Clone)]
pub struct TaskService {
    db: Arc<Mutex<Database>>,
}

impl TaskService {
    pub const fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Open a service over the database at `db_path`.
    pub fn open_path(db_path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self::new(Arc::new(Mutex::new(db))))
    }

    /// Open an in-memory service (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::new(Arc::new(Mutex::new(db))))
    }

    /// Shared database handle, for wiring a sync engine to the same store.
    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    /// Create a task and queue it for sync.
    pub async fn create_task(&self, input: NewTask) -> Result<Task> {
        let task = Task::new(input);
        let mut db = self.db.lock().await;
        db.transaction(|tx| {
            SqliteTaskStore::new(tx).put(&task)?;
            queue_mutation(tx, &task.id, task.updated_at)
        })?;
        tracing::debug!("Created task {}", task.id);
        Ok(task)
    }

    /// Apply a partial update; `None` when the task does not exist.
    pub async fn update_task(&self, id: &TaskId, update: TaskUpdate) -> Result<Option<Task>> {
        if update
            .title
            .as_deref()
            .is_some_and(|title| title.trim().is_empty())
        {
            return Err(Error::InvalidInput("task title cannot be empty".to_string()));
        }

        let now = unix_millis_now();
        let mut db = self.db.lock().await;
        db.transaction(|tx| {
            let store = SqliteTaskStore::new(tx);
            let Some(mut task) = store.get(id)?.filter(|task| !task.is_deleted) else {
                return Ok(None);
            };
            if update.is_empty() {
                return Ok(Some(task));
            }
            task.apply(update, now);
            store.put(&task)?;
            queue_mutation(tx, &task.id, now)?;
            Ok(Some(task))
        })
    }

    /// Soft-delete a task; `false` when it does not exist.
    pub async fn delete_task(&self, id: &TaskId) -> Result<bool> {
        let now = unix_millis_now();
        let mut db = self.db.lock().await;
        db.transaction(|tx| {
            let store = SqliteTaskStore::new(tx);
            let Some(mut task) = store.get(id)?.filter(|task| !task.is_deleted) else {
                return Ok(false);
            };
            task.soft_delete(now);
            store.put(&task)?;
            queue_mutation(tx, &task.id, now)?;
            Ok(true)
        })
    }

    /// Fetch a live task by id.
    pub async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        let db = self.db.lock().await;
        let task = SqliteTaskStore::new(db.connection()).get(id)?;
        Ok(task.filter(|task| !task.is_deleted))
    }

    /// All live tasks, most recently updated first.
    pub async fn get_all_tasks(&self) -> Result<Vec<Task>> {
        let db = self.db.lock().await;
        SqliteTaskStore::new(db.connection()).query(&TaskQuery::live())
    }

    /// Tasks that are `pending` or `error`, deleted ones included.
    pub async fn tasks_needing_sync(&self) -> Result<Vec<Task>> {
        let db = self.db.lock().await;
        SqliteTaskStore::new(db.connection()).query(&TaskQuery::needing_sync())
    }
}

/// Make sure `task_id` has a due queue entry after a local mutation
fn queue_mutation(conn: &Connection, task_id: &TaskId, now: i64) -> Result<()> {
    let queue = SyncQueue::new(conn);
    if !queue.enqueue(task_id, now)? {
        if let Some(entry) = queue.get(task_id)? {
            if entry.parked {
                queue.reset(task_id, now)?;
                tracing::info!("Reset parked sync entry for edited task {task_id}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;
    use pretty_assertions::assert_eq;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: Some(title.to_string()),
            description: None,
        }
    }

    async fn entry_count(service: &TaskService) -> usize {
        let db = service.db.lock().await;
        SyncQueue::new(db.connection()).list().unwrap().len()
    }

    #[tokio::test]
    async fn create_applies_defaults_and_queues() {
        let service = TaskService::open_in_memory().unwrap();

        let task = service.create_task(NewTask::default()).await.unwrap();
        assert_eq!(task.title, "Untitled");
        assert_eq!(task.description, "Not Mentioned");
        assert!(!task.completed);
        assert_eq!(task.sync_status, SyncStatus::Pending);
        assert_eq!(entry_count(&service).await, 1);

        let stored = service.get_task(&task.id).await.unwrap();
        assert_eq!(stored, Some(task));
    }

    #[tokio::test]
    async fn update_merges_fields_and_keeps_single_entry() {
        let service = TaskService::open_in_memory().unwrap();
        let task = service.create_task(new_task("Buy milk")).await.unwrap();

        let updated = service
            .update_task(
                &task.id,
                TaskUpdate {
                    completed: Some(true),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "Buy milk");
        assert!(updated.completed);
        assert!(updated.updated_at > task.updated_at);
        assert_eq!(entry_count(&service).await, 1);
    }

    #[tokio::test]
    async fn update_of_missing_task_returns_none() {
        let service = TaskService::open_in_memory().unwrap();
        let result = service
            .update_task(&TaskId::new(), TaskUpdate::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let service = TaskService::open_in_memory().unwrap();
        let task = service.create_task(new_task("Buy milk")).await.unwrap();
        let result = service
            .update_task(
                &task.id,
                TaskUpdate {
                    title: Some("  ".to_string()),
                    ..TaskUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn delete_hides_task_but_keeps_it_queued() {
        let service = TaskService::open_in_memory().unwrap();
        let task = service.create_task(new_task("Buy milk")).await.unwrap();

        assert!(service.delete_task(&task.id).await.unwrap());
        assert!(!service.delete_task(&task.id).await.unwrap());
        assert!(service.get_task(&task.id).await.unwrap().is_none());
        assert!(service.get_all_tasks().await.unwrap().is_empty());

        let needing_sync = service.tasks_needing_sync().await.unwrap();
        assert_eq!(needing_sync.len(), 1);
        assert!(needing_sync[0].is_deleted);
    }

    #[tokio::test]
    async fn edit_resets_parked_entry() {
        let service = TaskService::open_in_memory().unwrap();
        let task = service.create_task(new_task("Buy milk")).await.unwrap();
        {
            let db = service.db.lock().await;
            SyncQueue::new(db.connection())
                .park(&task.id, "rejected")
                .unwrap();
        }

        service
            .update_task(
                &task.id,
                TaskUpdate {
                    title: Some("Buy oat milk".to_string()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();

        let db = service.db.lock().await;
        let entry = SyncQueue::new(db.connection())
            .get(&task.id)
            .unwrap()
            .unwrap();
        assert!(!entry.parked);
        assert_eq!(entry.last_error, None);
    }
}
