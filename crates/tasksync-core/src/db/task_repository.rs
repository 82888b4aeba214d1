//! Task record store implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{SyncStatus, Task, TaskId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

const TASK_COLUMNS: &str = "id, server_id, title, description, completed, created_at, updated_at, \
                            is_deleted, sync_status, last_synced_at";

/// Predicate for [`TaskStore::query`]
///
/// Every field narrows the result; the default matches all live tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    /// Only tasks in one of these statuses (empty = any)
    pub statuses: Vec<SyncStatus>,
    /// Only the task linked to this remote identifier
    pub server_id: Option<String>,
    /// Include soft-deleted tasks
    pub include_deleted: bool,
    pub limit: Option<usize>,
}

impl TaskQuery {
    /// Live tasks, newest first
    #[must_use]
    pub fn live() -> Self {
        Self::default()
    }

    /// Tasks with an outstanding local mutation, deleted ones included
    #[must_use]
    pub fn needing_sync() -> Self {
        Self {
            statuses: vec![SyncStatus::Pending, SyncStatus::Error],
            include_deleted: true,
            ..Self::default()
        }
    }

    /// The task linked to `server_id`, deleted or not
    #[must_use]
    pub fn by_server_id(server_id: impl Into<String>) -> Self {
        Self {
            server_id: Some(server_id.into()),
            include_deleted: true,
            ..Self::default()
        }
    }
}

/// Durable keyed storage for task records
///
/// Implementations run inside whatever transaction the caller opened.
pub trait TaskStore {
    /// Get a task by ID, soft-deleted rows included
    fn get(&self, id: &TaskId) -> Result<Option<Task>>;

    /// Insert or replace a task
    fn put(&self, task: &Task) -> Result<()>;

    /// List tasks matching a predicate, newest first
    fn query(&self, query: &TaskQuery) -> Result<Vec<Task>>;
}

/// `SQLite` implementation of `TaskStore`
pub struct SqliteTaskStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTaskStore<'a> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a task from a database row
    fn parse_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
        let id: String = row.get(0)?;
        let status: String = row.get(8)?;
        Ok(Task {
            id: id.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?,
            server_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            completed: row.get::<_, i32>(4)? != 0,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            is_deleted: row.get::<_, i32>(7)? != 0,
            sync_status: status.parse().map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, e.into())
            })?,
            last_synced_at: row.get(9)?,
        })
    }
}

impl TaskStore for SqliteTaskStore<'_> {
    fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"),
                params![id.as_str()],
                Self::parse_task,
            )
            .optional()?;
        Ok(task)
    }

    fn put(&self, task: &Task) -> Result<()> {
        if let Some(existing) = self.get(&task.id)? {
            if existing.server_id.is_some() && existing.server_id != task.server_id {
                return Err(Error::InvalidInput(format!(
                    "server_id of task {} is immutable once assigned",
                    task.id
                )));
            }
        }

        self.conn.execute(
            "INSERT INTO tasks (id, server_id, title, description, completed, created_at,
                                updated_at, is_deleted, sync_status, last_synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                server_id = excluded.server_id,
                title = excluded.title,
                description = excluded.description,
                completed = excluded.completed,
                updated_at = excluded.updated_at,
                is_deleted = excluded.is_deleted,
                sync_status = excluded.sync_status,
                last_synced_at = excluded.last_synced_at",
            params![
                task.id.as_str(),
                task.server_id,
                task.title,
                task.description,
                i32::from(task.completed),
                task.created_at,
                task.updated_at,
                i32::from(task.is_deleted),
                task.sync_status.as_str(),
                task.last_synced_at,
            ],
        )?;
        Ok(())
    }

    fn query(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1 = 1");
        let mut values: Vec<Value> = Vec::new();

        if !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        if !query.statuses.is_empty() {
            let placeholders = vec!["?"; query.statuses.len()].join(", ");
            sql.push_str(&format!(" AND sync_status IN ({placeholders})"));
            values.extend(
                query
                    .statuses
                    .iter()
                    .map(|status| Value::Text(status.as_str().to_string())),
            );
        }
        if let Some(server_id) = &query.server_id {
            sql.push_str(" AND server_id = ?");
            values.push(Value::Text(server_id.clone()));
        }
        sql.push_str(" ORDER BY updated_at DESC, id ASC");
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params_from_iter(values), Self::parse_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }
}
