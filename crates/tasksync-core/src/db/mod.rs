//! Database layer for tasksync

mod conflict_repository;
mod connection;
mod migrations;
mod queue_repository;
mod sync_state_repository;
mod task_repository;

pub use conflict_repository::{ConflictLog, LAST_WRITER_WINS};
pub use connection::Database;
pub use queue_repository::SyncQueue;
pub use sync_state_repository::{SqliteSyncStateRepository, SyncStateRepository};
pub use task_repository::{SqliteTaskStore, TaskQuery, TaskStore};
