//! Data models for tasksync

mod sync_conflict;
mod sync_queue_entry;
mod sync_state;
mod task;

pub use sync_conflict::{Origin, SyncConflict};
pub use sync_queue_entry::{QueueStats, SyncQueueEntry};
pub use sync_state::{SyncState, Watermark};
pub use task::{NewTask, SyncStatus, Task, TaskId, TaskUpdate};
