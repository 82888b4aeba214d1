//! tasksync-core - Local-first task store with an offline-tolerant sync engine
//!
//! This crate contains the task model, the `SQLite` record store and sync
//! queue, and the engine that reconciles them with a remote endpoint.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{NewTask, SyncStatus, Task, TaskId, TaskUpdate};
pub use services::TaskService;
pub use sync::{CycleOutcome, CycleReport, SyncEngine, SyncError};
