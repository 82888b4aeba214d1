//! Synchronization between the local store and a remote endpoint.

mod engine;
mod error;
mod memory_remote;
mod remote;
mod resolver;
mod retry;
pub mod worker;

pub use engine::{CycleOutcome, CycleReport, SyncEngine};
pub use error::{RemoteError, SyncError};
pub use memory_remote::{MemoryRemote, RemoteSnapshot};
pub use remote::{PullBatch, PushItem, PushOutcome, PushResult, Remote, RemoteTask};
pub use resolver::{resolve, Resolution, Version};
pub use retry::{FailureClass, RetryPolicy};
pub use worker::SyncWorkerHandle;
