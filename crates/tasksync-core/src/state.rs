//! Shared sync state types observed by clients.

use serde::{Deserialize, Serialize};

/// Phase of the sync engine's current cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Pushing,
    Pulling,
    Resolving,
    /// Transport unreachable; the cycle is being abandoned
    Failed,
}

/// Outcome of the background worker's most recent cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// No cycle has finished yet
    Idle,
    Syncing,
    Synced,
    /// Remote could not be reached; retried on the next trigger
    Offline,
    /// Local storage failed
    Error,
}
