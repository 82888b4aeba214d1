//! Persisted process-wide sync state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, monotonic cursor handed out by the remote
///
/// Marks the last remote change set absorbed locally. The engine never
/// interprets the token; it only stores it and sends it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(String);

impl Watermark {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sync state that survives restarts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Last fully absorbed remote position, `None` before the first pull
    pub watermark: Option<Watermark>,
}
