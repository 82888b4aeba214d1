//! Sync error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by (or on the way to) the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RemoteError {
    /// The call did not finish within the request timeout
    #[error("remote request timed out")]
    Timeout,
    /// The network or endpoint cannot be reached at all
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    /// 5xx-class failure on the remote side
    #[error("remote server error {status}: {message}")]
    Server { status: u16, message: String },
    /// The remote asked us to slow down
    #[error("remote rate limited the request")]
    RateLimited,
    /// The remote answered with something the engine cannot use
    #[error("remote protocol error: {0}")]
    Protocol(String),
    /// The payload is structurally invalid for the remote
    #[error("remote rejected payload: {0}")]
    InvalidPayload(String),
    /// Credentials missing or refused
    #[error("remote refused authorization: {0}")]
    Unauthorized(String),
}

impl RemoteError {
    /// Whether a later attempt with the same payload can succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::Unreachable(_)
                | Self::Server { .. }
                | Self::RateLimited
                | Self::Protocol(_)
        )
    }
}

/// Errors surfaced by a sync cycle
#[derive(Debug, Error)]
pub enum SyncError {
    /// Retryable transport or server failure
    #[error("transient network error: {0}")]
    TransientNetwork(RemoteError),

    /// The remote refused the change (payload or authorization)
    #[error("remote rejected the change: {0}")]
    RemoteRejection(RemoteError),

    /// Local and remote versions cannot be ordered
    #[error("conflict cannot be resolved: {0}")]
    ConflictUnresolvable(String),

    /// Local store failure; always fatal to the current cycle
    #[error("storage error: {0}")]
    Storage(#[from] crate::Error),
}

impl From<RemoteError> for SyncError {
    fn from(error: RemoteError) -> Self {
        if error.is_transient() {
            Self::TransientNetwork(error)
        } else {
            Self::RemoteRejection(error)
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_map_to_taxonomy() {
        assert!(matches!(
            SyncError::from(RemoteError::Timeout),
            SyncError::TransientNetwork(_)
        ));
        assert!(matches!(
            SyncError::from(RemoteError::Server {
                status: 503,
                message: "unavailable".into()
            }),
            SyncError::TransientNetwork(_)
        ));
        assert!(matches!(
            SyncError::from(RemoteError::InvalidPayload("title too long".into())),
            SyncError::RemoteRejection(_)
        ));
        assert!(matches!(
            SyncError::from(RemoteError::Unauthorized("expired".into())),
            SyncError::RemoteRejection(_)
        ));
    }

    #[test]
    fn remote_error_serializes_with_kind_tag() {
        let json = serde_json::to_string(&RemoteError::InvalidPayload("bad".into())).unwrap();
        assert_eq!(json, r#"{"kind":"invalid_payload","detail":"bad"}"#);
    }
}
