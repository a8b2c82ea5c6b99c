//! Errors raised by process steps and snapshots

use core_types::HostId;
use host_api::{OsError, ValueError};
use thiserror::Error;

/// Failure of one continuation step
///
/// `Os` and `Value` are domain errors and are printed verbatim. `Internal`
/// is never shown to the user; it becomes an incident.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Os(#[from] OsError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("internal fault: {0}")]
    Internal(String),
}

impl ProcessError {
    pub fn internal(message: impl Into<String>) -> Self {
        ProcessError::Internal(message.into())
    }

    /// True for errors a user is allowed to see
    pub fn is_domain(&self) -> bool {
        !matches!(self, ProcessError::Internal(_))
    }
}

/// Host checkpoint errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Host not found: {0}")]
    HostNotFound(HostId),

    #[error("Host already loaded: {0}")]
    Duplicate(HostId),
}
