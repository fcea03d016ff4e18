// src/core/errors.rs

//! Defines the error types for tree-connect operations and the aggregated
//! status returned by a session logoff.

use crate::core::ipc::TreeConnStatus;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// The main error enum, representing every way a tree-connect operation can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeConnError {
    /// The requested share name does not resolve to a share configuration.
    #[error("Share not found")]
    NotFound,

    #[error("Out of memory while allocating tree connect")]
    OutOfMemory,

    /// The session's tree id space is exhausted.
    #[error("No free tree connect id in session")]
    InvalidId,

    /// The authorization channel gave no response (`None`) or rejected the request
    /// with the carried status.
    #[error("Tree connect authorization failed: {}", describe_status(.0))]
    AuthorizationFailed(Option<TreeConnStatus>),

    /// The share configuration was flagged stale and could not be re-resolved.
    #[error("Failed to update stale share config")]
    StaleShare,

    /// The tree connect was already being torn down by someone else.
    #[error("Tree connect already disconnected")]
    AlreadyDisconnected,

    /// The disconnect notification to the authorization channel failed.
    /// Cleanup has still been performed.
    #[error("Tree disconnect notification failed: {0}")]
    NotificationFailed(String),
}

fn describe_status(status: &Option<TreeConnStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "no response".to_string(),
    }
}

/// A fieldless view of `TreeConnError`, used for aggregation and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TreeConnErrorKind {
    NotFound,
    OutOfMemory,
    InvalidId,
    AuthorizationFailed,
    StaleShare,
    AlreadyDisconnected,
    NotificationFailed,
}

impl TreeConnErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeConnErrorKind::NotFound => "not_found",
            TreeConnErrorKind::OutOfMemory => "out_of_memory",
            TreeConnErrorKind::InvalidId => "invalid_id",
            TreeConnErrorKind::AuthorizationFailed => "authorization_failed",
            TreeConnErrorKind::StaleShare => "stale_share",
            TreeConnErrorKind::AlreadyDisconnected => "already_disconnected",
            TreeConnErrorKind::NotificationFailed => "notification_failed",
        }
    }
}

impl fmt::Display for TreeConnErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TreeConnError {
    /// Returns the kind of this error, discarding any payload.
    pub fn kind(&self) -> TreeConnErrorKind {
        match self {
            TreeConnError::NotFound => TreeConnErrorKind::NotFound,
            TreeConnError::OutOfMemory => TreeConnErrorKind::OutOfMemory,
            TreeConnError::InvalidId => TreeConnErrorKind::InvalidId,
            TreeConnError::AuthorizationFailed(_) => TreeConnErrorKind::AuthorizationFailed,
            TreeConnError::StaleShare => TreeConnErrorKind::StaleShare,
            TreeConnError::AlreadyDisconnected => TreeConnErrorKind::AlreadyDisconnected,
            TreeConnError::NotificationFailed(_) => TreeConnErrorKind::NotificationFailed,
        }
    }

    /// True for errors that do not indicate lost or leaked state.
    pub fn is_non_fatal(&self) -> bool {
        matches!(
            self,
            TreeConnError::AlreadyDisconnected | TreeConnError::NotificationFailed(_)
        )
    }
}

/// Errors reported by an authorization channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpcError {
    /// The peer did not answer in time or dropped the request.
    #[error("No response from authorization daemon")]
    NoResponse,

    /// The request queue is closed; the daemon is gone.
    #[error("Authorization channel closed")]
    Closed,

    /// The peer answered with a non-OK status.
    #[error("Authorization daemon returned status {0}")]
    Status(TreeConnStatus),
}

impl From<IpcError> for TreeConnError {
    fn from(err: IpcError) -> Self {
        TreeConnError::NotificationFailed(err.to_string())
    }
}

/// The aggregated outcome of tearing down every tree connect in a session.
///
/// Teardown never stops at the first failure, so every error seen along the
/// way is kept in the order it happened.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogoffReport {
    /// Number of tree connects this logoff drained and freed itself.
    pub disconnected: usize,
    /// Every non-success status observed.
    pub errors: Vec<TreeConnError>,
}

impl LogoffReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// The distinct kinds of errors seen during the logoff.
    pub fn kinds(&self) -> BTreeSet<TreeConnErrorKind> {
        self.errors.iter().map(TreeConnError::kind).collect()
    }

    pub(crate) fn record(&mut self, err: TreeConnError) {
        self.errors.push(err);
    }

    /// Collapses the report into a `Result`, yielding the first error if any occurred.
    pub fn into_result(self) -> Result<usize, TreeConnError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.disconnected),
        }
    }
}
