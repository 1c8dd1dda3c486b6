//! Driver Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Remote failures are raised on top
//! of the [`drivefs_graph`] error that caused them, so the full tree reaches
//! the hosting framework.

use derive_more::{Display, Error};
use drivefs_graph::error::Error as GraphError;

/// A driver error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The path does not resolve to any cached or listable object, or
    /// resolves to the wrong kind of object for the operation.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Something already lives at the path.
    #[display("already exists: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// The path escapes the root or contains forbidden bytes.
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// A remote graph call failed; the cause is the child of this error.
    #[display("remote {op} failed for {target}")]
    Remote { op: &'static str, target: String, retryable: bool },
    /// The operation is not supported on this kind of object or handle.
    #[display("unsupported operation: {_0}")]
    Unsupported(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Raise a remote graph failure for `op` on `target`, keeping the graph
    /// crate's `Exn` frame as a child in this error tree.
    #[track_caller]
    pub fn remote(op: &'static str, target: impl Into<String>, err: GraphError) -> Error {
        let retryable = err.is_retryable();
        err.raise(ErrorKind::Remote { op, target: target.into(), retryable })
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote { retryable: true, .. })
    }
}
