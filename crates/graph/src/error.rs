//! Remote Graph Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A remote graph error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No object with this identifier exists in the remote store.
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Connection-level failure (DNS, TLS, reset, timeout).
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The remote API answered with a non-success status.
    #[display("API error {status}: {message}")]
    Api { status: u16, message: String },
    /// The remote API answered with something we could not decode.
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    /// Reading the upload content source failed.
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Io(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound(_) | Self::InvalidResponse(_) => false,
        }
    }
}
