//! Path-addressed filesystem driver over a remote object graph.
//!
//! [`DriveFs`] turns the identifier-addressed operations of a
//! [`RemoteGraphClient`](drivefs_graph::RemoteGraphClient) into the
//! path-addressed operations a file-serving framework expects, caching every
//! path it resolves along the way.

mod cache;
mod driver;
pub mod error;
mod handle;
mod info;
pub mod path;

pub use crate::cache::PathResolver;
pub use crate::driver::{DriveFs, FilesystemDriver};
pub use crate::handle::{OpenMode, StreamingFileHandle};
pub use crate::info::{FileInfo, MODE_DIR, MODE_PERM};
