//! Blocking file handles over asynchronous transfers.
//!
//! Hosting frameworks drive file content through `std::io` traits, while the
//! remote client speaks `AsyncRead`. A [`StreamingFileHandle`] bridges the two
//! with [`SyncIoBridge`]. For uploads, a bounded in-memory duplex pipe is the
//! conduit: the handle writes into one end while a background task streams the
//! other end to the remote store.
//!
//! Handles block, so they must be used from outside the async runtime (for
//! example inside [`tokio::task::spawn_blocking`]) while the runtime that
//! opened them keeps running.

use crate::error::{ErrorKind, Result};
use drivefs_graph::{BoxAsyncRead, ClientHandle, RemoteObject, UploadTarget};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tokio::io::DuplexStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;

/// How a file is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

enum Transfer {
    Download(SyncIoBridge<BoxAsyncRead>),
    Upload {
        conduit: SyncIoBridge<DuplexStream>,
        outcome: oneshot::Receiver<drivefs_graph::error::Result<RemoteObject>>,
        task: JoinHandle<()>,
    },
    Closed,
}

/// An open file: a download to read from or an upload to write into.
///
/// Reads and writes are strictly sequential; seeking is not supported. A
/// write handle's upload only completes on [`close()`](Self::close), and
/// dropping it unclosed abandons the upload.
pub struct StreamingFileHandle {
    path: String,
    transfer: Transfer,
}

impl StreamingFileHandle {
    /// Wrap an open download. Must be called from within the runtime.
    pub(crate) fn download(path: String, content: BoxAsyncRead) -> Self {
        Self { path, transfer: Transfer::Download(SyncIoBridge::new(content)) }
    }

    /// Start a background upload into `target` fed by the returned handle.
    /// Must be called from within the runtime.
    pub(crate) fn upload(path: String, client: ClientHandle, target: UploadTarget, capacity: usize) -> Self {
        let (writer, reader) = tokio::io::duplex(capacity);
        let (sender, outcome) = oneshot::channel();
        let upload_path = path.clone();
        let task = tokio::spawn(async move {
            let result = client.upload(target, Box::pin(reader)).await;
            match &result {
                Ok(object) => {
                    tracing::info!(path = %upload_path, id = %object.id, size = object.size, "Upload completed")
                },
                Err(err) => tracing::error!(path = %upload_path, error = ?err, "Upload failed"),
            }
            // The handle may already be gone.
            _ = sender.send(result);
        });
        Self { path, transfer: Transfer::Upload { conduit: SyncIoBridge::new(writer), outcome, task } }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The mode the handle is open in, or `None` once closed.
    pub fn mode(&self) -> Option<OpenMode> {
        match self.transfer {
            Transfer::Download(_) => Some(OpenMode::Read),
            Transfer::Upload { .. } => Some(OpenMode::Write),
            Transfer::Closed => None,
        }
    }

    /// Finish the transfer.
    ///
    /// For uploads this signals end-of-stream to the background upload and
    /// blocks until it reports back; a failed upload surfaces here. Closing an
    /// already closed handle is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.transfer, Transfer::Closed) {
            Transfer::Closed | Transfer::Download(_) => Ok(()),
            Transfer::Upload { mut conduit, outcome, task: _ } => {
                // Fails only when the upload already stopped reading; its
                // outcome says why.
                if let Err(err) = conduit.shutdown() {
                    tracing::debug!(path = %self.path, error = %err, "Upload conduit already closed");
                }
                drop(conduit);
                match outcome.blocking_recv() {
                    Ok(result) => {
                        result.map_err(|err| ErrorKind::remote("upload", &self.path, err))?;
                        Ok(())
                    },
                    Err(_) => exn::bail!(ErrorKind::Remote { op: "upload", target: self.path.clone(), retryable: false }),
                }
            },
        }
    }
}

impl Drop for StreamingFileHandle {
    fn drop(&mut self) {
        if let Transfer::Upload { task, .. } = &self.transfer {
            tracing::warn!(path = %self.path, "Write handle dropped without close, abandoning upload");
            task.abort();
        }
    }
}

impl std::fmt::Debug for StreamingFileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingFileHandle").field("path", &self.path).field("mode", &self.mode()).finish()
    }
}

fn wrong_mode(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, message)
}

impl Read for StreamingFileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.transfer {
            Transfer::Download(content) => content.read(buf),
            Transfer::Upload { .. } => Err(wrong_mode("handle is open for writing")),
            Transfer::Closed => Err(wrong_mode("handle is closed")),
        }
    }
}

impl Write for StreamingFileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.transfer {
            Transfer::Upload { conduit, .. } => conduit.write(buf),
            Transfer::Download(_) => Err(wrong_mode("handle is open for reading")),
            Transfer::Closed => Err(wrong_mode("handle is closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.transfer {
            Transfer::Upload { conduit, .. } => conduit.flush(),
            _ => Ok(()),
        }
    }
}

impl Seek for StreamingFileHandle {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, ErrorKind::Unsupported("seek")))
    }
}
