//! Remote graph client trait and implementations.
//!
//! This module defines the `RemoteGraphClient` trait, the entire
//! network-facing contract of the filesystem driver: list, create, update,
//! re-parent, download and upload objects addressed by opaque identifiers.
//! HTTP framing, authentication and retry policy all live behind it.
//!

#[cfg(feature = "gdrive")]
mod gdrive;
#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "gdrive")]
pub use self::gdrive::GoogleDriveClient;
#[cfg(feature = "mock")]
pub use self::mock::{Call, MockGraph};
use crate::error::Result;
use crate::models::{MetadataUpdate, ObjectKind, RemoteObject, UploadTarget};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use tokio::io::AsyncRead;

pub type ObjectStream<'a> = Pin<Box<dyn Stream<Item = Result<RemoteObject>> + Send + 'a>>;
pub type BoxAsyncRead = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// Capability interface over the remote object store.
///
/// The store is a graph, not a tree: objects have an identifier, a name and
/// zero or more parent identifiers, and nothing stops two siblings from
/// sharing a name. Turning paths into identifiers is the caller's problem.
///
/// # Examples
///
/// ```
/// use drivefs_graph::{RemoteGraphClient, ObjectKind, error::Result};
///
/// async fn folder_names(client: &dyn RemoteGraphClient) -> Result<Vec<String>> {
///     Ok(client
///         .list_children("root")
///         .await?
///         .into_iter()
///         .filter(|o| o.kind == ObjectKind::Container)
///         .map(|o| o.name)
///         .collect())
/// }
/// ```
#[async_trait]
pub trait RemoteGraphClient: Send + Sync {
    /// Name of the configured client (used for logging only).
    fn name(&self) -> &str;

    /// List the children of a container.
    ///
    /// Default implementation collects everything from
    /// [`children_stream()`](Self::children_stream) into a [`Vec`].
    async fn list_children(&self, container_id: &str) -> Result<Vec<RemoteObject>> {
        self.children_stream(container_id).try_collect().await
    }

    /// Stream the children of a container.
    ///
    /// Only plain files and folders are yielded: trashed objects and
    /// application-specific document types are excluded, since they cannot be
    /// represented as ordinary byte streams.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use drivefs_graph::{RemoteGraphClient, error::Result};
    /// # async fn example(client: &dyn RemoteGraphClient) -> Result<()> {
    /// let mut children = client.children_stream("root");
    /// while let Some(object) = children.try_next().await? {
    ///     println!("{} ({} bytes)", object.name, object.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn children_stream<'a>(&'a self, container_id: &'a str) -> ObjectStream<'a>;

    /// Fetch the current metadata of a single object, including its parents.
    async fn get_object(&self, id: &str) -> Result<RemoteObject>;

    /// Create an empty object named `name` under `parent_id`.
    async fn create_object(&self, name: &str, parent_id: &str, kind: ObjectKind) -> Result<RemoteObject>;

    /// Rename and/or trash an object. Trashing is how objects are deleted;
    /// nothing is ever hard-deleted.
    async fn update_metadata(&self, id: &str, update: MetadataUpdate) -> Result<RemoteObject>;

    /// Move an object from one container to another.
    async fn reparent(&self, id: &str, remove_parent_id: &str, add_parent_id: &str) -> Result<()>;

    /// Start fetching an object's content.
    ///
    /// The request is issued before returning, so a missing object or a
    /// refused connection is reported here and not on the first read.
    async fn open_download(&self, id: &str) -> Result<BoxAsyncRead>;

    /// Stream `content` to completion into `target`.
    ///
    /// Does not return until `content` reports end-of-stream (or fails), so
    /// callers producing content incrementally should run this on its own
    /// task.
    async fn upload(&self, target: UploadTarget, content: BoxAsyncRead) -> Result<RemoteObject>;
}
