//! The filesystem driver exposed to hosting frameworks.

use crate::cache::PathResolver;
use crate::error::{ErrorKind, Result};
use crate::handle::{OpenMode, StreamingFileHandle};
use crate::info::FileInfo;
use crate::path;
use async_trait::async_trait;
use drivefs_config::DriverConfig;
use drivefs_graph::{ClientHandle, MetadataUpdate, ObjectKind, RemoteObject, UploadTarget};
use exn::OptionExt;
use tracing::instrument;

/// Path-addressed filesystem operations, as consumed by a file-serving
/// framework (one caller per connected session, all concurrent).
///
/// Paths are absolute within the driver's namespace; relative paths are taken
/// relative to the root.
#[async_trait]
pub trait FilesystemDriver: Send + Sync {
    /// Succeeds if `path` names a directory.
    async fn change_directory(&self, path: &str) -> Result<()>;

    /// Create a directory. The parent must exist and nothing may already be
    /// at `path`.
    async fn make_directory(&self, path: &str) -> Result<()>;

    /// List the entries of a directory.
    async fn list_files(&self, path: &str) -> Result<Vec<FileInfo>>;

    /// Open a file for streaming.
    ///
    /// Opening for [`OpenMode::Read`] starts the download before returning.
    /// Opening for [`OpenMode::Write`] replaces the content of an existing file
    /// or creates a new one; the upload completes when the handle is closed.
    async fn open_file(&self, path: &str, mode: OpenMode) -> Result<StreamingFileHandle>;

    async fn get_file_info(&self, path: &str) -> Result<FileInfo>;

    /// Move a file or directory to the trash.
    async fn delete_file(&self, path: &str) -> Result<()>;

    /// Rename and/or move a file or directory.
    async fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    /// Whether `size` bytes may be written. There is no quota check to make.
    fn can_allocate(&self, _size: u64) -> bool {
        true
    }

    /// Permissions are not modeled by the remote store; accepted and ignored.
    async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        tracing::debug!(path, mode = %format_args!("{mode:o}"), "Ignoring chmod");
        Ok(())
    }
}

/// [`FilesystemDriver`] over a remote object graph.
///
/// Each instance owns its own path cache, so independent instances never see
/// each other's bindings.
///
/// # Examples
///
/// ```
/// use drivefs_driver::{DriveFs, FilesystemDriver};
/// use drivefs_graph::client::MockGraph;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fs = DriveFs::new(Arc::new(MockGraph::default()));
/// fs.make_directory("/photos").await?;
/// let entries = fs.list_files("/").await?;
/// assert!(entries[0].is_directory());
/// # Ok(())
/// # }
/// ```
pub struct DriveFs {
    resolver: PathResolver,
    conduit_capacity: usize,
}

impl DriveFs {
    pub fn new(client: ClientHandle) -> Self {
        Self::from_config(client, &DriverConfig::default())
    }

    pub fn from_config(client: ClientHandle, config: &DriverConfig) -> Self {
        tracing::debug!(client = client.name(), conduit_capacity = config.conduit_capacity, "Creating driver");
        Self { resolver: PathResolver::new(client), conduit_capacity: config.conduit_capacity.max(1) }
    }

    pub fn client(&self) -> &ClientHandle {
        self.resolver.client()
    }

    /// Every path currently bound in the cache, sorted.
    pub async fn cached_paths(&self) -> Vec<String> {
        self.resolver.cached_paths().await
    }

    /// Resolve `path`, which must name a container.
    async fn resolve_container(&self, path: &str) -> Result<RemoteObject> {
        let object = self.resolver.resolve(path).await?;
        if !object.is_container() {
            exn::bail!(ErrorKind::NotFound(path.to_string()));
        }
        Ok(object)
    }

    /// Resolve `path`, treating "not found" as an answer rather than a failure.
    async fn lookup(&self, path: &str) -> Result<Option<RemoteObject>> {
        match self.resolver.resolve(path).await {
            Ok(object) => Ok(Some(object)),
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl FilesystemDriver for DriveFs {
    #[instrument(skip(self))]
    async fn change_directory(&self, path: &str) -> Result<()> {
        tracing::info!(path, "Changing directory");
        self.resolve_container(&path::normalize(path)?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn make_directory(&self, path: &str) -> Result<()> {
        tracing::info!(path, "Creating directory");
        let path = path::normalize(path)?;
        let (parent_path, name) = path::split(&path).ok_or_raise(|| ErrorKind::AlreadyExists(path.clone()))?;
        let parent = self.resolve_container(parent_path).await?;
        // The remote graph happily holds two siblings with the same name.
        if self.lookup(&path).await?.is_some() {
            exn::bail!(ErrorKind::AlreadyExists(path));
        }
        let created = self
            .client()
            .create_object(name, &parent.id, ObjectKind::Container)
            .await
            .map_err(|err| ErrorKind::remote("create", &path, err))?;
        tracing::info!(path = %path, id = %created.id, "Created directory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_files(&self, path: &str) -> Result<Vec<FileInfo>> {
        tracing::info!(path, "Listing directory");
        let path = path::normalize(path)?;
        let directory = self.resolve_container(&path).await?;
        let children = self
            .client()
            .list_children(&directory.id)
            .await
            .map_err(|err| ErrorKind::remote("list", &path, err))?;
        let entries = children.iter().map(FileInfo::from).collect();
        self.resolver.populate(&path, children).await;
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn open_file(&self, path: &str, mode: OpenMode) -> Result<StreamingFileHandle> {
        tracing::info!(path, ?mode, "Opening file");
        let path = path::normalize(path)?;
        match mode {
            OpenMode::Read => {
                let object = self.resolver.resolve(&path).await?;
                if object.is_container() {
                    exn::bail!(ErrorKind::NotFound(path));
                }
                let content = self
                    .client()
                    .open_download(&object.id)
                    .await
                    .map_err(|err| ErrorKind::remote("download", &path, err))?;
                Ok(StreamingFileHandle::download(path, content))
            },
            OpenMode::Write => {
                let (parent_path, name) = path::split(&path).ok_or_raise(|| ErrorKind::AlreadyExists(path.clone()))?;
                let parent = self.resolve_container(parent_path).await?;
                let target = match self.lookup(&path).await? {
                    Some(existing) if existing.is_container() => exn::bail!(ErrorKind::AlreadyExists(path)),
                    Some(existing) => UploadTarget::Replace { id: existing.id },
                    None => UploadTarget::Create { name: name.to_string(), parent_id: parent.id },
                };
                tracing::debug!(path = %path, ?target, "Starting upload");
                Ok(StreamingFileHandle::upload(path, self.client().clone(), target, self.conduit_capacity))
            },
        }
    }

    #[instrument(skip(self))]
    async fn get_file_info(&self, path: &str) -> Result<FileInfo> {
        tracing::info!(path, "Getting file info");
        let object = self.resolver.resolve(path).await?;
        Ok(FileInfo::from(&object))
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, path: &str) -> Result<()> {
        tracing::info!(path, "Deleting");
        let path = path::normalize(path)?;
        if path == path::ROOT {
            exn::bail!(ErrorKind::Unsupported("deleting the root directory"));
        }
        let object = self.resolver.resolve(&path).await?;
        let trashed = self.client().update_metadata(&object.id, MetadataUpdate::trash()).await;
        self.resolver.evict(&path).await;
        trashed.map_err(|err| ErrorKind::remote("trash", &path, err))?;
        tracing::info!(path = %path, id = %object.id, "Moved to trash");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        tracing::info!(from, to, "Renaming");
        let from = path::normalize(from)?;
        let to = path::normalize(to)?;
        let (from_parent_path, _) =
            path::split(&from).ok_or_raise(|| ErrorKind::Unsupported("renaming the root directory"))?;
        let (to_parent_path, to_name) = path::split(&to).ok_or_raise(|| ErrorKind::AlreadyExists(to.clone()))?;

        let object = self.resolver.resolve(&from).await?;
        let destination = self.resolve_container(to_parent_path).await?;

        // Listings do not carry parent identifiers, so the current parent has
        // to be fetched before the object can be moved.
        let current_parent = match from_parent_path == to_parent_path {
            true => None,
            false => {
                let current = self
                    .client()
                    .get_object(&object.id)
                    .await
                    .map_err(|err| ErrorKind::remote("get", &from, err))?;
                let parent = current.parents.into_iter().next().ok_or_raise(|| ErrorKind::NotFound(from.clone()))?;
                Some(parent).filter(|parent| *parent != destination.id)
            },
        };

        let mut renamed = self
            .client()
            .update_metadata(&object.id, MetadataUpdate::rename(to_name))
            .await
            .map_err(|err| ErrorKind::remote("rename", &from, err))?;
        // The object no longer carries its old name, even if the move fails.
        self.resolver.evict(&from).await;
        if let Some(current_parent) = current_parent {
            self.client()
                .reparent(&object.id, &current_parent, &destination.id)
                .await
                .map_err(|err| ErrorKind::remote("reparent", &from, err))?;
            renamed.parents = vec![destination.id];
        }
        self.resolver.bind(&to, renamed).await;
        tracing::info!(from = %from, to = %to, id = %object.id, "Renamed");
        Ok(())
    }
}
