//! In-memory remote graph for testing.

use super::{BoxAsyncRead, ObjectStream};
use crate::RemoteGraphClient;
use crate::error::{ErrorKind, Result};
use crate::models::{MetadataUpdate, ObjectKind, ROOT_ID, RemoteObject, UploadTarget};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

/// Operations recorded by [`MockGraph`], one per trait method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    List,
    Get,
    Create,
    Update,
    Reparent,
    Download,
    Upload,
}

struct Node {
    object: RemoteObject,
    content: Vec<u8>,
    trashed: bool,
}

/// In-memory remote graph for testing.
///
/// Objects are stored in a `HashMap` keyed by identifier behind a
/// [`RwLock`], so all trait methods operate on `&self`. Every call is counted
/// per [`Call`] so tests can assert exactly how many round-trips an operation
/// cost, and listings of chosen containers can be made to fail.
///
/// Like the real store, sibling names are not required to be unique.
///
/// # Examples
///
/// ```
/// use drivefs_graph::client::{Call, MockGraph};
/// use drivefs_graph::RemoteGraphClient;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let graph = MockGraph::default()
///     .with_folder("docs", "Documents", "root")
///     .with_file("todo", "todo.txt", "docs", b"milk");
///
/// let children = graph.list_children("docs").await?;
/// assert_eq!(children[0].name, "todo.txt");
/// assert_eq!(graph.calls(Call::List), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockGraph {
    name: String,
    nodes: RwLock<HashMap<String, Node>>,
    next_id: AtomicU64,
    calls: Mutex<HashMap<Call, usize>>,
    failing: Mutex<HashSet<String>>,
}

impl MockGraph {
    /// Change the name of the mock graph.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a container with a fixed identifier.
    ///
    /// Panics if the parent doesn't exist. If test setup is wrong, then test
    /// should not pass.
    pub fn with_folder(self, id: &str, name: &str, parent_id: &str) -> Self {
        self.seed(RemoteObject::new(id, name, ObjectKind::Container).with_parent(parent_id), Vec::new())
    }

    /// Add a leaf with a fixed identifier and content.
    ///
    /// Panics if the parent doesn't exist.
    pub fn with_file(self, id: &str, name: &str, parent_id: &str, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        let object = RemoteObject::new(id, name, ObjectKind::Leaf).with_parent(parent_id).with_size(content.len() as u64);
        self.seed(object, content)
    }

    fn seed(mut self, object: RemoteObject, content: Vec<u8>) -> Self {
        let nodes = self.nodes.get_mut();
        for parent in &object.parents {
            if !nodes.contains_key(parent) {
                // The panic here is DELIBERATE. MockGraph is intended to be
                // used in tests; panics are expected.
                panic!("MockGraph::seed: unknown parent {parent} for {}", object.id);
            }
        }
        nodes.insert(object.id.clone(), Node { object, content, trashed: false });
        self
    }

    /// Make every future listing of `container_id` fail with a network error.
    pub fn fail_listing(&self, container_id: impl Into<String>) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).insert(container_id.into());
    }

    /// Number of times `call` has been issued against this graph.
    pub fn calls(&self, call: Call) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).get(&call).copied().unwrap_or(0)
    }

    /// Stored content of an object, trashed or not.
    pub async fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.nodes.read().await.get(id).map(|node| node.content.clone())
    }

    /// Whether an object has been moved to the trash.
    pub async fn is_trashed(&self, id: &str) -> bool {
        self.nodes.read().await.get(id).is_some_and(|node| node.trashed)
    }

    /// Number of live (non-trashed) objects, excluding the root.
    pub async fn object_count(&self) -> usize {
        self.nodes.read().await.values().filter(|node| !node.trashed && node.object.id != ROOT_ID).count()
    }

    fn record(&self, call: Call) {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()).entry(call).or_default() += 1;
    }

    fn allocate_id(&self) -> String {
        format!("obj-{:04}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn live<'a>(nodes: &'a HashMap<String, Node>, id: &str) -> Result<&'a Node> {
        match nodes.get(id) {
            Some(node) if !node.trashed => Ok(node),
            _ => exn::bail!(ErrorKind::NotFound(id.to_string())),
        }
    }

    fn live_container(nodes: &HashMap<String, Node>, id: &str) -> Result<()> {
        match Self::live(nodes, id)?.object.kind {
            ObjectKind::Container => Ok(()),
            ObjectKind::Leaf => exn::bail!(ErrorKind::Api {
                status: 400,
                message: format!("{id} is not a folder"),
            }),
        }
    }
}

impl Default for MockGraph {
    fn default() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID.to_string(), Node { object: RemoteObject::root(), content: Vec::new(), trashed: false });
        Self {
            name: "mock".to_string(),
            nodes: RwLock::new(nodes),
            next_id: AtomicU64::new(1),
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl RemoteGraphClient for MockGraph {
    fn name(&self) -> &str {
        &self.name
    }

    fn children_stream<'a>(&'a self, container_id: &'a str) -> ObjectStream<'a> {
        self.record(Call::List);
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner()).contains(container_id);

        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let children: Result<Vec<RemoteObject>> = if failing {
                Err(exn::Exn::from(ErrorKind::Network(format!("listing {container_id} refused"))))
            } else {
                let guard = self.nodes.read().await;
                Self::live(&guard, container_id).map(|_| {
                    let mut children: Vec<RemoteObject> = guard
                        .values()
                        .filter(|node| !node.trashed && node.object.parents.iter().any(|p| p == container_id))
                        .map(|node| node.object.clone())
                        .collect();
                    // Identifiers are allocated in creation order.
                    children.sort_by(|a, b| a.id.cmp(&b.id));
                    children
                })
            };
            match children {
                Ok(children) => for child in children {
                    yield Ok(child);
                },
                Err(e) => yield Err(e),
            }
        })
    }

    async fn get_object(&self, id: &str) -> Result<RemoteObject> {
        self.record(Call::Get);
        Ok(Self::live(&*self.nodes.read().await, id)?.object.clone())
    }

    async fn create_object(&self, name: &str, parent_id: &str, kind: ObjectKind) -> Result<RemoteObject> {
        self.record(Call::Create);
        let mut guard = self.nodes.write().await;
        Self::live_container(&guard, parent_id)?;
        let object = RemoteObject::new(self.allocate_id(), name, kind)
            .with_parent(parent_id)
            .with_modified(OffsetDateTime::now_utc());
        guard.insert(object.id.clone(), Node { object: object.clone(), content: Vec::new(), trashed: false });
        Ok(object)
    }

    async fn update_metadata(&self, id: &str, update: MetadataUpdate) -> Result<RemoteObject> {
        self.record(Call::Update);
        let mut guard = self.nodes.write().await;
        let node = guard.get_mut(id).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(id.to_string())))?;
        if let Some(name) = update.name {
            node.object.name = name;
        }
        if let Some(trashed) = update.trashed {
            node.trashed = trashed;
        }
        node.object.modified = OffsetDateTime::now_utc();
        Ok(node.object.clone())
    }

    async fn reparent(&self, id: &str, remove_parent_id: &str, add_parent_id: &str) -> Result<()> {
        self.record(Call::Reparent);
        let mut guard = self.nodes.write().await;
        Self::live_container(&guard, add_parent_id)?;
        let node = guard.get_mut(id).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(id.to_string())))?;
        node.object.parents.retain(|p| p != remove_parent_id);
        node.object.parents.push(add_parent_id.to_string());
        Ok(())
    }

    async fn open_download(&self, id: &str) -> Result<BoxAsyncRead> {
        self.record(Call::Download);
        let guard = self.nodes.read().await;
        let node = Self::live(&guard, id)?;
        if node.object.kind == ObjectKind::Container {
            exn::bail!(ErrorKind::Api { status: 403, message: format!("{id} has no content") });
        }
        Ok(Box::pin(Cursor::new(node.content.clone())))
    }

    async fn upload(&self, target: UploadTarget, mut content: BoxAsyncRead) -> Result<RemoteObject> {
        self.record(Call::Upload);
        // Reject a bad target up front, the way the real store refuses the
        // upload session before any content is sent.
        {
            let guard = self.nodes.read().await;
            match &target {
                UploadTarget::Create { parent_id, .. } => Self::live_container(&guard, parent_id)?,
                UploadTarget::Replace { id } => _ = Self::live(&guard, id)?,
            }
        }

        let mut data = Vec::new();
        content.read_to_end(&mut data).await.map_err(ErrorKind::Io)?;

        let mut guard = self.nodes.write().await;
        let now = OffsetDateTime::now_utc();
        let object = match target {
            UploadTarget::Create { name, parent_id } => {
                let object = RemoteObject::new(self.allocate_id(), name, ObjectKind::Leaf)
                    .with_parent(parent_id)
                    .with_size(data.len() as u64)
                    .with_modified(now);
                guard.insert(object.id.clone(), Node { object: object.clone(), content: data, trashed: false });
                object
            },
            UploadTarget::Replace { id } => {
                let node = guard.get_mut(&id).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(id.clone())))?;
                node.object.size = data.len() as u64;
                node.object.modified = now;
                node.content = data;
                node.object.clone()
            },
        };
        Ok(object)
    }
}
