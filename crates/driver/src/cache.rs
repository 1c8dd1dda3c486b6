//! Path-to-object resolution over the remote graph.
//!
//! The remote store only understands identifiers, so every path has to be
//! walked from the root one container listing at a time. Listings are folded
//! into a [`PathCache`] so later lookups of any sibling are free. Entries are
//! never expired: mutations through the driver keep the cache honest, changes
//! made by anyone else go unnoticed until the process restarts.

use crate::error::{ErrorKind, Result};
use crate::path::{self, ROOT};
use drivefs_graph::{ClientHandle, RemoteObject};
use exn::OptionExt;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::instrument;

/// Normalized path to remote object bindings.
///
/// Not synchronized by itself; [`PathResolver`] owns the lock.
#[derive(Debug)]
pub(crate) struct PathCache {
    entries: HashMap<String, RemoteObject>,
}

impl PathCache {
    /// A cache holding only the root binding.
    pub(crate) fn new() -> Self {
        Self { entries: HashMap::from([(ROOT.to_string(), RemoteObject::root())]) }
    }

    pub(crate) fn get(&self, path: &str) -> Option<&RemoteObject> {
        self.entries.get(path)
    }

    pub(crate) fn insert(&mut self, path: String, object: RemoteObject) {
        self.entries.insert(path, object);
    }

    /// Bind every child of the container at `dir` under its own name.
    ///
    /// Siblings sharing a name overwrite each other; the last one listed wins.
    pub(crate) fn populate(&mut self, dir: &str, children: impl IntoIterator<Item = RemoteObject>) -> usize {
        let mut count = 0;
        for child in children {
            self.insert(path::join(dir, &child.name), child);
            count += 1;
        }
        count
    }

    /// Drop the binding for `path` and everything cached beneath it.
    ///
    /// The root binding survives.
    pub(crate) fn evict(&mut self, path: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key == ROOT || !path::is_within(key, path));
        before - self.entries.len()
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }
}

/// Resolves paths to remote objects, listing containers on cache misses.
///
/// The cache lock is held for the whole of a resolution, remote listings
/// included. Concurrent resolutions therefore never list the same container
/// twice, at the cost of serializing cold lookups.
pub struct PathResolver {
    client: ClientHandle,
    cache: Mutex<PathCache>,
}

impl PathResolver {
    pub fn new(client: ClientHandle) -> Self {
        Self { client, cache: Mutex::new(PathCache::new()) }
    }

    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    /// Resolve `path` to the object it names.
    ///
    /// Walks from the root, listing each container whose child is missing
    /// from the cache. A failed listing is logged and treated as an empty
    /// container, so the walk ends in [`ErrorKind::NotFound`] instead of a
    /// remote error. Leaves are never listed.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, path: &str) -> Result<RemoteObject> {
        let path = path::normalize(path)?;
        let mut cache = self.cache.lock().await;
        if let Some(hit) = cache.get(&path) {
            return Ok(hit.clone());
        }

        let mut current = ROOT.to_string();
        for name in path::segments(&path) {
            let child = path::join(&current, name);
            if cache.get(&child).is_none() {
                let parent = cache
                    .get(&current)
                    .filter(|parent| parent.is_container())
                    .cloned()
                    .ok_or_raise(|| ErrorKind::NotFound(path.clone()))?;
                match self.client.list_children(&parent.id).await {
                    Ok(children) => {
                        let count = cache.populate(&current, children);
                        tracing::debug!(container = %current, id = %parent.id, count, "Cached container listing");
                    },
                    Err(err) => {
                        tracing::error!(container = %current, id = %parent.id, error = ?err, "Failed to list container");
                    },
                }
            }
            current = child;
        }

        cache.get(&path).cloned().ok_or_raise(|| ErrorKind::NotFound(path.clone()))
    }

    /// Fold an already-fetched listing of the container at `dir` into the cache.
    pub async fn populate(&self, dir: &str, children: impl IntoIterator<Item = RemoteObject>) {
        let count = self.cache.lock().await.populate(dir, children);
        tracing::debug!(container = %dir, count, "Cached container listing");
    }

    /// Bind `path` to `object`, replacing whatever was there.
    pub async fn bind(&self, path: &str, object: RemoteObject) {
        self.cache.lock().await.insert(path.to_string(), object);
    }

    /// Forget `path` and all of its cached descendants.
    pub async fn evict(&self, path: &str) {
        let evicted = self.cache.lock().await.evict(path);
        tracing::debug!(path, evicted, "Evicted cached paths");
    }

    /// Every path currently bound, sorted.
    pub async fn cached_paths(&self) -> Vec<String> {
        self.cache.lock().await.paths()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivefs_graph::client::{Call, MockGraph};
    use drivefs_graph::{ObjectKind, RemoteGraphClient};
    use std::sync::Arc;

    fn graph() -> Arc<MockGraph> {
        Arc::new(
            MockGraph::default()
                .with_folder("a", "a", "root")
                .with_folder("b", "b", "a")
                .with_file("f", "f.txt", "b", b"hello")
                .with_file("g", "g.txt", "b", b"world")
                .with_file("top", "top.txt", "root", b"top"),
        )
    }

    fn resolver(graph: &Arc<MockGraph>) -> PathResolver {
        PathResolver::new(graph.clone())
    }

    #[test]
    fn test_cache_evicts_descendants_only() {
        let mut cache = PathCache::new();
        cache.insert("/a".into(), RemoteObject::new("a", "a", ObjectKind::Container));
        cache.insert("/a/b".into(), RemoteObject::new("b", "b", ObjectKind::Container));
        cache.insert("/a/b/f".into(), RemoteObject::new("f", "f", ObjectKind::Leaf));
        cache.insert("/ab".into(), RemoteObject::new("ab", "ab", ObjectKind::Leaf));

        assert_eq!(cache.evict("/a"), 3);
        assert_eq!(cache.paths(), vec!["/", "/ab"]);
        assert_eq!(cache.evict("/"), 1);
        assert_eq!(cache.paths(), vec!["/"]);
    }

    #[test]
    fn test_cache_duplicate_names_last_wins() {
        let mut cache = PathCache::new();
        let count = cache.populate(
            "/",
            [RemoteObject::new("first", "dup", ObjectKind::Leaf), RemoteObject::new("second", "dup", ObjectKind::Leaf)],
        );
        assert_eq!(count, 2);
        assert_eq!(cache.get("/dup").unwrap().id, "second");
    }

    #[tokio::test]
    async fn test_resolve_root_is_free() {
        let graph = graph();
        let resolver = resolver(&graph);
        for path in ["/", "", "/.", "//"] {
            assert_eq!(resolver.resolve(path).await.unwrap().id, "root");
        }
        assert_eq!(graph.calls(Call::List), 0);
    }

    #[tokio::test]
    async fn test_resolve_lists_once_per_level() {
        let graph = graph();
        let resolver = resolver(&graph);

        let object = resolver.resolve("/a/b/f.txt").await.unwrap();
        assert_eq!(object.id, "f");
        assert_eq!(object.kind, ObjectKind::Leaf);
        assert_eq!(graph.calls(Call::List), 3);

        // Repeat and sibling lookups are served from the cache.
        assert_eq!(resolver.resolve("/a/b/f.txt").await.unwrap().id, "f");
        assert_eq!(resolver.resolve("/a/b/g.txt").await.unwrap().id, "g");
        assert_eq!(resolver.resolve("/top.txt").await.unwrap().id, "top");
        assert_eq!(resolver.resolve("/a/b").await.unwrap().id, "b");
        assert_eq!(graph.calls(Call::List), 3);
    }

    #[tokio::test]
    async fn test_resolve_missing() {
        let graph = graph();
        let resolver = resolver(&graph);

        let err = resolver.resolve("/a/missing/deeper").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(p) if p == "/a/missing/deeper"));
        // Root and /a were listed; there is nothing to list for /a/missing.
        assert_eq!(graph.calls(Call::List), 2);
    }

    #[tokio::test]
    async fn test_resolve_never_lists_leaves() {
        let graph = graph();
        let resolver = resolver(&graph);

        let err = resolver.resolve("/top.txt/child").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert_eq!(graph.calls(Call::List), 1);
    }

    #[tokio::test]
    async fn test_resolve_listing_failure_degrades_to_not_found() {
        let graph = graph();
        graph.fail_listing("a");
        let resolver = resolver(&graph);

        let err = resolver.resolve("/a/b").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        // Nothing under /a was cached, but the root listing was.
        assert_eq!(resolver.cached_paths().await, vec!["/", "/a", "/top.txt"]);
    }

    #[tokio::test]
    async fn test_resolve_invalid_path() {
        let graph = graph();
        let resolver = resolver(&graph);
        let err = resolver.resolve("/../etc").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        assert_eq!(graph.calls(Call::List), 0);
    }

    #[tokio::test]
    async fn test_stale_entries_are_served() {
        let graph = graph();
        let resolver = resolver(&graph);
        resolver.resolve("/top.txt").await.unwrap();

        // Removed behind the cache's back.
        graph.update_metadata("top", drivefs_graph::MetadataUpdate::trash()).await.unwrap();

        assert_eq!(resolver.resolve("/top.txt").await.unwrap().id, "top");
        assert_eq!(graph.calls(Call::List), 1);
    }

    #[tokio::test]
    async fn test_evict_forces_relisting() {
        let graph = graph();
        let resolver = resolver(&graph);
        resolver.resolve("/a/b/f.txt").await.unwrap();

        resolver.evict("/a").await;
        assert_eq!(resolver.cached_paths().await, vec!["/", "/top.txt"]);

        resolver.resolve("/a/b/f.txt").await.unwrap();
        assert_eq!(graph.calls(Call::List), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolution_lists_once() {
        let graph = graph();
        let resolver = Arc::new(resolver(&graph));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let resolver = resolver.clone();
                let path = if i % 2 == 0 { "/a/b/f.txt" } else { "/a/b/g.txt" };
                tokio::spawn(async move { resolver.resolve(path).await.map(|o| o.id) })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(graph.calls(Call::List), 3);
    }
}
