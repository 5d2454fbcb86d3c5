//! Lazily-loaded virtual file tree over a [`SourceStore`].
//!
//! # Design
//!
//! The tree is a flat map from path to node record. Parent/child relations are
//! expressed by path prefix; there are no pointers between records.
//!
//! ```text
//! ""                     -> Directory, children: [alpha, beta]
//! "alpha"                -> Directory, children: [alpha/lib.rs]
//! "alpha/lib.rs"         -> File
//! "beta"                 -> Directory, children: unresolved
//! ```
//!
//! A directory's children are fetched on first [`FileTree::expand`] and then
//! served from the cache until [`FileTree::invalidate`] is called. Mutations
//! (`create`, `delete`, `move_path`) are pass-through: the caller invalidates
//! the affected parent afterwards.
//!
//! Concurrent expands of the same directory share one in-flight fetch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use crate::error::{SessionError, SessionResult, StoreError};
use crate::path;
use crate::store::{NodeEntry, NodeKind, SourceStore};

/// One entry in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    /// Full path, the node's identity. The root is `""`.
    pub path: String,
    /// Basename of `path`.
    pub name: String,
    pub kind: NodeKind,
}

impl FileNode {
    fn new(node_path: &str, kind: NodeKind) -> Self {
        Self {
            path: node_path.to_string(),
            name: path::basename(node_path).to_string(),
            kind,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

type FetchResult = Result<Vec<NodeEntry>, StoreError>;
type PendingFetch = Shared<BoxFuture<'static, FetchResult>>;

/// A directory fetch in flight.
struct InFlight {
    /// Unique per fetch, so an awaiter only ever clears its own entry.
    id: u64,
    /// Generation of the directory when the fetch started.
    generation: u64,
    fetch: PendingFetch,
}

#[derive(Debug)]
struct NodeRecord {
    node: FileNode,
    /// Child paths once resolved, `None` while unresolved.
    children: Option<Vec<String>>,
}

#[derive(Default)]
struct TreeState {
    nodes: HashMap<String, NodeRecord>,
    /// In-flight directory fetches.
    pending: HashMap<String, InFlight>,
    last_fetch_id: u64,
    /// Bumped on every invalidation so late fetch results can be recognized.
    generations: HashMap<String, u64>,
}

impl TreeState {
    fn generation(&self, dir: &str) -> u64 {
        self.generations.get(dir).copied().unwrap_or(0)
    }

    fn children_nodes(&self, child_paths: &[String]) -> Vec<FileNode> {
        child_paths
            .iter()
            .filter_map(|p| self.nodes.get(p).map(|r| r.node.clone()))
            .collect()
    }

    fn resolved_children(&self, dir: &str) -> Option<Vec<FileNode>> {
        let record = self.nodes.get(dir)?;
        let children = record.children.as_ref()?;
        Some(self.children_nodes(children))
    }

    /// Cache a fresh listing for `dir`, pruning records that disappeared.
    fn apply_listing(&mut self, dir: &str, entries: Vec<NodeEntry>) -> Vec<FileNode> {
        let listed: Vec<(String, NodeKind)> = entries
            .into_iter()
            .map(|e| (path::normalize(&e.path), e.kind))
            .collect();
        let keep: HashSet<&str> = listed.iter().map(|(p, _)| p.as_str()).collect();

        // Drop every record under `dir` whose top-level child is gone.
        let stale: Vec<String> = self
            .nodes
            .keys()
            .filter(|k| k.as_str() != dir && path::is_within(k, dir))
            .filter(|k| {
                let rest = if dir.is_empty() {
                    k.as_str()
                } else {
                    &k[dir.len() + 1..]
                };
                let first = rest.split('/').next().unwrap_or(rest);
                !keep.contains(path::join(dir, first).as_str())
            })
            .cloned()
            .collect();
        for key in stale {
            self.nodes.remove(&key);
            self.pending.remove(&key);
        }

        for (child_path, kind) in &listed {
            let replace = match self.nodes.get(child_path) {
                Some(existing) => existing.node.kind != *kind,
                None => true,
            };
            if replace {
                // A kind change invalidates anything cached beneath the old node.
                self.nodes
                    .retain(|k, _| k == child_path || !path::is_within(k, child_path));
                self.pending.retain(|k, _| !path::is_within(k, child_path));
                self.nodes.insert(
                    child_path.clone(),
                    NodeRecord {
                        node: FileNode::new(child_path, *kind),
                        children: None,
                    },
                );
            }
        }

        let child_paths: Vec<String> = listed.into_iter().map(|(p, _)| p).collect();
        let record = self
            .nodes
            .entry(dir.to_string())
            .or_insert_with(|| NodeRecord {
                node: FileNode::new(dir, NodeKind::Directory),
                children: None,
            });
        record.children = Some(child_paths.clone());
        self.children_nodes(&child_paths)
    }
}

/// Cached, lazily-expanded view of the remote source tree.
pub struct FileTree {
    store: Arc<dyn SourceStore>,
    state: Mutex<TreeState>,
}

impl std::fmt::Debug for FileTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTree")
            .field("state", &"<locked>")
            .finish()
    }
}

impl FileTree {
    /// Create an empty tree over `store`. Nothing is fetched until expanded.
    pub fn new(store: Arc<dyn SourceStore>) -> Self {
        let mut state = TreeState::default();
        state.nodes.insert(
            String::new(),
            NodeRecord {
                node: FileNode::new("", NodeKind::Directory),
                children: None,
            },
        );
        Self {
            store,
            state: Mutex::new(state),
        }
    }

    /// The store this tree reads from and mutates.
    pub fn store(&self) -> &Arc<dyn SourceStore> {
        &self.store
    }

    /// Children of the root, fetched once.
    pub async fn root(&self) -> SessionResult<Vec<FileNode>> {
        self.expand("").await
    }

    /// Children of the directory at `dir`.
    ///
    /// Served from the cache if resolved. Otherwise fetched; concurrent
    /// callers share the same fetch. On failure the directory stays
    /// unresolved and a later call retries.
    pub async fn expand(&self, dir: &str) -> SessionResult<Vec<FileNode>> {
        let dir = path::normalize(dir);

        let (generation, fetch_id, fetch) = {
            let mut state = self.state.lock().await;
            if let Some(children) = state.resolved_children(&dir) {
                tracing::debug!(path = %dir, "expand served from cache");
                return Ok(children);
            }
            if let Some(record) = state.nodes.get(&dir)
                && record.node.kind == NodeKind::File
            {
                return Err(SessionError::LoadFailed {
                    path: dir.clone(),
                    source: StoreError::NotADirectory(dir),
                });
            }

            let generation = state.generation(&dir);
            let joinable = state
                .pending
                .get(&dir)
                .filter(|in_flight| in_flight.generation == generation)
                .map(|in_flight| (in_flight.id, in_flight.fetch.clone()));
            match joinable {
                Some((id, fetch)) => {
                    tracing::debug!(path = %dir, "joining in-flight fetch");
                    (generation, id, fetch)
                }
                None => {
                    state.last_fetch_id += 1;
                    let id = state.last_fetch_id;
                    let fetch = self.start_fetch(&dir);
                    state.pending.insert(
                        dir.clone(),
                        InFlight {
                            id,
                            generation,
                            fetch: fetch.clone(),
                        },
                    );
                    (generation, id, fetch)
                }
            }
        };

        let result = fetch.await;

        let mut state = self.state.lock().await;
        if state.pending.get(&dir).is_some_and(|in_flight| in_flight.id == fetch_id) {
            state.pending.remove(&dir);
        }

        match result {
            Ok(entries) => {
                if state.generation(&dir) != generation {
                    // Invalidated while in flight: hand back what we got, cache nothing.
                    tracing::debug!(
                        path = %dir,
                        "discarding listing fetched before invalidation"
                    );
                    return Ok(entries
                        .iter()
                        .map(|e| FileNode::new(&path::normalize(&e.path), e.kind))
                        .collect());
                }
                if let Some(children) = state.resolved_children(&dir) {
                    // Another awaiter of the same fetch already cached it.
                    return Ok(children);
                }
                let children = state.apply_listing(&dir, entries);
                tracing::debug!(path = %dir, count = children.len(), "directory resolved");
                Ok(children)
            }
            Err(source) => {
                tracing::warn!(path = %dir, error = %source, "directory fetch failed");
                Err(SessionError::LoadFailed { path: dir, source })
            }
        }
    }

    fn start_fetch(&self, dir: &str) -> PendingFetch {
        let store = Arc::clone(&self.store);
        let target = dir.to_string();
        tracing::debug!(path = %target, "fetching directory");
        async move { store.list(&target).await }.boxed().shared()
    }

    /// Discard the cached children of `dir`; the next expand re-fetches.
    ///
    /// A fetch already in flight is detached: its result is returned to its
    /// awaiters but not cached.
    pub async fn invalidate(&self, dir: &str) {
        let dir = path::normalize(dir);
        let mut state = self.state.lock().await;
        *state.generations.entry(dir.clone()).or_insert(0) += 1;
        state.pending.remove(&dir);
        if let Some(record) = state.nodes.get_mut(&dir) {
            record.children = None;
        }
        tracing::debug!(path = %dir, "directory invalidated");
    }

    /// Fetch the content of the file at `file_path`.
    pub async fn read_file(&self, file_path: &str) -> SessionResult<String> {
        let file_path = path::normalize(file_path);
        match self.store.read(&file_path).await {
            Ok(content) => Ok(content),
            Err(source) => {
                tracing::warn!(path = %file_path, error = %source, "file fetch failed");
                Err(SessionError::LoadFailed {
                    path: file_path,
                    source,
                })
            }
        }
    }

    /// Create a new file. Refuses to overwrite an existing node.
    ///
    /// Does not touch the cache; invalidate the parent to see the new file.
    pub async fn create(&self, file_path: &str, content: &str) -> SessionResult<()> {
        let file_path = path::normalize(file_path);
        let fail = |source| SessionError::CreateFailed {
            path: file_path.clone(),
            source,
        };

        if file_path.is_empty() {
            return Err(fail(StoreError::Rejected("empty path".to_string())));
        }
        match self.store.get(&file_path).await {
            Ok(_) => return Err(fail(StoreError::AlreadyExists(file_path.clone()))),
            Err(StoreError::NotFound(_)) => {}
            Err(source) => return Err(fail(source)),
        }
        self.store.save(&file_path, content).await.map_err(|source| {
            tracing::warn!(path = %file_path, error = %source, "create failed");
            fail(source)
        })?;
        tracing::info!(path = %file_path, "created file");
        Ok(())
    }

    /// Delete a file or directory subtree.
    ///
    /// Does not touch the cache; invalidate the parent afterwards.
    pub async fn delete(&self, node_path: &str) -> SessionResult<()> {
        let node_path = path::normalize(node_path);
        match self.store.delete(&node_path).await {
            Ok(()) => {
                tracing::info!(path = %node_path, "deleted");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(path = %node_path, error = %source, "delete failed");
                Err(SessionError::DeleteFailed {
                    path: node_path,
                    source,
                })
            }
        }
    }

    /// Move or rename a file or directory subtree.
    ///
    /// Does not touch the cache; invalidate both parents afterwards.
    pub async fn move_path(&self, from: &str, to: &str) -> SessionResult<()> {
        let from = path::normalize(from);
        let to = path::normalize(to);
        match self.store.move_path(&from, &to).await {
            Ok(()) => {
                tracing::info!(from = %from, to = %to, "moved");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(from = %from, to = %to, error = %source, "move failed");
                Err(SessionError::MoveFailed { from, to, source })
            }
        }
    }

    /// Look up a cached node.
    pub async fn node(&self, node_path: &str) -> Option<FileNode> {
        let node_path = path::normalize(node_path);
        let state = self.state.lock().await;
        state.nodes.get(&node_path).map(|r| r.node.clone())
    }

    /// Cached children of `dir`, without fetching.
    pub async fn cached_children(&self, dir: &str) -> Option<Vec<FileNode>> {
        let dir = path::normalize(dir);
        self.state.lock().await.resolved_children(&dir)
    }

    /// True if `dir` has a cached listing.
    pub async fn is_resolved(&self, dir: &str) -> bool {
        self.cached_children(dir).await.is_some()
    }

    /// True if a fetch for `dir` is in flight.
    pub async fn is_loading(&self, dir: &str) -> bool {
        let dir = path::normalize(dir);
        self.state.lock().await.pending.contains_key(&dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, FileTree) {
        let store = Arc::new(
            MemoryStore::with_files([
                ("alpha/lib.rs", "// alpha"),
                ("alpha/src/signals.rs", "// signals"),
                ("beta/lib.rs", "// beta"),
                ("README.md", "# strategies"),
            ])
            .await
            .unwrap(),
        );
        let tree = FileTree::new(store.clone());
        (store, tree)
    }

    fn names(nodes: &[FileNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_root_fetched_once() {
        let (store, tree) = setup().await;

        let first = tree.root().await.unwrap();
        let second = tree.root().await.unwrap();

        assert_eq!(names(&first), vec!["alpha", "beta", "README.md"]);
        assert_eq!(first, second);
        assert_eq!(store.get_count("").await, 1);
    }

    #[tokio::test]
    async fn test_expand_twice_fetches_once() {
        let (store, tree) = setup().await;
        tree.expand("alpha").await.unwrap();
        tree.expand("alpha").await.unwrap();
        assert_eq!(store.get_count("alpha").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_expands_share_fetch() {
        let (store, tree) = setup().await;
        let (a, b, c) = tokio::join!(
            tree.expand("alpha"),
            tree.expand("alpha"),
            tree.expand("/alpha/")
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(names(&c.unwrap()), vec!["src", "lib.rs"]);
        assert_eq!(store.get_count("alpha").await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_refetches() {
        let (store, tree) = setup().await;
        tree.expand("alpha").await.unwrap();

        tree.invalidate("alpha").await;
        assert!(!tree.is_resolved("alpha").await);
        tree.expand("alpha").await.unwrap();

        assert_eq!(store.get_count("alpha").await, 2);
    }

    #[tokio::test]
    async fn test_mutation_does_not_auto_invalidate() {
        let (_store, tree) = setup().await;
        tree.expand("alpha").await.unwrap();

        tree.create("alpha/new.rs", "").await.unwrap();
        let cached = tree.expand("alpha").await.unwrap();
        assert_eq!(names(&cached), vec!["src", "lib.rs"]);

        tree.invalidate("alpha").await;
        let fresh = tree.expand("alpha").await.unwrap();
        assert_eq!(names(&fresh), vec!["src", "lib.rs", "new.rs"]);
    }

    #[tokio::test]
    async fn test_refetch_prunes_removed_subtree() {
        let (_store, tree) = setup().await;
        tree.expand("alpha").await.unwrap();
        tree.expand("alpha/src").await.unwrap();
        assert!(tree.node("alpha/src/signals.rs").await.is_some());

        tree.delete("alpha/src").await.unwrap();
        tree.invalidate("alpha").await;
        tree.expand("alpha").await.unwrap();

        assert!(tree.node("alpha/src").await.is_none());
        assert!(tree.node("alpha/src/signals.rs").await.is_none());
        assert!(tree.node("alpha/lib.rs").await.is_some());
    }

    #[tokio::test]
    async fn test_refetch_keeps_cached_subdirectories() {
        let (store, tree) = setup().await;
        tree.expand("alpha").await.unwrap();
        tree.expand("alpha/src").await.unwrap();

        tree.invalidate("alpha").await;
        tree.expand("alpha").await.unwrap();
        tree.expand("alpha/src").await.unwrap();

        assert_eq!(store.get_count("alpha/src").await, 1);
    }

    #[tokio::test]
    async fn test_expand_failure_is_retryable() {
        let (store, tree) = setup().await;

        let err = tree.expand("gamma").await.unwrap_err();
        assert!(matches!(err, SessionError::LoadFailed { ref path, .. } if path == "gamma"));
        assert!(!tree.is_resolved("gamma").await);
        assert!(!tree.is_loading("gamma").await);

        store.mkdir("gamma").await.unwrap();
        assert!(tree.expand("gamma").await.unwrap().is_empty());
        assert_eq!(store.get_count("gamma").await, 2);
    }

    #[tokio::test]
    async fn test_expand_file_is_load_failure() {
        let (_store, tree) = setup().await;
        tree.root().await.unwrap();
        let err = tree.expand("README.md").await.unwrap_err();
        assert_eq!(
            err,
            SessionError::LoadFailed {
                path: "README.md".into(),
                source: StoreError::NotADirectory("README.md".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_read_file() {
        let (_store, tree) = setup().await;
        assert_eq!(tree.read_file("beta/lib.rs").await.unwrap(), "// beta");
        assert!(matches!(
            tree.read_file("alpha").await,
            Err(SessionError::LoadFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_refuses_existing() {
        let (_store, tree) = setup().await;
        let err = tree.create("alpha/lib.rs", "clobber").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::CreateFailed { source: StoreError::AlreadyExists(_), .. }
        ));
        assert_eq!(tree.read_file("alpha/lib.rs").await.unwrap(), "// alpha");
    }

    #[tokio::test]
    async fn test_move_and_delete_errors() {
        let (_store, tree) = setup().await;
        assert!(matches!(
            tree.move_path("alpha", "beta").await,
            Err(SessionError::MoveFailed { .. })
        ));
        assert!(matches!(
            tree.delete("nope").await,
            Err(SessionError::DeleteFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_move_then_invalidate_root() {
        let (_store, tree) = setup().await;
        tree.root().await.unwrap();
        tree.move_path("beta", "gamma").await.unwrap();
        tree.invalidate("").await;

        let root = tree.root().await.unwrap();
        assert_eq!(names(&root), vec!["alpha", "gamma", "README.md"]);
        assert!(tree.node("beta").await.is_none());
    }
}
