//! In-memory source store.
//!
//! Used for offline sessions and testing. All data is ephemeral. Mirrors the
//! server's behavior: listings put directories before files, saves create
//! missing parents, deletes are recursive, and moves refuse to overwrite.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::traits::{NodeEntry, NodeKind, SourceNode, SourceStore};
use crate::error::{StoreError, StoreResult};
use crate::path;

/// Entry in the memory store.
#[derive(Debug, Clone)]
enum Entry {
    File { content: String },
    Directory,
}

impl Entry {
    fn kind(&self) -> NodeKind {
        match self {
            Entry::File { .. } => NodeKind::File,
            Entry::Directory => NodeKind::Directory,
        }
    }
}

/// Request counters, for observing how often the store was hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub gets: usize,
    pub saves: usize,
    pub deletes: usize,
    pub moves: usize,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    stats: StoreStats,
    gets_by_path: HashMap<String, usize>,
}

/// In-memory source store.
///
/// Thread-safe via internal `RwLock`. All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(String::new(), Entry::Directory);
        Self {
            inner: RwLock::new(Inner {
                entries,
                ..Inner::default()
            }),
        }
    }

    /// Create a store pre-populated with files.
    ///
    /// Fails on the first seed that cannot be saved, such as a file nested
    /// under another seeded file.
    pub async fn with_files<'a>(
        files: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> StoreResult<Self> {
        let store = Self::new();
        for (file_path, content) in files {
            store.save(file_path, content).await?;
        }
        Ok(store)
    }

    /// Create an empty directory (and any missing parents).
    pub async fn mkdir(&self, dir: &str) -> StoreResult<()> {
        let normalized = path::normalize(dir);
        let mut inner = self.inner.write().await;
        Self::ensure_dirs(&mut inner.entries, &normalized)
    }

    /// Snapshot of the request counters.
    pub async fn stats(&self) -> StoreStats {
        self.inner.read().await.stats.clone()
    }

    /// How many times `get` was called for `path`.
    pub async fn get_count(&self, node_path: &str) -> usize {
        let normalized = path::normalize(node_path);
        let inner = self.inner.read().await;
        inner.gets_by_path.get(&normalized).copied().unwrap_or(0)
    }

    /// Ensure `dir` and all its ancestors exist as directories.
    fn ensure_dirs(entries: &mut HashMap<String, Entry>, dir: &str) -> StoreResult<()> {
        let mut current = String::new();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            current = path::join(&current, segment);
            match entries.get(&current) {
                Some(Entry::Directory) => {}
                Some(Entry::File { .. }) => {
                    return Err(StoreError::NotADirectory(current));
                }
                None => {
                    entries.insert(current.clone(), Entry::Directory);
                }
            }
        }
        Ok(())
    }

    fn children_of(entries: &HashMap<String, Entry>, dir: &str) -> Vec<NodeEntry> {
        let mut result: Vec<NodeEntry> = entries
            .iter()
            .filter(|(entry_path, _)| {
                !entry_path.is_empty() && path::parent(entry_path) == Some(dir)
            })
            .map(|(entry_path, entry)| NodeEntry {
                name: path::basename(entry_path).to_string(),
                path: entry_path.clone(),
                kind: entry.kind(),
            })
            .collect();

        // Directories first, then alphabetical
        result.sort_by(|a, b| match (a.kind, b.kind) {
            (NodeKind::Directory, NodeKind::File) => std::cmp::Ordering::Less,
            (NodeKind::File, NodeKind::Directory) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        result
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn get(&self, node_path: &str) -> StoreResult<SourceNode> {
        let normalized = path::normalize(node_path);
        let mut inner = self.inner.write().await;
        inner.stats.gets += 1;
        *inner.gets_by_path.entry(normalized.clone()).or_insert(0) += 1;

        match inner.entries.get(&normalized) {
            Some(Entry::File { content }) => Ok(SourceNode::File {
                name: path::basename(&normalized).to_string(),
                path: normalized.clone(),
                content: content.clone(),
            }),
            Some(Entry::Directory) => Ok(SourceNode::Directory {
                name: path::basename(&normalized).to_string(),
                children: Self::children_of(&inner.entries, &normalized),
                path: normalized,
            }),
            None => Err(StoreError::NotFound(normalized)),
        }
    }

    async fn save(&self, node_path: &str, content: &str) -> StoreResult<()> {
        let normalized = path::normalize(node_path);
        let mut inner = self.inner.write().await;
        inner.stats.saves += 1;

        if normalized.is_empty() {
            return Err(StoreError::NotAFile(normalized));
        }
        // Check we're not overwriting a directory
        if let Some(Entry::Directory) = inner.entries.get(&normalized) {
            return Err(StoreError::NotAFile(normalized));
        }
        if let Some(dir) = path::parent(&normalized) {
            Self::ensure_dirs(&mut inner.entries, dir)?;
        }

        inner.entries.insert(
            normalized,
            Entry::File {
                content: content.to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, node_path: &str) -> StoreResult<()> {
        let normalized = path::normalize(node_path);
        let mut inner = self.inner.write().await;
        inner.stats.deletes += 1;

        if normalized.is_empty() {
            return Err(StoreError::Rejected(
                "cannot delete the root workspace directory".to_string(),
            ));
        }
        if !inner.entries.contains_key(&normalized) {
            return Err(StoreError::NotFound(normalized));
        }

        inner
            .entries
            .retain(|entry_path, _| !path::is_within(entry_path, &normalized));
        Ok(())
    }

    async fn move_path(&self, from: &str, to: &str) -> StoreResult<()> {
        let from = path::normalize(from);
        let to = path::normalize(to);
        let mut inner = self.inner.write().await;
        inner.stats.moves += 1;

        if from.is_empty() {
            return Err(StoreError::Rejected(
                "cannot move the root workspace directory".to_string(),
            ));
        }
        if !inner.entries.contains_key(&from) {
            return Err(StoreError::NotFound(from));
        }
        if to.is_empty() || inner.entries.contains_key(&to) {
            return Err(StoreError::AlreadyExists(to));
        }
        if path::is_within(&to, &from) {
            return Err(StoreError::Rejected(format!(
                "cannot move '{from}' into itself"
            )));
        }
        if let Some(dir) = path::parent(&to) {
            Self::ensure_dirs(&mut inner.entries, dir)?;
        }

        // Collect paths to rename (can't modify while iterating)
        let moved: Vec<(String, Entry)> = inner
            .entries
            .iter()
            .filter(|(entry_path, _)| path::is_within(entry_path, &from))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (old_path, entry) in moved {
            inner.entries.remove(&old_path);
            let relocated = format!("{to}{}", &old_path[from.len()..]);
            inner.entries.insert(relocated, entry);
        }
        Ok(())
    }
}
