//! Core store trait and wire types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Kind of node in the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

/// A directory listing entry, as returned inside a directory descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Name of the entry (not full path).
    pub name: String,
    /// Full path from the workspace root.
    pub path: String,
    /// Kind of entry.
    #[serde(rename = "type")]
    pub kind: NodeKind,
}

impl NodeEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::File,
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::Directory,
        }
    }
}

/// Node descriptor returned by [`SourceStore::get`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceNode {
    File {
        #[serde(default)]
        name: String,
        path: String,
        content: String,
    },
    Directory {
        #[serde(default)]
        name: String,
        path: String,
        children: Vec<NodeEntry>,
    },
}

impl SourceNode {
    pub fn path(&self) -> &str {
        match self {
            SourceNode::File { path, .. } | SourceNode::Directory { path, .. } => path,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            SourceNode::File { .. } => NodeKind::File,
            SourceNode::Directory { .. } => NodeKind::Directory,
        }
    }
}

/// The remote source of truth for strategy sources.
///
/// All paths are relative to the workspace root; the empty string is the
/// root directory. A successful `save` guarantees that a later `get` of the
/// same path observes the saved content.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Fetch a file (with content) or a directory (with its direct children).
    async fn get(&self, path: &str) -> StoreResult<SourceNode>;

    /// Overwrite the whole content of a file, creating it and its parents if
    /// needed.
    async fn save(&self, path: &str, content: &str) -> StoreResult<()>;

    /// Remove a file, or a directory and everything beneath it.
    async fn delete(&self, path: &str) -> StoreResult<()>;

    /// Rename or relocate a file or directory subtree.
    ///
    /// Fails if `to` already exists.
    async fn move_path(&self, from: &str, to: &str) -> StoreResult<()>;

    /// List a directory's children.
    async fn list(&self, path: &str) -> StoreResult<Vec<NodeEntry>> {
        match self.get(path).await? {
            SourceNode::Directory { children, .. } => Ok(children),
            SourceNode::File { .. } => Err(StoreError::NotADirectory(path.to_string())),
        }
    }

    /// Read a file's content.
    async fn read(&self, path: &str) -> StoreResult<String> {
        match self.get(path).await? {
            SourceNode::File { content, .. } => Ok(content),
            SourceNode::Directory { .. } => Err(StoreError::NotAFile(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_descriptor_wire_shape() {
        let json = r#"{
            "type": "directory",
            "name": "alpha",
            "path": "alpha",
            "children": [
                {"name": "src", "path": "alpha/src", "type": "directory"},
                {"name": "lib.rs", "path": "alpha/lib.rs", "type": "file"}
            ]
        }"#;
        let node: SourceNode = serde_json::from_str(json).unwrap();
        assert_eq!(
            node,
            SourceNode::Directory {
                name: "alpha".into(),
                path: "alpha".into(),
                children: vec![
                    NodeEntry::directory("src", "alpha/src"),
                    NodeEntry::file("lib.rs", "alpha/lib.rs"),
                ],
            }
        );
    }

    #[test]
    fn file_descriptor_without_name() {
        let json = r#"{"type": "file", "path": "alpha/lib.rs", "content": "fn main() {}"}"#;
        let node: SourceNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.kind(), NodeKind::File);
        assert_eq!(node.path(), "alpha/lib.rs");
    }
}
