//! One file tree and one tab session over the same store.
//!
//! The two halves share nothing but the store and paths: opening a file
//! reads it through the tree and hands the content to the session.

use std::sync::Arc;

use crate::error::SessionResult;
use crate::path;
use crate::session::{Session, SessionConfig};
use crate::store::SourceStore;
use crate::tabs::OpenOutcome;
use crate::tree::FileTree;

#[derive(Debug)]
pub struct Workspace {
    tree: FileTree,
    session: Session,
}

impl Workspace {
    pub fn new(store: Arc<dyn SourceStore>, config: SessionConfig) -> Self {
        Self {
            tree: FileTree::new(Arc::clone(&store)),
            session: Session::new(store, config),
        }
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Open `file_path` in a tab.
    ///
    /// An already open path is selected without touching the store, so its
    /// buffer (and any unsaved edits) is kept.
    pub async fn open(&self, file_path: &str) -> SessionResult<OpenOutcome> {
        let file_path = path::normalize(file_path);
        if let Some(index) = self.session.index_of(&file_path).await {
            self.session.select_tab(index).await?;
            return Ok(OpenOutcome {
                index,
                created: false,
            });
        }
        let content = self.tree.read_file(&file_path).await?;
        Ok(self.session.open_file(&file_path, content).await)
    }
}
