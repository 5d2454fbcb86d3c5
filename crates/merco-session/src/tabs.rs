//! Ordered set of open tabs.
//!
//! `TabSet` is the synchronous core of the session: it owns every tab's
//! buffer and dirty flag, the insertion order, and the active index. It does
//! no I/O. [`Session`](crate::Session) wraps it with autosave and store
//! access.

use indexmap::IndexMap;

use crate::display_names::resolve_display_names;
use crate::error::{SessionError, SessionResult};
use crate::path;

/// One open edit buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    /// Normalized store path, the tab's identity.
    pub path: String,
    /// Basename of `path`.
    pub name: String,
    /// Label derived from the current open set. See [`resolve_display_names`].
    pub display_name: String,
    /// Current buffer text.
    pub content: String,
    /// True iff `content` diverged from the last persisted snapshot.
    pub is_dirty: bool,
    /// Stamp of the latest open or edit. Unique across the set, so a
    /// reopened path never reuses the stamp of an earlier tab.
    pub revision: u64,
}

/// Result of [`TabSet::open_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOutcome {
    pub index: usize,
    /// False if the path was already open and was merely selected.
    pub created: bool,
}

/// What an edit touched, for arming autosave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditReceipt {
    pub path: String,
    pub revision: u64,
    /// Whether the edited tab is the active one.
    pub active: bool,
}

/// Buffer snapshot taken for a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub path: String,
    pub content: String,
    pub revision: u64,
}

/// Open tabs in insertion order, keyed by path.
#[derive(Debug, Default)]
pub struct TabSet {
    tabs: IndexMap<String, Tab>,
    active: Option<usize>,
    last_revision: u64,
}

impl TabSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `file_path`, or select it if it is already open.
    ///
    /// A new tab starts clean with the supplied content. An existing tab keeps
    /// its buffer; `content` is ignored.
    pub fn open_file(&mut self, file_path: &str, content: impl Into<String>) -> OpenOutcome {
        let file_path = path::normalize(file_path);
        if let Some(index) = self.tabs.get_index_of(&file_path) {
            self.active = Some(index);
            return OpenOutcome {
                index,
                created: false,
            };
        }

        let name = path::basename(&file_path).to_string();
        let revision = self.next_revision();
        let (index, _) = self.tabs.insert_full(
            file_path.clone(),
            Tab {
                path: file_path,
                display_name: name.clone(),
                name,
                content: content.into(),
                is_dirty: false,
                revision,
            },
        );
        self.active = Some(index);
        self.refresh_display_names();
        OpenOutcome {
            index,
            created: true,
        }
    }

    /// Make the tab at `index` active. Buffers are untouched.
    pub fn select_tab(&mut self, index: usize) -> SessionResult<()> {
        self.check_index(index)?;
        self.active = Some(index);
        Ok(())
    }

    /// Close the tab at `index`, returning it.
    ///
    /// Closing a tab before the active one shifts the active index down so the
    /// same tab stays selected. Closing the active tab selects the tab that
    /// took its place (or the new last tab), or nothing if none remain.
    pub fn close_tab(&mut self, index: usize) -> SessionResult<Tab> {
        self.check_index(index)?;
        let Some((_, tab)) = self.tabs.shift_remove_index(index) else {
            return Err(self.no_such_tab(index));
        };
        let remaining = self.tabs.len();

        self.active = match self.active {
            Some(active) if active == index => {
                if remaining == 0 {
                    None
                } else {
                    Some(index.min(remaining - 1))
                }
            }
            Some(active) if index < active => Some(active - 1),
            other => other,
        };
        self.refresh_display_names();
        Ok(tab)
    }

    /// Replace the buffer of the tab at `index`.
    ///
    /// Always marks the tab dirty, even if the content is unchanged. Display
    /// names are not recomputed.
    pub fn edit_content(
        &mut self,
        index: usize,
        new_content: impl Into<String>,
    ) -> SessionResult<EditReceipt> {
        self.check_index(index)?;
        let active = self.active == Some(index);
        let revision = self.next_revision();
        let count = self.tabs.len();
        let Some((_, tab)) = self.tabs.get_index_mut(index) else {
            return Err(SessionError::NoSuchTab { index, count });
        };
        tab.content = new_content.into();
        tab.is_dirty = true;
        tab.revision = revision;
        Ok(EditReceipt {
            path: tab.path.clone(),
            revision: tab.revision,
            active,
        })
    }

    /// Snapshot the buffer of `file_path` if it is open.
    pub fn snapshot(&self, file_path: &str) -> Option<Snapshot> {
        self.tabs.get(file_path).map(|tab| Snapshot {
            path: tab.path.clone(),
            content: tab.content.clone(),
            revision: tab.revision,
        })
    }

    /// Snapshot the buffer of `file_path` if it is open and dirty.
    pub fn dirty_snapshot(&self, file_path: &str) -> Option<Snapshot> {
        self.snapshot(file_path)
            .filter(|_| self.tabs.get(file_path).is_some_and(|tab| tab.is_dirty))
    }

    /// Record a successful save of `snapshot`.
    ///
    /// Clears the dirty flag only if the tab was neither edited nor closed and
    /// reopened since the snapshot was taken. Returns whether the tab is now
    /// clean.
    pub fn mark_saved(&mut self, snapshot: &Snapshot) -> bool {
        match self.tabs.get_mut(&snapshot.path) {
            Some(tab) if tab.revision == snapshot.revision => {
                tab.is_dirty = false;
                true
            }
            _ => false,
        }
    }

    /// True if `file_path` is the active tab.
    pub fn is_active(&self, file_path: &str) -> bool {
        self.active.is_some() && self.active == self.tabs.get_index_of(file_path)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.active.and_then(|i| self.get(i))
    }

    pub fn get(&self, index: usize) -> Option<&Tab> {
        self.tabs.get_index(index).map(|(_, tab)| tab)
    }

    pub fn get_by_path(&self, file_path: &str) -> Option<&Tab> {
        self.tabs.get(&path::normalize(file_path))
    }

    pub fn index_of(&self, file_path: &str) -> Option<usize> {
        self.tabs.get_index_of(&path::normalize(file_path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tab> {
        self.tabs.values()
    }

    /// Paths of every dirty tab, in tab order.
    pub fn dirty_paths(&self) -> Vec<String> {
        self.tabs
            .values()
            .filter(|tab| tab.is_dirty)
            .map(|tab| tab.path.clone())
            .collect()
    }

    fn next_revision(&mut self) -> u64 {
        self.last_revision += 1;
        self.last_revision
    }

    fn refresh_display_names(&mut self) {
        let names = resolve_display_names(self.tabs.keys().map(String::as_str));
        for tab in self.tabs.values_mut() {
            if let Some(display) = names.get(&tab.path) {
                tab.display_name.clone_from(display);
            }
        }
    }

    fn check_index(&self, index: usize) -> SessionResult<()> {
        if index < self.tabs.len() {
            Ok(())
        } else {
            Err(self.no_such_tab(index))
        }
    }

    fn no_such_tab(&self, index: usize) -> SessionError {
        SessionError::NoSuchTab {
            index,
            count: self.tabs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(tabs: &TabSet) -> Vec<String> {
        tabs.iter().map(|t| t.display_name.clone()).collect()
    }

    #[test]
    fn open_appends_and_selects() {
        let mut tabs = TabSet::new();
        let first = tabs.open_file("alpha/lib.rs", "a");
        let second = tabs.open_file("beta/mod.rs", "b");

        assert_eq!(first, OpenOutcome { index: 0, created: true });
        assert_eq!(second, OpenOutcome { index: 1, created: true });
        assert_eq!(tabs.active_index(), Some(1));
        assert!(!tabs.get(0).unwrap().is_dirty);
    }

    #[test]
    fn reopen_selects_existing() {
        let mut tabs = TabSet::new();
        tabs.open_file("alpha/lib.rs", "a");
        tabs.open_file("beta/mod.rs", "b");
        tabs.edit_content(0, "edited").unwrap();

        let again = tabs.open_file("/alpha//lib.rs", "stale");

        assert_eq!(again, OpenOutcome { index: 0, created: false });
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs.active_index(), Some(0));
        assert_eq!(tabs.get(0).unwrap().content, "edited");
        assert_eq!(tabs.get_by_path("alpha/lib.rs").map(|t| t.is_dirty), Some(true));
        assert!(tabs.get_by_path("gamma/lib.rs").is_none());
    }

    #[test]
    fn colliding_basenames_get_parent_dirs() {
        let mut tabs = TabSet::new();
        tabs.open_file("strategies/alpha/lib.rs", "");
        assert_eq!(labels(&tabs), vec!["lib.rs"]);

        tabs.open_file("strategies/beta/lib.rs", "");
        assert_eq!(labels(&tabs), vec!["alpha/lib.rs", "beta/lib.rs"]);

        tabs.close_tab(1).unwrap();
        assert_eq!(labels(&tabs), vec!["lib.rs"]);
    }

    #[test]
    fn edit_always_dirties() {
        let mut tabs = TabSet::new();
        tabs.open_file("a.rs", "same");

        let receipt = tabs.edit_content(0, "same").unwrap();

        let tab = tabs.get(0).unwrap();
        assert!(tab.is_dirty);
        assert_eq!(tab.content, "same");
        assert_eq!(
            receipt,
            EditReceipt {
                path: "a.rs".into(),
                revision: 2,
                active: true
            }
        );
    }

    #[test]
    fn edit_out_of_range() {
        let mut tabs = TabSet::new();
        assert_eq!(
            tabs.edit_content(0, "x"),
            Err(SessionError::NoSuchTab { index: 0, count: 0 })
        );
    }

    #[test]
    fn close_last_active_clears_selection() {
        let mut tabs = TabSet::new();
        tabs.open_file("a.rs", "");
        tabs.close_tab(0).unwrap();
        assert_eq!(tabs.active_index(), None);
        assert!(tabs.is_empty());
    }

    #[test]
    fn close_earlier_tab_keeps_selection() {
        let mut tabs = TabSet::new();
        tabs.open_file("a.rs", "");
        tabs.open_file("b.rs", "");
        tabs.open_file("c.rs", "");
        tabs.select_tab(2).unwrap();

        tabs.close_tab(0).unwrap();

        assert_eq!(tabs.active_index(), Some(1));
        assert_eq!(tabs.active_tab().unwrap().path, "c.rs");
    }

    #[test]
    fn close_later_tab_keeps_index() {
        let mut tabs = TabSet::new();
        tabs.open_file("a.rs", "");
        tabs.open_file("b.rs", "");
        tabs.select_tab(0).unwrap();

        tabs.close_tab(1).unwrap();
        assert_eq!(tabs.active_index(), Some(0));
    }

    #[test]
    fn close_active_selects_successor_or_last() {
        let mut tabs = TabSet::new();
        tabs.open_file("a.rs", "");
        tabs.open_file("b.rs", "");
        tabs.open_file("c.rs", "");

        tabs.select_tab(1).unwrap();
        tabs.close_tab(1).unwrap();
        assert_eq!(tabs.active_tab().unwrap().path, "c.rs");

        tabs.close_tab(1).unwrap();
        assert_eq!(tabs.active_index(), Some(0));
        assert_eq!(tabs.active_tab().unwrap().path, "a.rs");
    }

    #[test]
    fn select_out_of_range_is_error() {
        let mut tabs = TabSet::new();
        tabs.open_file("a.rs", "");
        assert!(tabs.select_tab(1).is_err());
        assert_eq!(tabs.active_index(), Some(0));
    }

    #[test]
    fn mark_saved_respects_newer_edits() {
        let mut tabs = TabSet::new();
        tabs.open_file("a.rs", "");
        tabs.edit_content(0, "one").unwrap();
        let snapshot = tabs.dirty_snapshot("a.rs").unwrap();

        tabs.edit_content(0, "two").unwrap();
        assert!(!tabs.mark_saved(&snapshot));
        assert!(tabs.get(0).unwrap().is_dirty);

        let latest = tabs.dirty_snapshot("a.rs").unwrap();
        assert!(tabs.mark_saved(&latest));
        assert!(!tabs.get(0).unwrap().is_dirty);
        assert!(tabs.dirty_snapshot("a.rs").is_none());
    }

    #[test]
    fn mark_saved_ignores_snapshot_of_closed_tab() {
        let mut tabs = TabSet::new();
        tabs.open_file("a.rs", "v0");
        tabs.edit_content(0, "v1").unwrap();
        let stale = tabs.dirty_snapshot("a.rs").unwrap();

        tabs.close_tab(0).unwrap();
        tabs.open_file("a.rs", "v0");
        tabs.edit_content(0, "mine").unwrap();

        assert!(!tabs.mark_saved(&stale));
        assert!(tabs.get(0).unwrap().is_dirty);
        assert_ne!(tabs.get(0).unwrap().revision, stale.revision);
    }

    #[test]
    fn edit_inactive_tab_reports_inactive() {
        let mut tabs = TabSet::new();
        tabs.open_file("a.rs", "");
        tabs.open_file("b.rs", "");
        let receipt = tabs.edit_content(0, "x").unwrap();
        assert!(!receipt.active);
        assert!(tabs.is_active("b.rs"));
        assert!(!tabs.is_active("a.rs"));
    }
}
