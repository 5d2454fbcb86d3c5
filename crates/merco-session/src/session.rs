//! The tab session: open buffers plus autosave.
//!
//! `Session` wraps a [`TabSet`] with the store and the [`Autosaver`]:
//!
//! - structural changes (open/close) recompute display names
//! - edits mark the tab dirty and, for the active tab, re-arm its autosave
//! - a commit saves a snapshot and clears dirtiness only if no newer edit
//!   arrived while the request was in flight
//!
//! Save outcomes are broadcast as [`SessionEvent`]s so a front end can show
//! failures and offer a manual resave. Nothing is retried automatically.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{RwLock, broadcast};

use crate::autosave::{Autosaver, DEFAULT_AUTOSAVE_DELAY};
use crate::error::{SessionError, SessionResult};
use crate::path;
use crate::store::SourceStore;
use crate::tabs::{OpenOutcome, Tab, TabSet};

/// Capacity of the event channel. Slow subscribers lag rather than block.
const EVENT_CAPACITY: usize = 64;

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether edits to the active tab schedule automatic saves.
    pub autosave: bool,
    /// Inactivity window before an automatic save fires.
    pub autosave_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave: true,
            autosave_delay: DEFAULT_AUTOSAVE_DELAY,
        }
    }
}

impl SessionConfig {
    /// A session that only saves when asked to.
    pub fn manual_save() -> Self {
        Self {
            autosave: false,
            ..Self::default()
        }
    }

    /// Set the autosave inactivity window.
    pub fn with_autosave_delay(mut self, delay: Duration) -> Self {
        self.autosave_delay = delay;
        self
    }
}

/// Notifications about save outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A save of `path` was acknowledged. `clean` is false if the buffer was
    /// edited while the save was in flight.
    Saved { path: String, clean: bool },
    /// A save of `path` failed; the tab stays dirty.
    SaveFailed { path: String, error: SessionError },
}

/// What started a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveTrigger {
    /// Timer expiry: only saves a tab that is still dirty and active.
    Autosave,
    /// Explicit request: saves the buffer as it is.
    Manual,
}

struct Shared {
    store: Arc<dyn SourceStore>,
    tabs: RwLock<TabSet>,
    autosave: Autosaver,
    autosave_enabled: bool,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Save the buffer of `file_path` under its per-path lock.
    ///
    /// Returns `Ok(false)` if there was nothing to save.
    async fn commit(&self, file_path: &str, trigger: SaveTrigger) -> SessionResult<bool> {
        let _guard = self.autosave.lock_path(file_path).await;

        let snapshot = {
            let tabs = self.tabs.read().await;
            match trigger {
                SaveTrigger::Autosave => {
                    if !tabs.is_active(file_path) {
                        tracing::debug!(path = %file_path, "autosave skipped: tab not active");
                        return Ok(false);
                    }
                    tabs.dirty_snapshot(file_path)
                }
                SaveTrigger::Manual => tabs.snapshot(file_path),
            }
        };
        let Some(snapshot) = snapshot else {
            tracing::debug!(path = %file_path, ?trigger, "nothing to save");
            return Ok(false);
        };

        match self.store.save(&snapshot.path, &snapshot.content).await {
            Ok(()) => {
                let clean = self.tabs.write().await.mark_saved(&snapshot);
                tracing::info!(
                    path = %snapshot.path,
                    revision = snapshot.revision,
                    clean,
                    ?trigger,
                    "saved"
                );
                self.emit(SessionEvent::Saved {
                    path: snapshot.path,
                    clean,
                });
                Ok(true)
            }
            Err(source) => {
                tracing::warn!(path = %snapshot.path, error = %source, ?trigger, "save failed");
                let error = SessionError::SaveFailed {
                    path: snapshot.path.clone(),
                    source,
                };
                self.emit(SessionEvent::SaveFailed {
                    path: snapshot.path,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }
}

/// Open tabs over a source store, with debounced autosave.
pub struct Session {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("autosave", &self.shared.autosave_enabled)
            .field("delay", &self.shared.autosave.delay())
            .finish()
    }
}

impl Session {
    /// Create a session with no open tabs.
    pub fn new(store: Arc<dyn SourceStore>, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                store,
                tabs: RwLock::new(TabSet::new()),
                autosave: Autosaver::new(config.autosave_delay),
                autosave_enabled: config.autosave,
                events,
            }),
        }
    }

    /// Subscribe to save outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Open `file_path` with `content`, or select it if already open.
    pub async fn open_file(&self, file_path: &str, content: impl Into<String>) -> OpenOutcome {
        let outcome = self.shared.tabs.write().await.open_file(file_path, content);
        tracing::debug!(
            path = %file_path,
            index = outcome.index,
            created = outcome.created,
            "open"
        );
        outcome
    }

    /// Make the tab at `index` active.
    ///
    /// The previously active tab is not flushed; its pending autosave, if
    /// any, will find it inactive and skip.
    pub async fn select_tab(&self, index: usize) -> SessionResult<()> {
        self.shared.tabs.write().await.select_tab(index)
    }

    /// Close the tab at `index` and cancel its pending autosave.
    ///
    /// Unsaved edits are discarded. A save already in flight completes.
    pub async fn close_tab(&self, index: usize) -> SessionResult<Tab> {
        let tab = self.shared.tabs.write().await.close_tab(index)?;
        self.shared.autosave.cancel(&tab.path).await;
        self.shared.autosave.release_path(&tab.path).await;
        if tab.is_dirty {
            tracing::info!(path = %tab.path, "closed tab with unsaved edits");
        }
        Ok(tab)
    }

    /// Replace the buffer of the tab at `index` and mark it dirty.
    ///
    /// If the tab is active and autosave is on, its timer is (re)armed.
    pub async fn edit_content(
        &self,
        index: usize,
        new_content: impl Into<String>,
    ) -> SessionResult<()> {
        let receipt = self
            .shared
            .tabs
            .write()
            .await
            .edit_content(index, new_content)?;
        if self.shared.autosave_enabled && receipt.active {
            let weak: Weak<Shared> = Arc::downgrade(&self.shared);
            let file_path = receipt.path.clone();
            self.shared
                .autosave
                .arm(&receipt.path, async move {
                    if let Some(shared) = weak.upgrade() {
                        // Failures are reported through SessionEvent::SaveFailed.
                        let _ = shared.commit(&file_path, SaveTrigger::Autosave).await;
                    }
                })
                .await;
        }
        Ok(())
    }

    /// Save the tab at `index` now, regardless of autosave.
    ///
    /// Cancels its pending timer. Waits for any in-flight save of the same
    /// path first.
    pub async fn save_tab(&self, index: usize) -> SessionResult<()> {
        let file_path = {
            let tabs = self.shared.tabs.read().await;
            match tabs.get(index) {
                Some(tab) => tab.path.clone(),
                None => {
                    return Err(SessionError::NoSuchTab {
                        index,
                        count: tabs.len(),
                    });
                }
            }
        };
        self.shared.autosave.cancel(&file_path).await;
        self.shared.commit(&file_path, SaveTrigger::Manual).await.map(|_| ())
    }

    /// Save every dirty tab. Returns the failures; an empty list means
    /// everything was persisted.
    pub async fn save_all(&self) -> Vec<SessionError> {
        let dirty = self.shared.tabs.read().await.dirty_paths();
        let mut failures = Vec::new();
        for file_path in dirty {
            self.shared.autosave.cancel(&file_path).await;
            if let Err(e) = self.shared.commit(&file_path, SaveTrigger::Manual).await {
                failures.push(e);
            }
        }
        failures
    }

    /// Snapshot of every open tab, in order.
    pub async fn tabs(&self) -> Vec<Tab> {
        self.shared.tabs.read().await.iter().cloned().collect()
    }

    pub async fn tab(&self, index: usize) -> Option<Tab> {
        self.shared.tabs.read().await.get(index).cloned()
    }

    pub async fn len(&self) -> usize {
        self.shared.tabs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.tabs.read().await.is_empty()
    }

    pub async fn active_index(&self) -> Option<usize> {
        self.shared.tabs.read().await.active_index()
    }

    pub async fn active_tab(&self) -> Option<Tab> {
        self.shared.tabs.read().await.active_tab().cloned()
    }

    pub async fn index_of(&self, file_path: &str) -> Option<usize> {
        self.shared.tabs.read().await.index_of(file_path)
    }

    /// True if an autosave timer is pending for `file_path`.
    pub async fn has_pending_autosave(&self, file_path: &str) -> bool {
        self.shared
            .autosave
            .is_pending(&path::normalize(file_path))
            .await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Pending timers hold only weak references; cancel them so none
        // outlives the session by a full delay.
        self.shared.autosave.try_cancel_all();
    }
}
