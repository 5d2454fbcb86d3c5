//! merco-session: the workspace session core of merco studio.
//!
//! This crate provides:
//!
//! - **Store**: the [`SourceStore`] contract with an HTTP client
//!   ([`HttpStore`]) and an in-process implementation ([`MemoryStore`])
//! - **Tree**: [`FileTree`], a lazily expanded, cached view of the remote
//!   directory hierarchy
//! - **Tabs**: [`TabSet`], the ordered open buffers with dirty tracking
//! - **Display names**: [`resolve_display_names`], collision-free tab labels
//! - **Autosave**: [`Autosaver`], per-path debounce timers and save ordering
//! - **Session**: [`Session`], tabs plus autosave over a store
//!
//! [`Workspace`] ties a tree and a session to one store.

pub mod autosave;
pub mod display_names;
pub mod error;
pub mod path;
pub mod session;
pub mod store;
pub mod tabs;
pub mod tree;
pub mod workspace;

pub use autosave::{Autosaver, DEFAULT_AUTOSAVE_DELAY};
pub use display_names::resolve_display_names;
pub use error::{SessionError, SessionResult, StoreError, StoreResult};
pub use session::{Session, SessionConfig, SessionEvent};
pub use store::{HttpStore, MemoryStore, NodeEntry, NodeKind, SourceNode, SourceStore};
pub use tabs::{OpenOutcome, Tab, TabSet};
pub use tree::{FileNode, FileTree};
pub use workspace::Workspace;
