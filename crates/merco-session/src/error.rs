//! Error types for the session core.
//!
//! Two layers:
//!
//! - [`StoreError`] describes why a single request against a
//!   [`SourceStore`](crate::store::SourceStore) failed. It is `Clone` so a
//!   single fetch result can be handed to every caller awaiting it.
//! - [`SessionError`] is what the tree, tabs and autosaver report. Every
//!   variant is non-fatal: the in-memory state is left at its last known good
//!   condition and recovery is an explicit retry by the caller.

use thiserror::Error;

/// Failure of one request against the remote source store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Nothing exists at the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// A directory operation was attempted on a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A file operation was attempted on a directory.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// The destination of a move or create is already taken.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The store refused the request (bad path, root mutation, ...).
    #[error("rejected: {0}")]
    Rejected(String),

    /// Network or server failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Errors reported by the tree cache and the tab session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("failed to load '{path}': {source}")]
    LoadFailed {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to save '{path}': {source}")]
    SaveFailed {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to delete '{path}': {source}")]
    DeleteFailed {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to move '{from}' to '{to}': {source}")]
    MoveFailed {
        from: String,
        to: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to create '{path}': {source}")]
    CreateFailed {
        path: String,
        #[source]
        source: StoreError,
    },

    /// An index-based tab operation named a tab that is not open.
    #[error("no tab at index {index} ({count} open)")]
    NoSuchTab { index: usize, count: usize },
}

impl SessionError {
    /// The store failure behind this error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            SessionError::LoadFailed { source, .. }
            | SessionError::SaveFailed { source, .. }
            | SessionError::DeleteFailed { source, .. }
            | SessionError::MoveFailed { source, .. }
            | SessionError::CreateFailed { source, .. } => Some(source),
            SessionError::NoSuchTab { .. } => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Result alias for store requests.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_path() {
        let err = SessionError::SaveFailed {
            path: "alpha/lib.rs".into(),
            source: StoreError::Transport("connection refused".into()),
        };
        assert_eq!(
            err.to_string(),
            "failed to save 'alpha/lib.rs': transport error: connection refused"
        );
        assert_eq!(
            err.store_error(),
            Some(&StoreError::Transport("connection refused".into()))
        );
    }

    #[test]
    fn no_such_tab_has_no_store_source() {
        let err = SessionError::NoSuchTab { index: 3, count: 1 };
        assert!(err.store_error().is_none());
        assert_eq!(err.to_string(), "no tab at index 3 (1 open)");
    }
}
