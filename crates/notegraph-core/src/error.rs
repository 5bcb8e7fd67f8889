//! Graph error handling
//!
//! Errors raised by the store and the reconciliation engine. Every one of
//! them is reported before any mutation happens, so a failed call leaves
//! the graph untouched.

use thiserror::Error;

use crate::models::NotePath;

/// Errors that can occur while updating or querying the note graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A supplied link does not originate from the note being updated
    #[error("Invalid link: note '{note}' was given a link whose source is '{source_path}'")]
    InvalidLink {
        note: NotePath,
        source_path: NotePath,
    },

    /// Query or delete on a path the graph does not know
    #[error("Note not found: '{0}'")]
    NoteNotFound(NotePath),

    /// Hard delete refused because other notes still reference the path
    #[error("Note '{path}' still has {count} back-link(s)")]
    HasBackLinks { path: NotePath, count: usize },

    /// A snapshot lists the same note more than once
    #[error("Note '{0}' appears more than once")]
    DuplicateNote(NotePath),

    /// Strict upsert refused a link to a note that is not in the store
    #[error("Link from '{source_path}' targets unknown note '{target}'")]
    UnknownTarget {
        source_path: NotePath,
        target: NotePath,
    },
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;
