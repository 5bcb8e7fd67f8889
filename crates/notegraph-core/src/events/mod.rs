//! Graph change events
//!
//! Every mutation of either store is described by a small set of typed
//! events. Subscribers (typically a graph visualization) replay them to
//! mirror the graph topology without ever asking for a full redraw.
//!
//! Link events only carry the (source, target) pair: subscribers track
//! topology, not text positions.

mod bus;

pub use bus::{EventBus, SubscriberId, Subscription};

use serde::{Deserialize, Serialize};

use crate::models::NotePath;

/// Which store an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Last saved state on disk
    Persisted,
    /// Current, unsaved editor state
    Transient,
}

/// Discriminant of a `Change`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    CreateNote,
    UpdateNote,
    DeleteNote,
    CreateLink,
    DeleteLink,
    RenameNote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub path: NotePath,
    pub placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEvent {
    pub source: NotePath,
    pub target: NotePath,
}

/// A placeholder whose identity moved to a new path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEvent {
    pub from: NotePath,
    pub to: NotePath,
}

/// A single topology change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Change {
    CreateNote(NoteEvent),
    UpdateNote(NoteEvent),
    DeleteNote(NoteEvent),
    CreateLink(LinkEvent),
    DeleteLink(LinkEvent),
    RenameNote(RenameEvent),
}

impl Change {
    pub fn create_note(path: &NotePath, placeholder: bool) -> Self {
        Change::CreateNote(NoteEvent {
            path: path.clone(),
            placeholder,
        })
    }

    pub fn update_note(path: &NotePath, placeholder: bool) -> Self {
        Change::UpdateNote(NoteEvent {
            path: path.clone(),
            placeholder,
        })
    }

    pub fn delete_note(path: &NotePath, placeholder: bool) -> Self {
        Change::DeleteNote(NoteEvent {
            path: path.clone(),
            placeholder,
        })
    }

    pub fn create_link(source: &NotePath, target: &NotePath) -> Self {
        Change::CreateLink(LinkEvent {
            source: source.clone(),
            target: target.clone(),
        })
    }

    pub fn delete_link(source: &NotePath, target: &NotePath) -> Self {
        Change::DeleteLink(LinkEvent {
            source: source.clone(),
            target: target.clone(),
        })
    }

    pub fn rename_note(from: &NotePath, to: &NotePath) -> Self {
        Change::RenameNote(RenameEvent {
            from: from.clone(),
            to: to.clone(),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Change::CreateNote(_) => EventKind::CreateNote,
            Change::UpdateNote(_) => EventKind::UpdateNote,
            Change::DeleteNote(_) => EventKind::DeleteNote,
            Change::CreateLink(_) => EventKind::CreateLink,
            Change::DeleteLink(_) => EventKind::DeleteLink,
            Change::RenameNote(_) => EventKind::RenameNote,
        }
    }
}

/// A change tagged with the store it happened in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub layer: Layer,
    pub change: Change,
}

impl Event {
    pub fn new(layer: Layer, change: Change) -> Self {
        Self { layer, change }
    }

    pub fn kind(&self) -> EventKind {
        self.change.kind()
    }
}
