//! Single consistent note graph
//!
//! A `Store` holds one graph: the notes, the forward index (source →
//! target → link) and the back index (target → source → link). The cache
//! keeps two of them, one for the persisted view and one for the
//! transient editor view.
//!
//! The store has no locking of its own; its owner serializes access.
//! It also never emits events or collects placeholders by itself, that
//! is the reconciliation engine's job (see `reconcile`).
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::new();
//! store.insert_placeholder(&"b.md".into());
//! store.upsert(Note::new("a.md"), vec![Link::new("a.md", "b.md")])?;
//!
//! assert_eq!(store.back_links(&"b.md".into()).len(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::error::{GraphError, GraphResult};
use crate::models::{collapse_links, Link, Note, NotePath};

type LinkIndex = BTreeMap<NotePath, BTreeMap<NotePath, Link>>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    note: Note,
    saved_at: Option<DateTime<Utc>>,
}

/// Summary of one note as seen by a single store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteInfo {
    pub note: Note,
    /// When the note content was last saved to disk (persisted side only)
    pub saved_at: Option<DateTime<Utc>>,
    pub forward_count: usize,
    pub back_count: usize,
}

/// One consistent graph of notes and links
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Store {
    notes: BTreeMap<NotePath, Entry>,
    forward: LinkIndex,
    back: LinkIndex,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Mutations ====================

    /// Insert or replace a note together with its full outgoing link set
    ///
    /// Every link must originate from `note.path` and point at a note that
    /// already exists (or at the note itself). Links to the same target are
    /// collapsed. Nothing is modified when validation fails.
    pub fn upsert(&mut self, note: Note, links: Vec<Link>) -> GraphResult<()> {
        let path = note.path.clone();

        for link in &links {
            if link.source != path {
                return Err(GraphError::InvalidLink {
                    note: path,
                    source_path: link.source.clone(),
                });
            }
        }

        let links = collapse_links(links);
        for link in links.values() {
            if !link.is_self_link() && !self.notes.contains_key(&link.target) {
                return Err(GraphError::UnknownTarget {
                    source_path: path,
                    target: link.target.clone(),
                });
            }
        }

        self.unlink_outgoing(&path);
        for (target, link) in &links {
            self.back
                .entry(target.clone())
                .or_default()
                .insert(path.clone(), link.clone());
        }
        if !links.is_empty() {
            self.forward.insert(path.clone(), links);
        }

        let saved_at = if note.placeholder {
            None
        } else {
            self.notes.get(&path).and_then(|e| e.saved_at)
        };
        self.notes.insert(path, Entry { note, saved_at });
        Ok(())
    }

    /// Create a placeholder for `path` if nothing is stored there yet
    ///
    /// Returns true when a placeholder was created.
    pub fn insert_placeholder(&mut self, path: &NotePath) -> bool {
        if self.notes.contains_key(path) {
            return false;
        }
        self.notes.insert(
            path.clone(),
            Entry {
                note: Note::placeholder(path.clone()),
                saved_at: None,
            },
        );
        true
    }

    /// Remove a note and its outgoing links
    ///
    /// Fails when the path is unknown or when other notes still link to
    /// it (a self link does not count). Returns the removed note. Targets
    /// left without back-links are not collected here.
    pub fn delete(&mut self, path: &NotePath) -> GraphResult<Note> {
        if !self.notes.contains_key(path) {
            return Err(GraphError::NoteNotFound(path.clone()));
        }

        let count = self.foreign_back_count(path);
        if count > 0 {
            return Err(GraphError::HasBackLinks {
                path: path.clone(),
                count,
            });
        }

        self.unlink_outgoing(path);
        self.back.remove(path);
        let entry = self
            .notes
            .remove(path)
            .ok_or_else(|| GraphError::NoteNotFound(path.clone()))?;
        Ok(entry.note)
    }

    /// Remove `path` if it is a placeholder nobody links to any more
    pub fn remove_orphan(&mut self, path: &NotePath) -> Option<Note> {
        let orphaned = self
            .notes
            .get(path)
            .is_some_and(|e| e.note.placeholder && !self.back.contains_key(path));
        if !orphaned {
            return None;
        }
        self.forward.remove(path);
        self.notes.remove(path).map(|e| e.note)
    }

    /// Record when the note was last saved to disk
    pub fn set_saved_at(&mut self, path: &NotePath, saved_at: Option<DateTime<Utc>>) {
        if let Some(entry) = self.notes.get_mut(path) {
            entry.saved_at = saved_at;
        }
    }

    fn unlink_outgoing(&mut self, path: &NotePath) {
        let Some(old) = self.forward.remove(path) else {
            return;
        };
        for target in old.keys() {
            if let Some(sources) = self.back.get_mut(target) {
                sources.remove(path);
                if sources.is_empty() {
                    self.back.remove(target);
                }
            }
        }
    }

    // ==================== Queries ====================

    /// All stored paths, in order
    pub fn paths(&self) -> Vec<NotePath> {
        self.notes.keys().cloned().collect()
    }

    pub fn contains(&self, path: &NotePath) -> bool {
        self.notes.contains_key(path)
    }

    pub fn get(&self, path: &NotePath) -> Option<&Note> {
        self.notes.get(path).map(|e| &e.note)
    }

    /// True when `path` is stored with real content
    pub fn is_real(&self, path: &NotePath) -> bool {
        self.get(path).is_some_and(|n| !n.placeholder)
    }

    pub fn info(&self, path: &NotePath) -> Option<NoteInfo> {
        self.notes.get(path).map(|e| NoteInfo {
            note: e.note.clone(),
            saved_at: e.saved_at,
            forward_count: self.forward.get(path).map_or(0, |m| m.len()),
            back_count: self.back.get(path).map_or(0, |m| m.len()),
        })
    }

    pub fn saved_at(&self, path: &NotePath) -> Option<DateTime<Utc>> {
        self.notes.get(path).and_then(|e| e.saved_at)
    }

    /// Outgoing links of `path`, ordered by target
    pub fn forward_links(&self, path: &NotePath) -> Vec<Link> {
        self.forward
            .get(path)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Incoming links of `path`, ordered by source
    pub fn back_links(&self, path: &NotePath) -> Vec<Link> {
        self.back
            .get(path)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Targets of the outgoing links of `path`
    pub fn forward_targets(&self, path: &NotePath) -> BTreeSet<NotePath> {
        self.forward
            .get(path)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Outgoing link of `path` towards `target`, if any
    pub fn link(&self, source: &NotePath, target: &NotePath) -> Option<&Link> {
        self.forward.get(source).and_then(|m| m.get(target))
    }

    pub fn back_count(&self, path: &NotePath) -> usize {
        self.back.get(path).map_or(0, |m| m.len())
    }

    /// Back-links of `path` that do not come from `path` itself
    pub fn foreign_back_count(&self, path: &NotePath) -> usize {
        self.back
            .get(path)
            .map_or(0, |m| m.keys().filter(|source| *source != path).count())
    }

    /// Sources linking to `path`
    pub fn back_sources(&self, path: &NotePath) -> Vec<NotePath> {
        self.back
            .get(path)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every note, in path order
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.values().map(|e| &e.note)
    }

    /// Every link, ordered by source then target
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.forward.values().flat_map(|m| m.values())
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn placeholder_count(&self) -> usize {
        self.notes.values().filter(|e| e.note.placeholder).count()
    }

    pub fn link_count(&self) -> usize {
        self.forward.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Verify the structural invariants of the graph
    ///
    /// - forward and back indexes mirror each other exactly
    /// - every link endpoint is a stored note
    /// - no placeholder is left without back-links or with outgoing links
    pub fn check_invariants(&self) -> Result<(), String> {
        for (source, targets) in &self.forward {
            if !self.notes.contains_key(source) {
                return Err(format!("forward index has unknown source {}", source));
            }
            if targets.is_empty() {
                return Err(format!("empty forward entry for {}", source));
            }
            for (target, link) in targets {
                if link.source != *source || link.target != *target {
                    return Err(format!("misfiled link {} -> {}", link.source, link.target));
                }
                if !self.notes.contains_key(target) {
                    return Err(format!("link {} -> {} has unknown target", source, target));
                }
                match self.back.get(target).and_then(|m| m.get(source)) {
                    Some(back) if back == link => {}
                    _ => return Err(format!("back index out of sync for {} -> {}", source, target)),
                }
            }
        }

        for (target, sources) in &self.back {
            if sources.is_empty() {
                return Err(format!("empty back entry for {}", target));
            }
            for source in sources.keys() {
                if self.link(source, target).is_none() {
                    return Err(format!("dangling back link {} -> {}", source, target));
                }
            }
        }

        for (path, entry) in &self.notes {
            if entry.note.path != *path {
                return Err(format!("note filed under wrong path {}", path));
            }
            if entry.note.placeholder {
                if self.foreign_back_count(path) == 0 {
                    return Err(format!("orphan placeholder {}", path));
                }
                if self.forward.contains_key(path) {
                    return Err(format!("placeholder {} has outgoing links", path));
                }
            }
        }

        Ok(())
    }
}
