//! Diff & reconciliation engine
//!
//! The only code path that mutates a `Store`. Given a note's new outgoing
//! links it:
//!
//! 1. validates that every link originates from the note
//! 2. creates placeholders for targets the store does not know yet
//! 3. diffs the previous and new target sets
//! 4. replaces the note's edges in the store
//! 5. collects placeholders that lost their last back-link
//! 6. reports the minimal set of changes
//!
//! Deleting a note runs the same steps with an empty link set; the note
//! survives as a placeholder when other notes still link to it.
//!
//! Within one call changes come out in a fixed order: the note's own
//! creation, new placeholders, removed edges (and collected
//! placeholders), added edges, then the note's own update.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::events::Change;
use crate::models::{collapse_links, Link, Metadata, Note, NotePath};
use crate::store::Store;

/// New content for one note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteUpdate {
    pub path: NotePath,
    pub links: Vec<Link>,
    pub metadata: Metadata,
    /// Modification time of the saved file (persisted side only)
    pub saved_at: Option<DateTime<Utc>>,
}

impl NoteUpdate {
    pub fn new(path: impl Into<NotePath>, links: Vec<Link>) -> Self {
        Self {
            path: path.into(),
            links,
            metadata: Metadata::new(),
            saved_at: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn saved_at(mut self, saved_at: DateTime<Utc>) -> Self {
        self.saved_at = Some(saved_at);
        self
    }
}

/// Engine switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Report a placeholder swap as a single `RenameNote`
    ///
    /// Applies when an update drops exactly one placeholder target whose
    /// only back-link was this note and adds exactly one target that did
    /// not exist before. The store ends up in the same state either way;
    /// only the reported changes differ.
    pub coalesce_renames: bool,
}

/// Apply new content for a note
pub fn apply_update(
    store: &mut Store,
    update: NoteUpdate,
    options: ReconcileOptions,
) -> GraphResult<Vec<Change>> {
    reconcile(store, update, false, options)
}

/// Withdraw a note's content
///
/// Fails with `NoteNotFound` for unknown paths. Deleting a placeholder
/// changes nothing.
pub fn apply_delete(
    store: &mut Store,
    path: &NotePath,
    options: ReconcileOptions,
) -> GraphResult<Vec<Change>> {
    reconcile(store, NoteUpdate::new(path.clone(), Vec::new()), true, options)
}

fn reconcile(
    store: &mut Store,
    update: NoteUpdate,
    missing: bool,
    options: ReconcileOptions,
) -> GraphResult<Vec<Change>> {
    let NoteUpdate {
        path,
        links,
        metadata,
        saved_at,
    } = update;

    for link in &links {
        if link.source != path {
            return Err(GraphError::InvalidLink {
                note: path,
                source_path: link.source.clone(),
            });
        }
    }

    let previous = store.get(&path).cloned();
    if missing {
        match &previous {
            None => return Err(GraphError::NoteNotFound(path)),
            Some(note) if note.placeholder => return Ok(Vec::new()),
            Some(_) => {}
        }
    }

    let new_links = if missing {
        Default::default()
    } else {
        collapse_links(links)
    };
    let previous_targets = store.forward_targets(&path);
    let new_targets: BTreeSet<NotePath> = new_links.keys().cloned().collect();
    let removed: Vec<NotePath> = previous_targets.difference(&new_targets).cloned().collect();
    let added: Vec<NotePath> = new_targets.difference(&previous_targets).cloned().collect();

    let created: Vec<NotePath> = new_links
        .values()
        .filter(|link| !link.is_self_link())
        .filter(|link| store.insert_placeholder(&link.target))
        .map(|link| link.target.clone())
        .collect();

    let mut changes = Vec::new();

    if missing {
        let keep = store.foreign_back_count(&path) > 0;
        if keep {
            store.upsert(Note::placeholder(path.clone()), Vec::new())?;
        } else {
            store.delete(&path)?;
        }

        collect_removed(store, &path, &removed, &mut changes);
        if keep {
            changes.push(Change::update_note(&path, true));
        } else {
            changes.push(Change::delete_note(&path, false));
        }

        debug!(path = %path, removed = removed.len(), soft = keep, "deleted note");
        return Ok(changes);
    }

    let updated = previous
        .as_ref()
        .is_some_and(|prev| prev.placeholder || prev.metadata != metadata);

    let note = Note::new(path.clone()).with_metadata(metadata);
    if let Err(e) = store.upsert(note, new_links.into_values().collect()) {
        for placeholder in &created {
            store.remove_orphan(placeholder);
        }
        return Err(e);
    }
    if saved_at.is_some() {
        store.set_saved_at(&path, saved_at);
    }

    if previous.is_none() {
        changes.push(Change::create_note(&path, false));
    }

    let rename = if options.coalesce_renames {
        rename_candidate(store, &path, &removed, &added, &created)
    } else {
        None
    };

    match rename {
        Some((from, to)) => {
            store.remove_orphan(&from);
            changes.push(Change::rename_note(&from, &to));
        }
        None => {
            for placeholder in &created {
                changes.push(Change::create_note(placeholder, true));
            }
            collect_removed(store, &path, &removed, &mut changes);
            for target in &added {
                changes.push(Change::create_link(&path, target));
            }
        }
    }

    if updated {
        changes.push(Change::update_note(&path, false));
    }

    debug!(
        path = %path,
        added = added.len(),
        removed = removed.len(),
        placeholders = created.len(),
        "reconciled note"
    );
    Ok(changes)
}

/// Report removed edges and drop placeholders left without back-links
fn collect_removed(
    store: &mut Store,
    source: &NotePath,
    removed: &[NotePath],
    changes: &mut Vec<Change>,
) {
    for target in removed {
        changes.push(Change::delete_link(source, target));
        if target != source && store.remove_orphan(target).is_some() {
            changes.push(Change::delete_note(target, true));
        }
    }
}

fn rename_candidate(
    store: &Store,
    path: &NotePath,
    removed: &[NotePath],
    added: &[NotePath],
    created: &[NotePath],
) -> Option<(NotePath, NotePath)> {
    let ([from], [to], [fresh]) = (removed, added, created) else {
        return None;
    };
    if to != fresh || from == path {
        return None;
    }
    let orphaned = store.get(from).is_some_and(|n| n.placeholder) && store.back_count(from) == 0;
    orphaned.then(|| (from.clone(), to.clone()))
}
