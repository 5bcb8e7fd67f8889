//! Overlay cache
//!
//! Two stores sit behind one lock:
//!
//! - **persisted**: the last saved state of every file on disk
//! - **transient**: unsaved editor state for notes open in an editor
//!
//! Reads overlay the transient store on top of the persisted one: a real
//! transient entry shadows the persisted note's outgoing links, while
//! back-links are merged from both sides. Every mutation runs through the
//! reconciliation engine and publishes the resulting changes, tagged with
//! the layer they happened in, before the lock is released.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{GraphError, GraphResult};
use crate::events::{Change, Event, EventBus, Layer, Subscription};
use crate::models::{Link, Metadata, NotePath};
use crate::reconcile::{apply_delete, apply_update, NoteUpdate, ReconcileOptions};
use crate::storage::{Snapshot, SnapshotFile};
use crate::store::{NoteInfo, Store};

/// Default per-subscriber event buffer
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Tuning knobs for a `NoteCache`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Live events buffered per subscriber before writers block
    pub subscriber_buffer: usize,
    /// Report placeholder swaps as a single `RenameNote`
    pub coalesce_renames: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            coalesce_renames: false,
        }
    }
}

impl From<&Config> for CacheOptions {
    fn from(config: &Config) -> Self {
        Self {
            subscriber_buffer: config.subscriber_buffer,
            coalesce_renames: config.coalesce_renames,
        }
    }
}

/// Counters describing the cache contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub persisted_notes: usize,
    pub persisted_placeholders: usize,
    pub persisted_links: usize,
    pub transient_notes: usize,
    pub transient_placeholders: usize,
    pub transient_links: usize,
    pub subscribers: usize,
    pub revision: u64,
}

struct CacheState {
    persisted: Store,
    transient: Store,
    bus: EventBus,
    /// Bumped on every persisted mutation; drives snapshot writes
    revision: u64,
}

impl CacheState {
    fn store_mut(&mut self, layer: Layer) -> &mut Store {
        match layer {
            Layer::Persisted => &mut self.persisted,
            Layer::Transient => &mut self.transient,
        }
    }

    async fn publish(&mut self, layer: Layer, changes: Vec<Change>) {
        if changes.is_empty() {
            return;
        }
        let events: Vec<Event> = changes
            .into_iter()
            .map(|change| Event::new(layer, change))
            .collect();
        self.bus.publish(&events).await;
    }

    /// Whether `path` shows up through the overlay
    fn is_visible(&self, path: &NotePath) -> bool {
        if self.transient.contains(path) || self.persisted.is_real(path) {
            return true;
        }
        self.persisted
            .back_sources(path)
            .iter()
            .any(|source| !self.transient.is_real(source))
    }

    fn forward_links(&self, path: &NotePath) -> Vec<Link> {
        if self.transient.is_real(path) {
            self.transient.forward_links(path)
        } else {
            self.persisted.forward_links(path)
        }
    }

    fn back_links(&self, path: &NotePath) -> Vec<Link> {
        let mut links = self.transient.back_links(path);
        links.extend(
            self.persisted
                .back_links(path)
                .into_iter()
                .filter(|link| !self.transient.is_real(&link.source)),
        );
        links.sort_by(|a, b| a.source.cmp(&b.source));
        links
    }

    /// Transient entry carries exactly what the persisted store holds
    fn shadow_matches(&self, path: &NotePath) -> bool {
        let (Some(shadow), Some(saved)) = (self.transient.get(path), self.persisted.get(path))
        else {
            return false;
        };
        !shadow.placeholder
            && shadow.metadata == saved.metadata
            && self.transient.forward_links(path) == self.persisted.forward_links(path)
    }

    fn replay(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for (layer, store) in [
            (Layer::Persisted, &self.persisted),
            (Layer::Transient, &self.transient),
        ] {
            events.extend(
                store
                    .notes()
                    .map(|note| Event::new(layer, Change::create_note(&note.path, note.placeholder))),
            );
            events.extend(
                store
                    .links()
                    .map(|link| Event::new(layer, Change::create_link(&link.source, &link.target))),
            );
        }
        events
    }
}

/// Shared overlay of persisted and transient note graphs
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct NoteCache {
    state: Arc<RwLock<CacheState>>,
    options: CacheOptions,
}

impl NoteCache {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState {
                persisted: Store::new(),
                transient: Store::new(),
                bus: EventBus::new(options.subscriber_buffer),
                revision: 0,
            })),
            options,
        }
    }

    /// Create a cache seeded from the snapshot on disk
    ///
    /// A missing, unreadable or invalid snapshot is not fatal: it is
    /// logged and the cache starts empty, to be filled by a full scan.
    pub async fn open(options: CacheOptions, file: &SnapshotFile) -> Self {
        let cache = Self::new(options);
        match file.load() {
            Ok(Some(snapshot)) => {
                if let Err(e) = cache.restore(snapshot).await {
                    warn!(path = %file.path().display(), error = %e, "snapshot rejected, starting empty");
                }
            }
            Ok(None) => debug!(path = %file.path().display(), "starting without snapshot"),
            Err(e) => {
                warn!(path = %file.path().display(), error = %e, "failed to load snapshot, starting empty")
            }
        }
        cache
    }

    fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            coalesce_renames: self.options.coalesce_renames,
        }
    }

    // ==================== Mutations ====================

    /// Record unsaved editor content for a note
    pub async fn edit_note(
        &self,
        path: impl Into<NotePath>,
        links: Vec<Link>,
        metadata: Metadata,
    ) -> GraphResult<()> {
        let update = NoteUpdate::new(path, links).with_metadata(metadata);
        self.apply(Layer::Transient, update).await
    }

    /// Record content saved to disk at `saved_at`
    ///
    /// Drops the transient shadow once it holds the same links and
    /// metadata as what was saved.
    pub async fn save_note(
        &self,
        path: impl Into<NotePath>,
        links: Vec<Link>,
        metadata: Metadata,
        saved_at: DateTime<Utc>,
    ) -> GraphResult<()> {
        let path = path.into();
        let update = NoteUpdate::new(path.clone(), links)
            .with_metadata(metadata)
            .saved_at(saved_at);

        let mut state = self.state.write().await;
        let changes = apply_update(&mut state.persisted, update, self.reconcile_options())?;
        state.revision += 1;
        state.publish(Layer::Persisted, changes).await;

        if state.shadow_matches(&path) {
            let changes = apply_delete(&mut state.transient, &path, self.reconcile_options())?;
            debug!(path = %path, "transient shadow dropped after save");
            state.publish(Layer::Transient, changes).await;
        }
        Ok(())
    }

    /// Throw away unsaved editor content for a note
    ///
    /// A no-op when the note has no transient content.
    pub async fn discard_note(&self, path: impl Into<NotePath>) -> GraphResult<()> {
        let path = path.into();
        let mut state = self.state.write().await;
        if !state.transient.is_real(&path) {
            return Ok(());
        }
        let changes = apply_delete(&mut state.transient, &path, self.reconcile_options())?;
        state.publish(Layer::Transient, changes).await;
        Ok(())
    }

    /// Record that a file was removed from disk
    ///
    /// Fails with `NoteNotFound` when the persisted store does not know the
    /// path. Transient content for the path is left alone.
    pub async fn delete_note(&self, path: impl Into<NotePath>) -> GraphResult<()> {
        let path = path.into();
        let mut state = self.state.write().await;
        let changes = apply_delete(&mut state.persisted, &path, self.reconcile_options())?;
        if !changes.is_empty() {
            state.revision += 1;
        }
        state.publish(Layer::Persisted, changes).await;
        Ok(())
    }

    async fn apply(&self, layer: Layer, update: NoteUpdate) -> GraphResult<()> {
        let mut state = self.state.write().await;
        let changes = apply_update(state.store_mut(layer), update, self.reconcile_options())?;
        if layer == Layer::Persisted {
            state.revision += 1;
        }
        state.publish(layer, changes).await;
        Ok(())
    }

    // ==================== Queries ====================

    /// Outgoing links, from the transient entry when there is one
    pub async fn forward_links(&self, path: impl Into<NotePath>) -> GraphResult<Vec<Link>> {
        let path = path.into();
        let state = self.state.read().await;
        if !state.is_visible(&path) {
            return Err(GraphError::NoteNotFound(path));
        }
        Ok(state.forward_links(&path))
    }

    /// Incoming links, merged across both stores
    ///
    /// A persisted back-link is hidden when its source has transient
    /// content: the transient links of that source are authoritative.
    pub async fn back_links(&self, path: impl Into<NotePath>) -> GraphResult<Vec<Link>> {
        let path = path.into();
        let state = self.state.read().await;
        if !state.is_visible(&path) {
            return Err(GraphError::NoteNotFound(path));
        }
        Ok(state.back_links(&path))
    }

    /// Every path visible through the overlay, in order
    pub async fn paths(&self) -> Vec<NotePath> {
        let state = self.state.read().await;
        let mut paths: BTreeSet<NotePath> = state.transient.paths().into_iter().collect();
        paths.extend(
            state
                .persisted
                .paths()
                .into_iter()
                .filter(|path| state.is_visible(path)),
        );
        paths.into_iter().collect()
    }

    /// The note as seen through the overlay, with merged link counts
    pub async fn info(&self, path: impl Into<NotePath>) -> GraphResult<NoteInfo> {
        let path = path.into();
        let state = self.state.read().await;
        if !state.is_visible(&path) {
            return Err(GraphError::NoteNotFound(path));
        }

        let base = if state.transient.is_real(&path) {
            state.transient.info(&path)
        } else {
            state
                .persisted
                .info(&path)
                .or_else(|| state.transient.info(&path))
        };
        let mut info = base.ok_or_else(|| GraphError::NoteNotFound(path.clone()))?;
        info.forward_count = state.forward_links(&path).len();
        info.back_count = state.back_links(&path).len();
        if state.transient.is_real(&path) {
            info.saved_at = state.persisted.saved_at(&path);
        }
        Ok(info)
    }

    /// Whether a scanner can skip re-parsing a file modified at `modified`
    pub async fn should_skip(&self, path: impl Into<NotePath>, modified: DateTime<Utc>) -> bool {
        let path = path.into();
        let state = self.state.read().await;
        state.persisted.is_real(&path)
            && state
                .persisted
                .saved_at(&path)
                .is_some_and(|saved_at| saved_at >= modified)
    }

    /// When the persisted note was last saved
    pub async fn saved_at(&self, path: impl Into<NotePath>) -> Option<DateTime<Utc>> {
        let path = path.into();
        self.state.read().await.persisted.saved_at(&path)
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            persisted_notes: state.persisted.note_count() - state.persisted.placeholder_count(),
            persisted_placeholders: state.persisted.placeholder_count(),
            persisted_links: state.persisted.link_count(),
            transient_notes: state.transient.note_count() - state.transient.placeholder_count(),
            transient_placeholders: state.transient.placeholder_count(),
            transient_links: state.transient.link_count(),
            subscribers: state.bus.subscriber_count(),
            revision: state.revision,
        }
    }

    /// Persisted revision counter
    pub async fn revision(&self) -> u64 {
        self.state.read().await.revision
    }

    // ==================== Subscriptions ====================

    /// Subscribe to graph changes
    ///
    /// The subscription first yields the current topology: a `CreateNote`
    /// per note and then a `CreateLink` per link, persisted store first.
    /// Live events follow without gaps. Cancelling `token` (or dropping
    /// the subscription) ends it and unregisters it from the cache.
    pub async fn subscribe(&self, token: CancellationToken) -> Subscription {
        let subscription = {
            let mut state = self.state.write().await;
            let replay = state.replay();
            state.bus.subscribe(token, replay)
        };

        let id = subscription.id();
        let cancelled = subscription.token().clone();
        let state = Arc::downgrade(&self.state);
        tokio::spawn(async move {
            cancelled.cancelled().await;
            if let Some(state) = state.upgrade() {
                if state.write().await.bus.unsubscribe(id) {
                    debug!(subscriber = id, "subscriber cancelled");
                }
            }
        });

        subscription
    }

    // ==================== Snapshots ====================

    /// Serialize the persisted store
    pub async fn dump(&self) -> Snapshot {
        let state = self.state.read().await;
        Snapshot::capture(&state.persisted, state.revision)
    }

    /// Replace both stores with the contents of a snapshot
    ///
    /// The transient store is emptied and the persisted store rebuilt
    /// through the engine, so subscribers see every change. An invalid
    /// snapshot is rejected before anything is touched.
    pub async fn restore(&self, snapshot: Snapshot) -> GraphResult<()> {
        snapshot.validate()?;
        let options = self.reconcile_options();
        let mut state = self.state.write().await;

        let mut transient_changes = Vec::new();
        for path in real_paths(&state.transient) {
            transient_changes.extend(apply_delete(&mut state.transient, &path, options)?);
        }

        let mut persisted_changes = Vec::new();
        for path in real_paths(&state.persisted) {
            persisted_changes.extend(apply_delete(&mut state.persisted, &path, options)?);
        }

        let mut restored = 0;
        for update in snapshot.into_updates() {
            persisted_changes.extend(apply_update(&mut state.persisted, update, options)?);
            restored += 1;
        }
        state.revision += 1;

        info!(
            notes = restored,
            links = state.persisted.link_count(),
            "snapshot restored"
        );
        state.publish(Layer::Transient, transient_changes).await;
        state.publish(Layer::Persisted, persisted_changes).await;
        Ok(())
    }

    #[cfg(test)]
    async fn check_invariants(&self) {
        let state = self.state.read().await;
        state.persisted.check_invariants().unwrap();
        state.transient.check_invariants().unwrap();
    }
}

fn real_paths(store: &Store) -> Vec<NotePath> {
    store
        .notes()
        .filter(|note| !note.placeholder)
        .map(|note| note.path.clone())
        .collect()
}
