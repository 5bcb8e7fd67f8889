//! Command handlers

pub mod config;
pub mod events;
pub mod links;
pub mod notes;
pub mod record;
pub mod status;

use notegraph_core::storage::{spawn_snapshot_task, SnapshotTaskHandle};
use notegraph_core::{Config, NoteCache, SnapshotFile};

/// Build a cache from the snapshot in the configured data directory
async fn open_cache(config: &Config) -> NoteCache {
    NoteCache::open(config.cache_options(), &SnapshotFile::from_config(config)).await
}

/// Build a cache and start the snapshot task that writes it back
async fn open_with_writer(config: &Config) -> (NoteCache, SnapshotTaskHandle) {
    let file = SnapshotFile::from_config(config);
    let cache = NoteCache::open(config.cache_options(), &file).await;
    let writer = spawn_snapshot_task(cache.clone(), file, config.snapshot_interval()).await;
    (cache, writer)
}
