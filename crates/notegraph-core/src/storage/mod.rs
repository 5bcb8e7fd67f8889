//! Storage layer
//!
//! Persists the persisted store between runs.
//!
//! ## Architecture
//!
//! - **Snapshot**: CBOR record of every persisted note and link
//! - **Snapshot task**: background writer that saves a new snapshot when
//!   the persisted store changed, and once more on shutdown
//!
//! The snapshot is an optimization only: losing it costs a full rescan of
//! the workspace, never data.

pub mod error;
pub mod snapshot;
pub mod task;

pub use error::{StorageError, StorageResult};
pub use snapshot::{NoteRecord, Snapshot, SnapshotFile, SNAPSHOT_VERSION};
pub use task::{
    spawn_snapshot_task, SnapshotCommand, SnapshotStatus, SnapshotTaskHandle,
    DEFAULT_SNAPSHOT_INTERVAL,
};
