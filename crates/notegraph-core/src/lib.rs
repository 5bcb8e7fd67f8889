//! notegraph core library
//!
//! An in-memory graph of notes and the links between them, kept in sync
//! with a workspace of text files and with any unsaved editor buffers.
//!
//! # Architecture
//!
//! - **Store**: one consistent graph with forward and back link indexes
//! - **Reconciliation engine**: the only way a store changes; turns a
//!   note's new outgoing links into the minimal set of graph changes
//! - **Overlay cache**: a persisted store (what is on disk) under a
//!   transient store (what is open in an editor), behind one lock
//! - **Events**: every change is published to subscribers, which start
//!   from a replay of the current graph
//! - **Snapshots**: the persisted store is saved to disk so a restart
//!   does not need a full rescan
//!
//! # Quick Start
//!
//! ```text
//! let cache = NoteCache::new(CacheOptions::default());
//!
//! // A file was saved with one reference to b.md
//! cache.save_note("a.md", vec![Link::new("a.md", "b.md")], Metadata::new(), mtime).await?;
//!
//! // b.md does not exist yet: it is a placeholder with one back-link
//! let back = cache.back_links("b.md").await?;
//! ```
//!
//! # Modules
//!
//! - `cache`: overlay cache (main entry point)
//! - `store`: single graph store
//! - `reconcile`: diff and reconciliation engine
//! - `events`: change events and subscriptions
//! - `models`: paths, notes, links and text ranges
//! - `storage`: snapshot codec, file and writer task
//! - `config`: application configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod reconcile;
pub mod storage;
pub mod store;

pub use cache::{CacheOptions, CacheStats, NoteCache};
pub use config::Config;
pub use error::{GraphError, GraphResult};
pub use events::{Change, Event, EventKind, Layer, Subscription};
pub use models::{Link, Metadata, Note, NotePath, Position, TextRange};
pub use reconcile::{NoteUpdate, ReconcileOptions};
pub use storage::{Snapshot, SnapshotFile, StorageError};
pub use store::{NoteInfo, Store};
