//! Snapshot codec and file persistence
//!
//! A snapshot is the persisted store serialized as a self-describing CBOR
//! record. Loading one at startup lets the scanner skip every file whose
//! modification time has not moved since it was last saved.
//!
//! Writes are atomic (temp file, fsync, rename) so a crash never leaves a
//! half-written snapshot behind.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{StorageError, StorageResult};
use crate::config::Config;
use crate::error::{GraphError, GraphResult};
use crate::models::{Link, Metadata, NotePath};
use crate::reconcile::NoteUpdate;
use crate::store::Store;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// One note of the persisted store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub path: NotePath,
    pub placeholder: bool,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Serialized form of the persisted store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Persisted revision the snapshot was taken at
    #[serde(default)]
    pub revision: u64,
    pub notes: Vec<NoteRecord>,
    pub links: Vec<Link>,
}

impl Snapshot {
    /// An empty snapshot
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            revision: 0,
            notes: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Capture the contents of a store
    pub fn capture(store: &Store, revision: u64) -> Self {
        let notes = store
            .notes()
            .map(|note| NoteRecord {
                path: note.path.clone(),
                placeholder: note.placeholder,
                metadata: note.metadata.clone(),
                saved_at: store.saved_at(&note.path),
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            revision,
            notes,
            links: store.links().cloned().collect(),
        }
    }

    /// Encode as CBOR
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Decode from CBOR, rejecting unknown format versions
    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let snapshot: Snapshot =
            ciborium::from_reader(bytes).map_err(|e| StorageError::InvalidFormat {
                details: e.to_string(),
            })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Check that every note is listed once and every link starts at a
    /// real note of the snapshot
    pub fn validate(&self) -> GraphResult<()> {
        let mut seen: BTreeSet<&NotePath> = BTreeSet::new();
        for note in &self.notes {
            if !seen.insert(&note.path) {
                return Err(GraphError::DuplicateNote(note.path.clone()));
            }
        }

        let real: BTreeSet<&NotePath> = self
            .notes
            .iter()
            .filter(|n| !n.placeholder)
            .map(|n| &n.path)
            .collect();

        for link in &self.links {
            if !real.contains(&link.source) {
                return Err(GraphError::NoteNotFound(link.source.clone()));
            }
        }
        Ok(())
    }

    /// One update per real note, carrying its outgoing links
    ///
    /// Placeholders are not listed: replaying the updates recreates the
    /// ones that are still referenced.
    pub fn into_updates(self) -> Vec<NoteUpdate> {
        let mut by_source: BTreeMap<NotePath, Vec<Link>> = BTreeMap::new();
        for link in self.links {
            by_source.entry(link.source.clone()).or_default().push(link);
        }

        self.notes
            .into_iter()
            .filter(|n| !n.placeholder)
            .map(|record| {
                let links = by_source.remove(&record.path).unwrap_or_default();
                NoteUpdate {
                    path: record.path,
                    links,
                    metadata: record.metadata,
                    saved_at: record.saved_at,
                }
            })
            .collect()
    }

    pub fn note_count(&self) -> usize {
        self.notes.iter().filter(|n| !n.placeholder).count()
    }

    pub fn placeholder_count(&self) -> usize {
        self.notes.iter().filter(|n| n.placeholder).count()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

/// Location of the snapshot on disk
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file inside the configured data directory
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.snapshot_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a snapshot exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Size of the snapshot file in bytes
    pub fn size(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }

    /// Write a snapshot atomically
    pub fn save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let bytes = snapshot.encode()?;
        atomic_write(&self.path, &bytes)?;
        info!(
            path = %self.path.display(),
            notes = snapshot.notes.len(),
            links = snapshot.links.len(),
            bytes = bytes.len(),
            "snapshot written"
        );
        Ok(())
    }

    /// Read and decode the snapshot without touching the file
    ///
    /// Returns `None` if the file doesn't exist.
    pub fn read(&self) -> StorageResult<Option<Snapshot>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no snapshot on disk");
            return Ok(None);
        }

        let bytes =
            fs::read(&self.path).map_err(|e| StorageError::from_read_io(e, self.path.clone()))?;
        Snapshot::decode(&bytes).map(Some)
    }

    /// Load the snapshot
    ///
    /// Like [`read`](Self::read), except that a file that cannot be decoded
    /// is moved aside to `<name>.corrupt` and reported as `CorruptSnapshot`,
    /// so the next save starts from a clean slate.
    pub fn load(&self) -> StorageResult<Option<Snapshot>> {
        match self.read() {
            Err(StorageError::InvalidFormat { details }) => {
                let backup_path = self.backup_path();
                if let Err(e) = fs::rename(&self.path, &backup_path) {
                    warn!(error = %e, "failed to move corrupt snapshot aside");
                }
                Err(StorageError::CorruptSnapshot {
                    path: self.path.clone(),
                    backup_path,
                    details,
                })
            }
            other => other,
        }
    }

    /// Remove the snapshot file if present
    pub fn delete(&self) -> StorageResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| StorageError::from_io(e, self.path.clone()))?;
        }
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        PathBuf::from(name)
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}
