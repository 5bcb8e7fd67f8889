//! Background snapshot writer
//!
//! Periodically writes the persisted store to disk when its revision has
//! moved since the last write, and flushes one last time on shutdown.
//! The dump is taken under the cache's read lock; encoding and disk I/O
//! happen after the lock is released, on the blocking pool.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::error::{StorageError, StorageResult};
use super::snapshot::SnapshotFile;
use crate::cache::NoteCache;

/// Default time between snapshot checks
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

/// Commands sent to the snapshot task
#[derive(Debug)]
pub enum SnapshotCommand {
    /// Write now if anything changed; replies whether a file was written
    Flush(oneshot::Sender<StorageResult<bool>>),
    /// Write pending changes and stop
    Shutdown,
}

/// Last known state of the snapshot task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotStatus {
    /// Revision of the last snapshot written (or loaded at startup)
    pub revision: u64,
    pub last_written: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Handle to control the snapshot task
pub struct SnapshotTaskHandle {
    /// Send commands to the snapshot task
    pub command_tx: mpsc::Sender<SnapshotCommand>,
    /// Watch the task status
    pub status_rx: watch::Receiver<SnapshotStatus>,
    join: JoinHandle<()>,
}

impl SnapshotTaskHandle {
    /// Write pending changes now
    ///
    /// Returns whether a snapshot was written; `false` when nothing changed
    /// since the last write or the task is gone.
    pub async fn flush(&self) -> StorageResult<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(SnapshotCommand::Flush(reply_tx))
            .await
            .is_err()
        {
            return Ok(false);
        }
        reply_rx.await.unwrap_or(Ok(false))
    }

    /// Flush and stop the task, waiting for it to finish
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(SnapshotCommand::Shutdown).await;
        if let Err(e) = self.join.await {
            warn!(error = %e, "snapshot task panicked");
        }
    }

    pub fn status(&self) -> SnapshotStatus {
        self.status_rx.borrow().clone()
    }
}

/// Spawn the snapshot task
///
/// `interval` is the time between change checks; a zero interval is
/// raised to one second.
pub async fn spawn_snapshot_task(
    cache: NoteCache,
    file: SnapshotFile,
    interval: Duration,
) -> SnapshotTaskHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let initial = SnapshotStatus {
        revision: cache.revision().await,
        ..SnapshotStatus::default()
    };
    let (status_tx, status_rx) = watch::channel(initial);

    let interval = interval.max(Duration::from_secs(1));
    let join = tokio::spawn(snapshot_task_loop(
        cache, file, interval, command_rx, status_tx,
    ));

    SnapshotTaskHandle {
        command_tx,
        status_rx,
        join,
    }
}

async fn snapshot_task_loop(
    cache: NoteCache,
    file: SnapshotFile,
    interval: Duration,
    mut command_rx: mpsc::Receiver<SnapshotCommand>,
    status_tx: watch::Sender<SnapshotStatus>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = write_if_changed(&cache, &file, &status_tx).await;
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(SnapshotCommand::Flush(reply)) => {
                        let result = write_if_changed(&cache, &file, &status_tx).await;
                        let _ = reply.send(result);
                    }
                    Some(SnapshotCommand::Shutdown) | None => {
                        let _ = write_if_changed(&cache, &file, &status_tx).await;
                        debug!("snapshot task stopped");
                        break;
                    }
                }
            }
        }
    }
}

async fn write_if_changed(
    cache: &NoteCache,
    file: &SnapshotFile,
    status_tx: &watch::Sender<SnapshotStatus>,
) -> StorageResult<bool> {
    let written = status_tx.borrow().revision;
    if cache.revision().await == written {
        return Ok(false);
    }

    let snapshot = cache.dump().await;
    let revision = snapshot.revision;
    let target = file.clone();
    let result = tokio::task::spawn_blocking(move || target.save(&snapshot))
        .await
        .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
        .and_then(|r| r);

    match &result {
        Ok(()) => {
            status_tx.send_modify(|status| {
                status.revision = revision;
                status.last_written = Some(Utc::now());
                status.last_error = None;
            });
        }
        Err(e) => {
            warn!(path = %file.path().display(), error = %e, "snapshot write failed");
            status_tx.send_modify(|status| status.last_error = Some(e.to_string()));
        }
    }
    result.map(|()| true)
}
