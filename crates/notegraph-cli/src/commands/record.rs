//! Record and forget command handlers
//!
//! Apply one change to the persisted graph and write the snapshot through
//! the snapshot task before exiting.

use anyhow::{Context, Result};
use chrono::Utc;

use notegraph_core::{Config, Link, Metadata, NotePath};

use crate::output::Output;

/// Record a saved note with the given outgoing links
pub async fn record(
    config: &Config,
    path: String,
    targets: Vec<String>,
    title: Option<String>,
    output: &Output,
) -> Result<()> {
    let (cache, writer) = super::open_with_writer(config).await;
    let path = NotePath::new(path);

    let links: Vec<Link> = targets
        .iter()
        .map(|target| Link::new(path.clone(), target.as_str()))
        .collect();
    let mut metadata = Metadata::new();
    if let Some(title) = title {
        metadata.insert("title".to_string(), title);
    }

    let result = cache
        .save_note(path.clone(), links, metadata, Utc::now())
        .await
        .with_context(|| format!("Failed to record '{}'", path));
    let written = writer.flush().await;
    writer.shutdown().await;
    result?;
    written.context("Failed to write snapshot")?;

    output.success(&format!("Recorded {} ({} link(s))", path, targets.len()));
    Ok(())
}

/// Remove a note from the persisted graph
///
/// A note that other notes still link to stays behind as a placeholder.
pub async fn forget(config: &Config, path: String, output: &Output) -> Result<()> {
    let (cache, writer) = super::open_with_writer(config).await;
    let path = NotePath::new(path);

    let result = cache
        .delete_note(path.clone())
        .await
        .with_context(|| format!("No note '{}' in the snapshot", path));
    let written = writer.flush().await;
    writer.shutdown().await;
    result?;
    written.context("Failed to write snapshot")?;

    output.success(&format!("Forgot {}", path));
    Ok(())
}
