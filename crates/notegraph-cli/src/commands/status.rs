//! Status command handler

use anyhow::Result;
use chrono::Utc;

use notegraph_core::{Config, SnapshotFile};

use crate::output::{human_size, Output, OutputFormat};

/// Show snapshot location, age and contents
///
/// Read-only: an unreadable snapshot is reported and left where it is.
pub fn show(config: &Config, output: &Output) -> Result<()> {
    let file = SnapshotFile::from_config(config);
    let size = file.size();
    let loaded = file.read();

    match output.format {
        OutputFormat::Json => {
            let snapshot = match &loaded {
                Ok(Some(s)) => serde_json::json!({
                    "version": s.version,
                    "created_at": s.created_at.to_rfc3339(),
                    "revision": s.revision,
                    "notes": s.note_count(),
                    "placeholders": s.placeholder_count(),
                    "links": s.link_count(),
                }),
                Ok(None) => serde_json::Value::Null,
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "snapshot_path": file.path(),
                    "snapshot_size": size,
                    "snapshot": snapshot,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", file.path().display());
        }
        OutputFormat::Human => {
            println!("notegraph Status");
            println!("================");
            println!();
            println!("Storage:");
            println!("  Location: {}", file.path().display());
            match size {
                Some(bytes) => println!("  Size:     {}", human_size(bytes)),
                None => println!("  Size:     (no snapshot)"),
            }
            println!();
            match &loaded {
                Ok(Some(snapshot)) => {
                    let age = Utc::now().signed_duration_since(snapshot.created_at);
                    println!("Snapshot:");
                    println!(
                        "  Written:  {} ({} min ago)",
                        snapshot.created_at.format("%Y-%m-%d %H:%M"),
                        age.num_minutes().max(0)
                    );
                    println!("  Format:   v{}", snapshot.version);
                    println!();
                    println!("Contents:");
                    println!("  Notes:        {}", snapshot.note_count());
                    println!("  Placeholders: {}", snapshot.placeholder_count());
                    println!("  Links:        {}", snapshot.link_count());
                }
                Ok(None) => {
                    output.message("No snapshot yet. The graph is built on the next workspace scan.");
                }
                Err(e) => {
                    println!("Snapshot unreadable: {}", e);
                    if let Some(hint) = e.recovery_suggestion() {
                        println!("  {}", hint);
                    }
                }
            }
        }
    }

    Ok(())
}
