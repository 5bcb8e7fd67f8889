//! Notes command handler

use anyhow::{Context, Result};

use notegraph_core::Config;

use crate::output::{NoteRow, Output};

/// List every note visible in the snapshot
pub async fn list(config: &Config, placeholders: bool, output: &Output) -> Result<()> {
    let cache = super::open_cache(config).await;

    let mut rows = Vec::new();
    for path in cache.paths().await {
        let info = cache
            .info(path.clone())
            .await
            .with_context(|| format!("Failed to read note '{}'", path))?;
        if info.note.placeholder && !placeholders {
            continue;
        }
        rows.push(NoteRow::from(&info));
    }

    output.print_notes(&rows);
    Ok(())
}
