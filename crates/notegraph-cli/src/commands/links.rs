//! Links command handler

use anyhow::{Context, Result};

use notegraph_core::{Config, NotePath};

use crate::output::Output;

/// Show forward and back links of one note
pub async fn show(config: &Config, path: String, output: &Output) -> Result<()> {
    let cache = super::open_cache(config).await;
    let path = NotePath::new(path);

    let forward = cache
        .forward_links(path.clone())
        .await
        .with_context(|| format!("No note '{}' in the snapshot", path))?;
    let back = cache.back_links(path.clone()).await?;

    output.print_note_links(path.as_str(), &forward, &back);
    Ok(())
}
