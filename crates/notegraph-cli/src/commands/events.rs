//! Events command handler

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use notegraph_core::{Config, Event};

use crate::output::{Output, OutputFormat};

/// Print the event replay a new subscriber would receive
///
/// One JSON object per line, in delivery order.
pub async fn replay(config: &Config, output: &Output) -> Result<()> {
    let cache = super::open_cache(config).await;
    let mut subscription = cache.subscribe(CancellationToken::new()).await;

    let mut events: Vec<Event> = Vec::new();
    while let Some(event) = subscription.try_recv() {
        events.push(event);
    }
    subscription.cancel();

    match output.format {
        OutputFormat::Quiet => println!("{}", events.len()),
        OutputFormat::Human | OutputFormat::Json => {
            for event in &events {
                let line = serde_json::to_string(event).context("Failed to encode event")?;
                println!("{}", line);
            }
        }
    }
    Ok(())
}
