//! Walks through the main client operations against a live account.
//!
//! ```sh
//! NUMEROUS_API_KEY=nmrs_... cargo run -p numerous_client --example metric_tour
//! ```
//!
//! Creates a scratch metric, writes to it, reads its history back, and deletes it.

use std::{env, time::Duration};

use futures::TryStreamExt;
use numerous_client::{Numerous, NumerousConfig, WriteOptions};
use serde_json::json;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let default_log_filter = "info,numerous_client=debug,numerous_dispatch=info";
    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| default_log_filter.to_string()))
        .init();

    let mut config = NumerousConfig::from_env()?;
    config.response_time_history = Some(8);
    config.request_timeout = Duration::from_secs(30);
    info!(target: "config_final", client_config = ?config, "Numerous configuration loaded.");

    let client = Numerous::new(config)?;

    let me = client.user(None).await?;
    info!("Authenticated as {}", me["userName"]);

    let mut metric = client
        .create_metric(
            "numerous-rs tour",
            Some(json!(0)),
            json!({"description": "Scratch metric created by the metric_tour example", "private": true}),
        )
        .await?;
    info!(metric = metric.id(), "Created scratch metric");

    for step in 1..=3 {
        metric
            .write(step, WriteOptions { add: true, ..Default::default() })
            .await?;
    }
    match metric
        .write(6, WriteOptions { only_if: true, ..Default::default() })
        .await
    {
        Err(e) if e.is_conflict() => info!("Conditional write skipped, value already 6"),
        Err(e) => warn!(error = %e, "Conditional write failed"),
        Ok(_) => warn!("Conditional write unexpectedly changed the value"),
    }

    metric.update(json!({"units": "steps"}), false).await?;
    let interaction = metric.comment("Hello from Rust").await?;
    info!(interaction = %interaction, "Comment posted");

    let events: Vec<_> = metric.events().try_collect().await?;
    println!("{} has {} events:", metric.label().await?, events.len());
    for event in &events {
        println!("  {} value={}", event["updated"], event["value"]);
    }

    let stream: Vec<_> = metric.stream().try_collect().await?;
    println!("stream holds {} items", stream.len());

    metric.delete().await?;
    info!("Scratch metric deleted");

    let stats = client.statistics().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
