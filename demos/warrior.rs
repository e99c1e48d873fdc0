//! Warrior example
//!
//! Runs the full claim/fetch/archive/upload loop against a live tracker:
//! - Loading configuration from a TOML file (or defaults)
//! - Installing a tracing subscriber filtered by `RUST_LOG`
//! - Printing lifecycle events as they happen
//! - Stopping cleanly on Ctrl+C after items in flight finish
//!
//! ```bash
//! RUST_LOG=ftp_harvest=info cargo run --example warrior -- harvest.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use ftp_harvest::{Collaborators, Config, Event, ItemPipeline, Warrior};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ftp_harvest=info")),
        )
        .init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Config::from_toml_file(&path)?,
        None => {
            println!("No config file given, using defaults");
            Config::default()
        }
    };
    println!(
        "Downloader {:?} working for {} (data dir {})",
        config.tracker.downloader,
        config.tracker.url,
        config.data_dir().display()
    );

    let warrior_config = config.warrior.clone();
    let collaborators = Collaborators::from_config(&config)?;
    let pipeline = Arc::new(ItemPipeline::new(config, collaborators)?);

    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::ItemClaimed { item } => println!("claimed  {item}"),
                Event::ResourceSkipped { item, url } => println!("skipped  {item}: {url}"),
                Event::RetryScheduled { item, url, attempt } => {
                    println!("retry    {item}: {url} (attempt {attempt})")
                }
                Event::ItemDone { item } => println!("done     {item}"),
                Event::ItemFailed { item, stage, error } => {
                    println!("FAILED   {item} during {stage}: {error}")
                }
                _ => {}
            }
        }
    });

    let warrior = Warrior::new(pipeline, warrior_config);
    let token = warrior.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Ctrl+C received, finishing items in flight");
            token.cancel();
        }
    });

    warrior.run().await?;
    Ok(())
}
