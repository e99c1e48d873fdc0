//! # ftp-harvest
//!
//! Distributed crawl-pipeline client for archiving public FTP servers.
//!
//! A worker claims an item (a list of FTP resource URLs) from a central tracker, fetches every
//! resource with bounded retries, writes the results into a WARC container plus a sidecar index,
//! moves both into the shared data directory, uploads them and reports completion.
//!
//! ## Design Philosophy
//!
//! ftp-harvest is designed to be:
//! - **Library-first** - No CLI, purely a Rust crate for embedding
//! - **Explicitly configured** - One [`Config`] struct, no environment lookups or global hooks
//! - **Seam-driven** - Tracker, list service, fetcher, uploader and resolver are traits
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use ftp_harvest::{Collaborators, Config, ItemPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.tracker.downloader = "alice".to_string();
//!
//!     let collaborators = Collaborators::from_config(&config)?;
//!     let pipeline = ItemPipeline::new(config, collaborators)?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     if let Some(report) = pipeline.run_once().await? {
//!         println!("archived {} resources of {}", report.records, report.name);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// WARC container writing, reading and the sidecar index
pub mod archive;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Resource fetchers, retry classification and fetch sessions
pub mod fetch;
/// Upload admission gate
pub mod gate;
/// Network health check
pub mod health;
/// External list service client
pub mod listing;
/// Item pipeline
pub mod pipeline;
/// Retry logic with exponential backoff
pub mod retry;
/// Tracker client
pub mod tracker;
/// Core types and events
pub mod types;
/// Upload transports
pub mod upload;
/// Utility functions
pub mod utils;
/// Worker loops
pub mod warrior;

// Re-export commonly used types
pub use config::{Config, PipelineConfig, RetryConfig};
pub use error::{
    Error, ErrorClass, FetchError, ItemError, ProcessError, Result, UploadError,
};
pub use gate::ConcurrencyGate;
pub use pipeline::{Collaborators, ItemPipeline};
pub use types::{ClaimedItem, Event, ItemName, ItemReport, ItemStats, ResourceRecord, Stage};
pub use warrior::Warrior;

use std::sync::Arc;

/// Run a [`Warrior`] built from `config` until a termination signal arrives.
///
/// On the first signal the warrior stops claiming new items; items already in flight run to
/// completion before this returns.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use ftp_harvest::{Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::from_toml_file(std::path::Path::new("harvest.toml"))?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(config).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(config: Config) -> Result<()> {
    let warrior_config = config.warrior.clone();
    let collaborators = Collaborators::from_config(&config)?;
    let pipeline = Arc::new(ItemPipeline::new(config, collaborators)?);
    let warrior = Warrior::new(pipeline, warrior_config);

    let token = warrior.shutdown_token();
    let signal_task = tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("finishing items in flight before exit");
        token.cancel();
    });

    let result = warrior.run().await;
    signal_task.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
