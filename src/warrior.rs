//! Worker loops that keep claiming and processing items
//!
//! A [`Warrior`] runs `concurrent_items` independent loops over one shared [`ItemPipeline`].
//! Item failures are logged and the loop moves on; process-fatal failures stop every loop.
//! Cancellation is only observed between items, never in the middle of one.

use crate::config::WarriorConfig;
use crate::error::{ErrorClass, Result};
use crate::pipeline::ItemPipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs pipeline loops until shutdown or a process-fatal error
pub struct Warrior {
    pipeline: Arc<ItemPipeline>,
    config: WarriorConfig,
    shutdown: CancellationToken,
}

impl Warrior {
    /// Create a warrior over `pipeline`
    pub fn new(pipeline: Arc<ItemPipeline>, config: WarriorConfig) -> Self {
        Self {
            pipeline,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops every loop once the items in flight finish
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown is requested or a loop hits a process-fatal error
    ///
    /// # Errors
    ///
    /// The first process-fatal error (network interception, missing tool, bad configuration).
    pub async fn run(&self) -> Result<()> {
        let loops = (0..self.config.concurrent_items).map(|slot| {
            let pipeline = Arc::clone(&self.pipeline);
            let token = self.shutdown.clone();
            let idle_delay = self.config.idle_delay;
            tokio::spawn(async move { worker_loop(slot, pipeline, token, idle_delay).await })
        });
        let results = futures::future::join_all(loops).await;

        let mut first_error = None;
        for result in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "worker loop panicked");
                    self.shutdown.cancel();
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn worker_loop(
    slot: usize,
    pipeline: Arc<ItemPipeline>,
    token: CancellationToken,
    idle_delay: Duration,
) -> Result<()> {
    tracing::info!(slot, "worker started");
    while !token.is_cancelled() {
        match pipeline.run_once().await {
            Ok(Some(report)) => {
                tracing::info!(
                    slot,
                    item = %report.name,
                    records = report.records,
                    skipped = report.skipped,
                    "item finished"
                );
                continue;
            }
            Ok(None) => {
                tracing::debug!(slot, delay_secs = idle_delay.as_secs(), "no work, idling");
            }
            Err(e) => match e.class() {
                ErrorClass::FatalProcess => {
                    tracing::error!(slot, error = %e, "fatal error, stopping all workers");
                    token.cancel();
                    return Err(e);
                }
                // the item is abandoned; its working directory stays for inspection
                ErrorClass::FatalItem | ErrorClass::PermanentSkip => {
                    tracing::warn!(slot, error = %e, "item abandoned");
                    continue;
                }
                ErrorClass::Transient => {
                    tracing::warn!(slot, error = %e, "transient failure, backing off");
                }
            },
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(idle_delay) => {}
        }
    }
    tracing::info!(slot, "worker stopped");
    Ok(())
}
