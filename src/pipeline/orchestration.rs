//! Item pipeline orchestration: the top-level lifecycle of one work item.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::archive::{ArchiveWriter, SidecarIndex, WarcInfo};
use crate::config::Config;
use crate::error::{Error, ItemError, Result};
use crate::fetch::{ExistenceOracle, FetchSession, RetryClassifier, SessionContext};
use crate::gate::ConcurrencyGate;
use crate::health::HealthCheck;
use crate::retry::with_retry;
use crate::types::{
    ClaimedItem, Event, FetchStatus, ItemPaths, ItemReport, ResourceRecord, Stage,
};
use crate::utils::ensure_space;

use super::context::{Collaborators, ItemContext, http_client};
use super::directories::prepare_directories;
use super::manifest::resolve_manifest;
use super::relocate::relocate;
use super::stats::extract_stats;

/// Counts from the fetch stage
struct FetchResults {
    accepted: usize,
    skipped: usize,
    pending: Vec<ResourceRecord>,
}

/// Runs work items end to end
///
/// One pipeline is shared by every worker of a process: the health check throttle and the upload
/// gate are process-wide, everything else is per item.
pub struct ItemPipeline {
    config: Config,
    collaborators: Collaborators,
    health: HealthCheck,
    gate: ConcurrencyGate,
    http: reqwest::Client,
    event_tx: broadcast::Sender<Event>,
}

impl ItemPipeline {
    /// Create a pipeline from validated configuration and its collaborators
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let gate = ConcurrencyGate::new(config.pipeline.upload_concurrency)?;
        let health = HealthCheck::new(config.health.clone(), Arc::clone(&collaborators.resolver));
        let http = http_client(&config)?;
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config,
            collaborators,
            health,
            gate,
            http,
            event_tx,
        })
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The upload admission gate
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// The configuration this pipeline was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the health check if due, claim one item and process it
    ///
    /// Returns `Ok(None)` when the tracker has no work.
    pub async fn run_once(&self) -> Result<Option<ItemReport>> {
        // Phase 1: process-wide network precondition
        self.health.check_if_due().await?;

        // Phase 2: claim
        let Some(item) = self.collaborators.tracker.claim_item().await? else {
            tracing::debug!("no item available");
            return Ok(None);
        };
        self.process_item(item).await.map(Some)
    }

    /// Process one claimed item through every stage
    ///
    /// Any error aborts the item. The working directory is left in place for inspection.
    pub async fn process_item(&self, item: ClaimedItem) -> Result<ItemReport> {
        let mut ctx = ItemContext::new(item.name.clone(), &self.event_tx);
        tracing::info!(item = %item.name, size_hint = ?item.size, "claimed item");
        ctx.emit(Event::ItemClaimed {
            item: item.name.to_string(),
        });

        match self.run_stages(&mut ctx).await {
            Ok(report) => {
                ctx.emit(Event::ItemDone {
                    item: ctx.name.to_string(),
                });
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    item = %ctx.name,
                    stage = %ctx.stage,
                    error = %e,
                    class = ?e.class(),
                    "item failed"
                );
                ctx.emit(Event::ItemFailed {
                    item: ctx.name.to_string(),
                    stage: ctx.stage,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Stages 3-10 of an item.
    ///
    /// Phases:
    /// 1. Prepare the working directory
    /// 2. Resolve the manifest and check disk space
    /// 3. Fetch every URL into the container
    /// 4. Extract and report statistics
    /// 5. Build the sidecar index
    /// 6. Relocate outputs
    /// 7. Upload through the gate
    /// 8. Report completion
    async fn run_stages(&self, ctx: &mut ItemContext<'_>) -> Result<ItemReport> {
        let pipeline = &self.config.pipeline;
        let tracker = self.collaborators.tracker.as_ref();

        // Phase 1: working directory
        ctx.enter(Stage::PrepareDirectories);
        let paths = prepare_directories(
            self.config.data_dir(),
            &self.config.paths.file_prefix,
            &ctx.name,
            ctx.started_at,
        )
        .await?;

        // Phase 2: manifest
        ctx.enter(Stage::ResolveManifest);
        let manifest =
            resolve_manifest(self.collaborators.list_service.as_ref(), &ctx.name, pipeline)
                .await?;
        ensure_space(&paths.data_dir, manifest.total_size)?;

        // Phase 3: fetch
        ctx.enter(Stage::Fetch);
        let fetched = self.fetch_all(ctx, &paths, manifest.urls).await?;

        // Phase 4: statistics
        ctx.enter(Stage::ExtractStats);
        let stats = extract_stats(&paths.container(), &ctx.name, &self.config.tracker).await?;
        tracker.report_stats(&ctx.name, &stats).await?;

        // Phase 5: index
        ctx.enter(Stage::ExtractRecordsInfo);
        let records =
            SidecarIndex::extract(&paths.container(), &pipeline.archived_scheme).await?;
        if records != fetched.pending {
            return Err(ItemError::CorruptContainer {
                path: paths.container(),
                reason: format!(
                    "container holds {} {} resource records, {} were archived",
                    records.len(),
                    pipeline.archived_scheme,
                    fetched.pending.len()
                ),
            }
            .into());
        }
        SidecarIndex::write(&paths.index(), &records).await?;

        // Phase 6: relocation
        ctx.enter(Stage::Relocate);
        let relocated = relocate(&paths).await?;

        // Phase 7: upload
        ctx.enter(Stage::Upload);
        let target = tracker.upload_target().await?;
        let files = relocated.to_vec();
        let permit = self.gate.acquire().await?;
        tracing::debug!(
            item = %ctx.name,
            in_use = self.gate.in_use(),
            capacity = self.gate.capacity(),
            "upload slot acquired"
        );
        let uploader = self.collaborators.uploader.as_ref();
        let (target_ref, files_ref) = (target.as_str(), files.as_slice());
        let uploaded =
            with_retry(&self.config.upload.retry, move || uploader.upload(target_ref, files_ref))
                .await;
        self.gate.release(permit);
        uploaded.map_err(Error::Upload)?;
        tracing::info!(item = %ctx.name, target = %target, uploader = uploader.name(), "uploaded");
        ctx.emit(Event::ItemUploaded {
            item: ctx.name.to_string(),
        });

        // Phase 8: completion report
        ctx.enter(Stage::ReportDone);
        let (name, stats_ref) = (&ctx.name, &stats);
        with_retry(&self.config.report_retry, move || {
            tracker.report_done(name, stats_ref)
        })
        .await?;

        tracing::info!(
            item = %ctx.name,
            accepted = fetched.accepted,
            skipped = fetched.skipped,
            records = records.len(),
            "item done"
        );
        Ok(ItemReport {
            name: ctx.name.clone(),
            accepted: fetched.accepted,
            skipped: fetched.skipped,
            records: records.len(),
            stats,
            container: relocated.container,
            index: relocated.index,
            started_at: ctx.started_at,
            finished_at: chrono::Utc::now(),
        })
    }

    /// Drive one fetch session per URL, sequentially, into a fresh container
    async fn fetch_all(
        &self,
        ctx: &ItemContext<'_>,
        paths: &ItemPaths,
        urls: Vec<url::Url>,
    ) -> Result<FetchResults> {
        let pipeline = &self.config.pipeline;
        let info = WarcInfo {
            software: super::stats::FETCH_TOOL.to_string(),
            operator: "Archive Team".to_string(),
            item: ctx.name.to_string(),
            downloader: self.config.tracker.downloader.clone(),
            pipeline_version: self.config.tracker.version.clone(),
        };
        let mut writer = ArchiveWriter::create(&paths.container(), &info).await?;

        // oracle answers are cached for this item only
        let oracle = Arc::new(ExistenceOracle::new(
            self.http.clone(),
            &pipeline.oracle_base_url,
        ));
        let classifier = RetryClassifier::new(
            pipeline.max_retries,
            &pipeline.archived_scheme,
            Some(oracle),
            Arc::clone(&self.collaborators.fetcher),
        );
        let session_ctx = SessionContext {
            item: &ctx.name,
            fetcher: self.collaborators.fetcher.as_ref(),
            classifier: &classifier,
            archived_scheme: &pipeline.archived_scheme,
            retry_wait: pipeline.retry_wait,
            events: ctx.events(),
        };

        let mut results = FetchResults {
            accepted: 0,
            skipped: 0,
            pending: Vec::new(),
        };
        for url in urls {
            let mut session = FetchSession::new(url);
            match session.run(&session_ctx, &mut writer, &mut results.pending).await? {
                FetchStatus::Accepted => results.accepted += 1,
                FetchStatus::Skipped => results.skipped += 1,
                FetchStatus::Pending | FetchStatus::Aborted => {}
            }
        }

        let container = writer.finish().await?;
        tracing::debug!(
            item = %ctx.name,
            container = %container.display(),
            accepted = results.accepted,
            skipped = results.skipped,
            "container finalized"
        );
        Ok(results)
    }
}
