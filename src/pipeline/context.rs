//! Collaborators shared by every item, and the per-item context threaded through the stages

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{Fetcher, FtpFetcher, HttpFetcher, SchemeFetcher};
use crate::health::{Resolver, SystemResolver};
use crate::listing::{HttpListService, ListService};
use crate::tracker::{HttpTracker, TrackerClient};
use crate::types::{Event, ItemName, Stage};
use crate::upload::{self, Uploader};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

/// External services the pipeline talks to
///
/// Every field is a trait object so tests and embedders can swap any of them out.
#[derive(Clone)]
pub struct Collaborators {
    /// Work-item tracker
    pub tracker: Arc<dyn TrackerClient>,
    /// Skip-lists and item manifests
    pub list_service: Arc<dyn ListService>,
    /// Resource fetcher (dispatching on URL scheme)
    pub fetcher: Arc<dyn Fetcher>,
    /// Remote store transport
    pub uploader: Arc<dyn Uploader>,
    /// DNS resolver used by the health check
    pub resolver: Arc<dyn Resolver>,
}

impl Collaborators {
    /// Build the production collaborators from configuration
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built, or if the rsync uploader is configured and
    /// `rsync` cannot be found.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client(config)?;
        let transfers = transfer_client(config)?;
        let idle_timeout = config.pipeline.request_timeout;

        let http: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(transfers.clone(), idle_timeout));
        let fetcher = SchemeFetcher::new()
            .with(
                "ftp",
                Arc::new(FtpFetcher::new(idle_timeout)),
            )
            .with("http", Arc::clone(&http))
            .with("https", http);

        Ok(Self {
            tracker: Arc::new(HttpTracker::new(client.clone(), config.tracker.clone())),
            list_service: Arc::new(HttpListService::new(client.clone(), &config.pipeline)),
            fetcher: Arc::new(fetcher),
            uploader: upload::from_config(&config.upload, transfers)?,
            resolver: Arc::new(SystemResolver),
        })
    }
}

const USER_AGENT: &str = concat!("ftp-harvest/", env!("CARGO_PKG_VERSION"));

/// HTTP client for service calls (tracker, list service, oracle), bounded per request
pub(crate) fn http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.pipeline.request_timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(Error::Network)
}

/// HTTP client for resource fetches and uploads
///
/// Only connecting is bounded here. Transfers of any length are allowed; stalls are caught by the
/// fetcher's per-chunk idle timeout and, for uploads, by TCP keepalive.
pub(crate) fn transfer_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.pipeline.request_timeout)
        .tcp_keepalive(config.pipeline.request_timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(Error::Network)
}

/// State of one item while its stages run
pub(super) struct ItemContext<'a> {
    pub(super) name: ItemName,
    pub(super) stage: Stage,
    pub(super) started_at: DateTime<Utc>,
    event_tx: &'a broadcast::Sender<Event>,
}

impl<'a> ItemContext<'a> {
    pub(super) fn new(name: ItemName, event_tx: &'a broadcast::Sender<Event>) -> Self {
        Self {
            name,
            stage: Stage::Claim,
            started_at: Utc::now(),
            event_tx,
        }
    }

    /// Record that `stage` is now running
    pub(super) fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        tracing::info!(item = %self.name, stage = %stage, "stage started");
        self.emit(Event::StageStarted {
            item: self.name.to_string(),
            stage,
        });
    }

    pub(super) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(super) fn events(&self) -> &'a broadcast::Sender<Event> {
        self.event_tx
    }
}
