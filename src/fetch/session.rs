//! Per-URL fetch session
//!
//! A [`FetchSession`] owns the [`FetchAttempt`] of exactly one URL and drives it to a terminal
//! state: fetch, classify, and either retry (after `retry_wait`), skip, archive, or abort. The loop
//! has no wall-clock bound; only the attempt budget ends it.

use super::classifier::{Outcome, RetryClassifier, Verdict};
use super::fetcher::Fetcher;
use crate::archive::{ArchiveWriter, RecordType};
use crate::error::{Error, Result};
use crate::types::{Event, FetchAttempt, FetchStatus, ItemName, ResourceRecord};
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

/// Shared, read-only collaborators of every session of one item
pub struct SessionContext<'a> {
    /// Item being fetched
    pub item: &'a ItemName,
    /// Performs the exchanges
    pub fetcher: &'a dyn Fetcher,
    /// Decides what each outcome means
    pub classifier: &'a RetryClassifier,
    /// Scheme whose resource records go into the index
    pub archived_scheme: &'a str,
    /// Pause before re-issuing a fetch
    pub retry_wait: Duration,
    /// Lifecycle event channel
    pub events: &'a broadcast::Sender<Event>,
}

/// Drives one URL to accepted, skipped or aborted
#[derive(Debug)]
pub struct FetchSession {
    attempt: FetchAttempt,
}

impl FetchSession {
    /// New session for `url`
    pub fn new(url: Url) -> Self {
        Self {
            attempt: FetchAttempt::new(url),
        }
    }

    /// Current attempt state
    pub fn attempt(&self) -> &FetchAttempt {
        &self.attempt
    }

    /// Run the session to a terminal state
    ///
    /// Accepted responses are appended to `writer`; if the record is a `resource` record of the
    /// archived scheme its index fields are pushed onto `pending`. Abort is returned as an error
    /// and leaves the session in [`FetchStatus::Aborted`].
    pub async fn run(
        &mut self,
        ctx: &SessionContext<'_>,
        writer: &mut ArchiveWriter,
        pending: &mut Vec<ResourceRecord>,
    ) -> Result<FetchStatus> {
        loop {
            let fetched = ctx.fetcher.fetch(&self.attempt.url).await;
            let outcome = match &fetched {
                Ok(response) => Outcome::Response(response),
                Err(error) => Outcome::Transport(error),
            };
            let verdict = ctx.classifier.classify(&mut self.attempt, outcome).await;

            match verdict {
                Verdict::Accept => {
                    let Ok(response) = fetched else {
                        // only responses are ever accepted
                        continue;
                    };
                    let appended = writer.append(response).await?;
                    if appended.record_type == RecordType::Resource
                        && self.attempt.url.scheme() == ctx.archived_scheme
                    {
                        pending.push(appended.record);
                    }
                    self.attempt.status = FetchStatus::Accepted;
                    tracing::info!(item = %ctx.item, url = %self.attempt.url, "archived");
                    ctx.events
                        .send(Event::ResourceAccepted {
                            item: ctx.item.to_string(),
                            url: self.attempt.url.to_string(),
                        })
                        .ok();
                    return Ok(FetchStatus::Accepted);
                }
                Verdict::Skip => {
                    self.attempt.status = FetchStatus::Skipped;
                    tracing::info!(item = %ctx.item, url = %self.attempt.url, "skipped");
                    ctx.events
                        .send(Event::ResourceSkipped {
                            item: ctx.item.to_string(),
                            url: self.attempt.url.to_string(),
                        })
                        .ok();
                    return Ok(FetchStatus::Skipped);
                }
                Verdict::Retry => {
                    ctx.events
                        .send(Event::RetryScheduled {
                            item: ctx.item.to_string(),
                            url: self.attempt.url.to_string(),
                            attempt: self.attempt.attempts,
                        })
                        .ok();
                    if !ctx.retry_wait.is_zero() {
                        tokio::time::sleep(ctx.retry_wait).await;
                    }
                }
                Verdict::Abort(e) => {
                    self.attempt.status = FetchStatus::Aborted;
                    tracing::error!(item = %ctx.item, url = %self.attempt.url, error = %e, "aborting item");
                    return Err(Error::Fetch(e));
                }
            }
        }
    }
}
