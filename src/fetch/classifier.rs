//! Retry classification
//!
//! Every outcome of a fetch (a response with a status, or a transport error) is turned into a
//! [`Verdict`]. The classifier mutates only the [`FetchAttempt`] it is handed, so attempt counts
//! are per URL and never leak between URLs or items.
//!
//! Responses:
//! - 2xx: [`Verdict::Accept`], counter reset
//! - 530, 550: [`Verdict::Skip`], counter reset
//! - anything else: counter incremented; [`Verdict::Abort`] once it reaches `max_retries`,
//!   otherwise [`Verdict::Retry`]
//!
//! Transport errors on archived-scheme URLs consult the [`ExistenceOracle`] first. If the server has
//! published nonexistence fragments, the URL is fetched once more and a failure whose message
//! contains every fragment is a [`Verdict::Skip`]. Otherwise the same attempt counting applies.

use super::fetcher::{FetchedResource, Fetcher, TransportError};
use super::oracle::{ExistenceOracle, OracleAnswer, confirms_absence};
use crate::error::FetchError;
use crate::types::FetchAttempt;
use std::sync::Arc;

/// Status codes meaning "not found" or "permission denied" on FTP servers
pub const PERMANENT_SKIP_CODES: [u16; 2] = [530, 550];

/// What happened on one fetch
#[derive(Clone, Copy, Debug)]
pub enum Outcome<'a> {
    /// The server answered
    Response(&'a FetchedResource),
    /// The exchange did not complete
    Transport(&'a TransportError),
}

/// Decision for one outcome
#[derive(Debug)]
pub enum Verdict {
    /// Keep the response
    Accept,
    /// The resource does not exist upstream; record nothing
    Skip,
    /// Fetch again
    Retry,
    /// Give up on the whole item
    Abort(FetchError),
}

/// The per-URL retry state machine
pub struct RetryClassifier {
    max_retries: u32,
    archived_scheme: String,
    oracle: Option<Arc<ExistenceOracle>>,
    refetcher: Arc<dyn Fetcher>,
}

impl RetryClassifier {
    /// Create a classifier
    ///
    /// `refetcher` re-fetches a failing URL during oracle consultation; `oracle` may be `None` to
    /// disable consultation entirely.
    pub fn new(
        max_retries: u32,
        archived_scheme: &str,
        oracle: Option<Arc<ExistenceOracle>>,
        refetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            max_retries,
            archived_scheme: archived_scheme.to_ascii_lowercase(),
            oracle,
            refetcher,
        }
    }

    /// Classify one outcome, updating the attempt counter
    pub async fn classify(&self, attempt: &mut FetchAttempt, outcome: Outcome<'_>) -> Verdict {
        match outcome {
            Outcome::Response(response) => self.classify_status(attempt, response.status),
            Outcome::Transport(error) => self.classify_transport(attempt, error).await,
        }
    }

    /// Classify a response status
    pub fn classify_status(&self, attempt: &mut FetchAttempt, status: u16) -> Verdict {
        if (200..300).contains(&status) {
            attempt.attempts = 0;
            return Verdict::Accept;
        }
        if PERMANENT_SKIP_CODES.contains(&status) {
            attempt.attempts = 0;
            return Verdict::Skip;
        }
        self.count_failure(attempt, status.to_string())
    }

    async fn classify_transport(&self, attempt: &mut FetchAttempt, error: &TransportError) -> Verdict {
        if attempt.url.scheme() == self.archived_scheme {
            match self.confirmed_absent(attempt).await {
                Ok(true) => {
                    tracing::info!(url = %attempt.url, "resource does not exist upstream, skipping");
                    attempt.attempts = 0;
                    return Verdict::Skip;
                }
                Ok(false) => {}
                Err(e) => return Verdict::Abort(e),
            }
        }
        self.count_failure(attempt, error.message.clone())
    }

    async fn confirmed_absent(&self, attempt: &FetchAttempt) -> Result<bool, FetchError> {
        let Some(oracle) = &self.oracle else {
            return Ok(false);
        };
        let fragments = match oracle.lookup(&attempt.url).await? {
            OracleAnswer::Fragments(fragments) => fragments,
            OracleAnswer::NoData => return Ok(false),
        };

        let message = match self.refetcher.fetch(&attempt.url).await {
            Ok(response) if response.is_success() => return Ok(false),
            Ok(response) => response.status_line(),
            Err(e) => e.message,
        };
        tracing::debug!(url = %attempt.url, message = %message, "re-fetched failing resource");
        Ok(confirms_absence(&fragments, &message))
    }

    fn count_failure(&self, attempt: &mut FetchAttempt, last: String) -> Verdict {
        attempt.attempts += 1;
        if attempt.attempts >= self.max_retries {
            return Verdict::Abort(FetchError::RetriesExhausted {
                url: attempt.url.to_string(),
                attempts: attempt.attempts,
                last,
            });
        }
        tracing::warn!(
            url = %attempt.url,
            attempt = attempt.attempts,
            last = %last,
            "fetch failed, retrying"
        );
        Verdict::Retry
    }
}
