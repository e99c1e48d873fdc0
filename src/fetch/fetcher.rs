//! The fetcher seam
//!
//! A [`Fetcher`] turns one URL into either a response (any status, including failures the server
//! reported) or a [`TransportError`] (the exchange never completed). The retry classifier only ever
//! sees these two shapes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Protocol family a response came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// FTP retrieval or listing, archived as a `resource` record
    Ftp,
    /// HTTP exchange, archived as a `response` record
    Http,
}

/// A completed exchange with a server
#[derive(Clone, Debug)]
pub struct FetchedResource {
    /// The URL that was fetched
    pub url: Url,
    /// Status code (HTTP status, or FTP reply code with transfer completion mapped to 200)
    pub status: u16,
    /// Reason phrase or reply text accompanying the status
    pub reason: String,
    /// Response headers (HTTP only)
    pub headers: Vec<(String, String)>,
    /// Media type of the body, if known
    pub content_type: Option<String>,
    /// Payload
    pub body: Vec<u8>,
    /// Protocol family
    pub kind: ResourceKind,
}

impl FetchedResource {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `<status> <reason>`, the text failure fragments are matched against
    pub fn status_line(&self) -> String {
        format!("{} {}", self.status, self.reason)
    }
}

/// The exchange with the server did not complete
#[derive(Clone, Debug, Error)]
#[error("{url}: {message}")]
pub struct TransportError {
    /// The URL being fetched
    pub url: String,
    /// What went wrong (connection refused, timeout, protocol violation...)
    pub message: String,
}

impl TransportError {
    /// Build a transport error for a URL
    pub fn new(url: &Url, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

/// Fetches a single URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform one exchange for `url`
    async fn fetch(&self, url: &Url) -> Result<FetchedResource, TransportError>;
}

/// Dispatches to a fetcher by URL scheme
#[derive(Clone, Default)]
pub struct SchemeFetcher {
    by_scheme: HashMap<String, Arc<dyn Fetcher>>,
}

impl SchemeFetcher {
    /// Empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `scheme` to `fetcher`
    pub fn with(mut self, scheme: &str, fetcher: Arc<dyn Fetcher>) -> Self {
        self.by_scheme.insert(scheme.to_ascii_lowercase(), fetcher);
        self
    }
}

#[async_trait]
impl Fetcher for SchemeFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedResource, TransportError> {
        match self.by_scheme.get(url.scheme()) {
            Some(fetcher) => fetcher.fetch(url).await,
            None => Err(TransportError::new(
                url,
                format!("no fetcher for scheme {}", url.scheme()),
            )),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u16);

    #[async_trait]
    impl Fetcher for Fixed {
        async fn fetch(&self, url: &Url) -> Result<FetchedResource, TransportError> {
            Ok(FetchedResource {
                url: url.clone(),
                status: self.0,
                reason: String::new(),
                headers: Vec::new(),
                content_type: None,
                body: Vec::new(),
                kind: ResourceKind::Ftp,
            })
        }
    }

    #[tokio::test]
    async fn dispatches_by_scheme() {
        let fetcher = SchemeFetcher::new()
            .with("ftp", Arc::new(Fixed(200)))
            .with("HTTP", Arc::new(Fixed(404)));

        let ftp = Url::parse("ftp://ftp.example.gov/a").unwrap();
        let http = Url::parse("http://lists.example.org/a").unwrap();
        let gopher = Url::parse("gopher://old.example.org/a").unwrap();

        assert_eq!(fetcher.fetch(&ftp).await.unwrap().status, 200);
        assert_eq!(fetcher.fetch(&http).await.unwrap().status, 404);
        assert!(fetcher.fetch(&gopher).await.is_err());
    }
}
