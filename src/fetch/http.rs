//! HTTP fetcher backed by `reqwest`
//!
//! The body is read chunk by chunk; the idle timeout applies to the response head and to each
//! chunk, so a large body that keeps arriving is never cut off.

use super::fetcher::{FetchedResource, Fetcher, ResourceKind, TransportError};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use url::Url;

/// HTTP(S) implementation of [`Fetcher`]
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    idle_timeout: Duration,
}

impl HttpFetcher {
    /// Wrap a client; `idle_timeout` bounds the wait for the head and for every body chunk
    ///
    /// The client should carry a connect timeout only. A total request timeout would cut off large
    /// bodies that are still arriving.
    pub fn new(client: reqwest::Client, idle_timeout: Duration) -> Self {
        Self {
            client,
            idle_timeout,
        }
    }

    fn stalled(&self, url: &Url, what: &str) -> TransportError {
        TransportError::new(url, format!("{what} stalled for {:?}", self.idle_timeout))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedResource, TransportError> {
        let response = tokio::time::timeout(self.idle_timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| self.stalled(url, "response head"))?
            .map_err(|e| TransportError::new(url, e.to_string()))?;

        let status = response.status();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let capacity = response.content_length().unwrap_or(0).min(1 << 20) as usize;
        let mut body = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(self.idle_timeout, stream.next())
                .await
                .map_err(|_| self.stalled(url, "body"))?;
            match next {
                Some(chunk) => {
                    let chunk =
                        chunk.map_err(|e| TransportError::new(url, format!("reading body: {e}")))?;
                    body.extend_from_slice(&chunk);
                }
                None => break,
            }
        }

        Ok(FetchedResource {
            url: url.clone(),
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            content_type,
            body,
            kind: ResourceKind::Http,
        })
    }
}
