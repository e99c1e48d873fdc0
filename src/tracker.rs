//! Tracker client
//!
//! The tracker hands out work items and collects completion reports. [`TrackerClient`] is the
//! narrow contract the pipeline depends on; [`HttpTracker`] speaks the JSON protocol:
//!
//! - `POST {url}/request` `{downloader, api_version, version}` → `{item_name, item_size?}`;
//!   404 and 420 mean "no work right now"
//! - `POST {url}/upload` `{downloader, version}` → `{upload_target}`
//! - `POST {url}/done` `{downloader, item, bytes, version, id}`
//!
//! Retry policy belongs to the caller: every method makes exactly one request.

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::types::{ClaimedItem, ItemName, ItemStats};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Tracker protocol version sent with claim requests
pub const TRACKER_API_VERSION: &str = "2";

/// Tracker operations used by the pipeline
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Claim the next work item; `None` when the tracker has nothing to hand out
    async fn claim_item(&self) -> Result<Option<ClaimedItem>>;

    /// Send intermediate statistics for an item
    async fn report_stats(&self, item: &ItemName, stats: &ItemStats) -> Result<()>;

    /// Ask where the outputs of the next upload should go
    async fn upload_target(&self) -> Result<String>;

    /// Mark an item done
    async fn report_done(&self, item: &ItemName, stats: &ItemStats) -> Result<()>;
}

#[derive(Serialize)]
struct ClaimRequest<'a> {
    downloader: &'a str,
    api_version: &'a str,
    version: &'a str,
}

#[derive(Deserialize)]
struct ClaimResponse {
    item_name: String,
    #[serde(default)]
    item_size: Option<u64>,
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    downloader: &'a str,
    version: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    upload_target: String,
}

#[derive(Serialize)]
struct DoneRequest<'a> {
    item: &'a str,
    #[serde(flatten)]
    stats: &'a ItemStats,
}

/// HTTP implementation of [`TrackerClient`]
#[derive(Clone, Debug)]
pub struct HttpTracker {
    client: reqwest::Client,
    config: TrackerConfig,
}

impl HttpTracker {
    /// Create a client for the configured tracker
    pub fn new(client: reqwest::Client, config: TrackerConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{name}", self.config.url.trim_end_matches('/'))
    }

    async fn post<B: Serialize + ?Sized>(&self, name: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.endpoint(name);
        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::tracker(format!("POST {url} failed: {e}"), None))
    }
}

#[async_trait]
impl TrackerClient for HttpTracker {
    async fn claim_item(&self) -> Result<Option<ClaimedItem>> {
        let response = self
            .post(
                "request",
                &ClaimRequest {
                    downloader: &self.config.downloader,
                    api_version: TRACKER_API_VERSION,
                    version: &self.config.version,
                },
            )
            .await?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            404 | 420 => {
                tracing::debug!(status, "tracker has no work for us");
                return Ok(None);
            }
            _ => {
                return Err(Error::tracker(
                    format!("claim request returned status {status}"),
                    Some(status),
                ));
            }
        }

        let claim: ClaimResponse = response
            .json()
            .await
            .map_err(|e| Error::tracker(format!("malformed claim response: {e}"), Some(status)))?;
        let name = ItemName::parse(&claim.item_name)?;
        tracing::info!(item = %name, size = ?claim.item_size, "claimed item");
        Ok(Some(ClaimedItem {
            name,
            size: claim.item_size,
        }))
    }

    async fn report_stats(&self, item: &ItemName, stats: &ItemStats) -> Result<()> {
        // stats travel with the done report; nothing to send separately
        tracing::debug!(
            item = %item,
            bytes = ?stats.bytes,
            container_hash = %stats.id.container_hash,
            "item stats ready"
        );
        Ok(())
    }

    async fn upload_target(&self) -> Result<String> {
        let response = self
            .post(
                "upload",
                &UploadRequest {
                    downloader: &self.config.downloader,
                    version: &self.config.version,
                },
            )
            .await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(Error::tracker(
                format!("upload target request returned status {status}"),
                Some(status),
            ));
        }
        let target: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::tracker(format!("malformed upload response: {e}"), Some(status)))?;
        Ok(target.upload_target)
    }

    async fn report_done(&self, item: &ItemName, stats: &ItemStats) -> Result<()> {
        let response = self
            .post(
                "done",
                &DoneRequest {
                    item: item.as_str(),
                    stats,
                },
            )
            .await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(Error::tracker(
                format!("done report for {item} returned status {status}"),
                Some(status),
            ));
        }
        tracing::info!(item = %item, "tracker acknowledged item");
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::types::StatsFingerprint;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tracker(server: &MockServer) -> HttpTracker {
        HttpTracker::new(
            reqwest::Client::new(),
            TrackerConfig {
                url: format!("{}/ftp-gov", server.uri()),
                downloader: "tester".into(),
                ..TrackerConfig::default()
            },
        )
    }

    fn stats() -> ItemStats {
        ItemStats {
            items: vec!["noaa:/pub/data/foo".into()],
            bytes: BTreeMap::from([("data".to_string(), 4096)]),
            version: "20170226.01".into(),
            downloader: "tester".into(),
            id: StatsFingerprint {
                container_hash: "ab".repeat(32),
                fetch_tool: "ftp-harvest/0.1.0".into(),
                environment: "linux-x86_64".into(),
            },
        }
    }

    #[tokio::test]
    async fn claim_parses_item_and_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ftp-gov/request"))
            .and(body_partial_json(serde_json::json!({"downloader": "tester"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"item_name": "noaa:/pub/data/foo", "item_size": 1000}),
            ))
            .mount(&server)
            .await;

        let item = tracker(&server).claim_item().await.unwrap().unwrap();
        assert_eq!(item.name.as_str(), "noaa:/pub/data/foo");
        assert_eq!(item.size, Some(1000));
    }

    #[tokio::test]
    async fn rate_limited_claim_means_no_work() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ftp-gov/request"))
            .respond_with(ResponseTemplate::new(420))
            .mount(&server)
            .await;

        assert!(tracker(&server).claim_item().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_with_invalid_item_name_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ftp-gov/request"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"item_name": "nocolon"})),
            )
            .mount(&server)
            .await;

        assert!(tracker(&server).claim_item().await.is_err());
    }

    #[tokio::test]
    async fn done_report_carries_stats() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ftp-gov/done"))
            .and(body_partial_json(serde_json::json!({
                "item": "noaa:/pub/data/foo",
                "downloader": "tester",
                "bytes": {"data": 4096},
                "version": "20170226.01",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let name = ItemName::parse("noaa:/pub/data/foo").unwrap();
        tracker(&server).report_done(&name, &stats()).await.unwrap();
    }

    #[tokio::test]
    async fn server_error_on_done_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ftp-gov/done"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let name = ItemName::parse("noaa:/pub/data/foo").unwrap();
        let err = tracker(&server)
            .report_done(&name, &stats())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn upload_target_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ftp-gov/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"upload_target": "rsync://upload.example/ftp-gov/"}),
            ))
            .mount(&server)
            .await;

        assert_eq!(
            tracker(&server).upload_target().await.unwrap(),
            "rsync://upload.example/ftp-gov/"
        );
    }
}
