//! External list service client
//!
//! The list service publishes three plain-text documents:
//! - `<base>/skipped_sites`: item-name prefixes that must not be processed
//! - `<base>/skipped_dirs`: `host:path` (or full URL) prefixes that must not be fetched
//! - `<manifest-base>/<item-path>`: the item manifest, an `ITEM_TOTAL_SIZE: <n>` header followed by
//!   newline-delimited candidate URLs
//!
//! Anything but a 200 from any of them is fatal for the item. Interpretation of the documents
//! (size ceiling, skip matching, URL decoding) lives in [`crate::pipeline::manifest`].

use crate::config::PipelineConfig;
use crate::error::{Error, ItemError, Result};
use async_trait::async_trait;
use url::Url;

/// A fetched item manifest
#[derive(Clone, Debug)]
pub struct ManifestDocument {
    /// Where it was fetched from (always appended to the fetch set)
    pub url: Url,
    /// Raw manifest text
    pub body: String,
}

/// Source of skip-lists and item manifests
#[async_trait]
pub trait ListService: Send + Sync {
    /// Item-name prefixes excluded from processing
    async fn skipped_sites(&self) -> Result<Vec<String>>;

    /// URL prefixes excluded from fetching, as published (not yet normalized)
    async fn skipped_dirs(&self) -> Result<Vec<String>>;

    /// The manifest of one item, addressed by the item's relative path
    async fn manifest(&self, item_path: &str) -> Result<ManifestDocument>;
}

/// HTTP implementation of [`ListService`]
#[derive(Clone, Debug)]
pub struct HttpListService {
    client: reqwest::Client,
    list_base: String,
    manifest_base: String,
}

impl HttpListService {
    /// Create a client for the configured list service and manifest bases
    pub fn new(client: reqwest::Client, config: &PipelineConfig) -> Self {
        Self {
            client,
            list_base: config.list_service_base_url.trim_end_matches('/').to_string(),
            manifest_base: config.manifest_base().trim_end_matches('/').to_string(),
        }
    }

    async fn get_text(&self, url: &Url) -> Result<String> {
        tracing::debug!(url = %url, "fetching from list service");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ItemError::ListService {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        Ok(response.text().await?)
    }

    async fn get_lines(&self, name: &str) -> Result<Vec<String>> {
        let url = join_url(&self.list_base, name)?;
        let body = self.get_text(&url).await?;
        Ok(body.lines().map(str::to_string).collect())
    }
}

#[async_trait]
impl ListService for HttpListService {
    async fn skipped_sites(&self) -> Result<Vec<String>> {
        self.get_lines("skipped_sites").await
    }

    async fn skipped_dirs(&self) -> Result<Vec<String>> {
        self.get_lines("skipped_dirs").await
    }

    async fn manifest(&self, item_path: &str) -> Result<ManifestDocument> {
        let url = join_url(&self.manifest_base, item_path)?;
        let body = self.get_text(&url).await?;
        Ok(ManifestDocument { url, body })
    }
}

fn join_url(base: &str, tail: &str) -> Result<Url> {
    let joined = format!("{base}/{}", tail.trim_start_matches('/'));
    Url::parse(&joined).map_err(|e| Error::Other(format!("invalid list service URL {joined}: {e}")))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> HttpListService {
        let config = PipelineConfig {
            list_service_base_url: server.uri(),
            manifest_base_url: Some(format!("{}/ftplists/", server.uri())),
            ..PipelineConfig::default()
        };
        HttpListService::new(reqwest::Client::new(), &config)
    }

    #[tokio::test]
    async fn skip_lists_are_split_into_lines() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/skipped_sites"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ftp.bad.gov\nftp.worse.gov\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/skipped_dirs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ftp.example.gov:/pub/private"))
            .mount(&server)
            .await;

        let svc = service(&server);
        assert_eq!(
            svc.skipped_sites().await.unwrap(),
            vec!["ftp.bad.gov", "ftp.worse.gov"]
        );
        assert_eq!(
            svc.skipped_dirs().await.unwrap(),
            vec!["ftp.example.gov:/pub/private"]
        );
    }

    #[tokio::test]
    async fn manifest_is_fetched_from_the_manifest_base() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ftplists/pub/data/foo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("ITEM_TOTAL_SIZE: 12\nftp://ftp.example.gov/pub/data/foo/a\n"),
            )
            .mount(&server)
            .await;

        let doc = service(&server).manifest("/pub/data/foo").await.unwrap();
        assert_eq!(doc.url.path(), "/ftplists/pub/data/foo");
        assert!(doc.body.starts_with("ITEM_TOTAL_SIZE: 12"));
    }

    #[tokio::test]
    async fn non_200_is_fatal_for_the_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/skipped_sites"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = service(&server).skipped_sites().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::FatalItem);
        assert!(matches!(
            err,
            Error::Item(ItemError::ListService { status: 503, .. })
        ));
    }
}
