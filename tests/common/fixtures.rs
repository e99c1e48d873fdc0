//! Mock tracker and list service mounted on one wiremock server

use ftp_harvest::config::UploadMethod;
use ftp_harvest::fetch::{Fetcher, HttpFetcher, SchemeFetcher};
use ftp_harvest::health::SystemResolver;
use ftp_harvest::listing::HttpListService;
use ftp_harvest::tracker::HttpTracker;
use ftp_harvest::upload::HttpUploader;
use ftp_harvest::{Collaborators, Config, RetryConfig};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Item used by the end-to-end scenarios
pub const ITEM: &str = "noaa:/pub/data/foo";

/// Configuration pointing every service at `server`
pub fn config_for(server: &MockServer, data_dir: &Path) -> Config {
    let uri = server.uri();
    let instant = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 1.0,
        jitter: false,
    };

    let mut config = Config::default();
    config.paths.data_dir = data_dir.to_path_buf();
    config.tracker.url = format!("{uri}/ftp-gov");
    config.tracker.downloader = "e2e-tester".into();
    config.pipeline.list_service_base_url = format!("{uri}/lists");
    config.pipeline.manifest_base_url = Some(format!("{uri}/ftplists"));
    config.pipeline.oracle_base_url = format!("{uri}/oracle");
    config.pipeline.retry_wait = Duration::ZERO;
    config.health.enabled = false;
    config.upload.method = UploadMethod::Http;
    config.upload.retry = instant.clone();
    config.report_retry = instant;
    config
}

/// Real HTTP collaborators with FTP served by `ftp`
pub fn collaborators(config: &Config, ftp: Arc<dyn Fetcher>) -> Collaborators {
    let client = reqwest::Client::new();
    let fetcher = SchemeFetcher::new()
        .with("ftp", ftp)
        .with(
            "http",
            Arc::new(HttpFetcher::new(client.clone(), Duration::from_secs(5))),
        );
    Collaborators {
        tracker: Arc::new(HttpTracker::new(client.clone(), config.tracker.clone())),
        list_service: Arc::new(HttpListService::new(client.clone(), &config.pipeline)),
        fetcher: Arc::new(fetcher),
        uploader: Arc::new(HttpUploader::new(client)),
        resolver: Arc::new(SystemResolver),
    }
}

/// Tracker handing out `item` once, then reporting no work
pub async fn mount_tracker(server: &MockServer, item: &str, size: u64) {
    Mock::given(method("POST"))
        .and(path("/ftp-gov/request"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "item_name": item,
                "item_size": size,
            })),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ftp-gov/request"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ftp-gov/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upload_target": format!("{}/store", server.uri()),
        })))
        .mount(server)
        .await;
}

/// List service with one skipped site, one skipped directory and one manifest
pub async fn mount_list_service(server: &MockServer, item_path: &str, manifest: &str) {
    Mock::given(method("GET"))
        .and(path("/lists/skipped_sites"))
        .respond_with(ResponseTemplate::new(200).set_body_string("/pub/private\n"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lists/skipped_dirs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ftp.example.gov:/pub/data/foo/private\n"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/ftplists{item_path}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest.to_string()))
        .mount(server)
        .await;
}

/// Manifest of `urls` with the given declared size
pub fn manifest(total_size: u64, urls: &[&str]) -> String {
    let mut body = format!("ITEM_TOTAL_SIZE: {total_size}\n");
    for url in urls {
        body.push_str(url);
        body.push('\n');
    }
    body
}
