//! Configuration types for ftp-harvest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Highest allowed number of simultaneous uploads
pub const MAX_UPLOAD_CONCURRENCY: usize = 20;

/// Item processing knobs (retry budget, size ceiling, service endpoints)
///
/// This is the explicit configuration handed to the item pipeline at construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Consecutive non-terminal outcomes tolerated per URL before the item aborts (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Largest declared item size accepted, in bytes (default: 10 GiB)
    #[serde(default = "default_size_ceiling")]
    pub size_ceiling: u64,

    /// Base URL of the existence oracle (`<base>/<host>_{dir,file}_not_found`)
    #[serde(default = "default_oracle_base_url")]
    pub oracle_base_url: String,

    /// Base URL of the listing service (`skipped_sites`, `skipped_dirs`, item manifests)
    #[serde(default = "default_list_service_base_url")]
    pub list_service_base_url: String,

    /// Base URL the item manifests are served from (None = the listing service base)
    #[serde(default = "default_manifest_base_url")]
    pub manifest_base_url: Option<String>,

    /// Maximum simultaneous uploads, 1-20 (default: 20)
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    /// URL scheme of the resources that are archived (default: "ftp")
    #[serde(default = "default_archived_scheme")]
    pub archived_scheme: String,

    /// Pause between retries of the same URL (default: 5 seconds)
    #[serde(default = "default_retry_wait", with = "duration_serde")]
    pub retry_wait: Duration,

    /// Timeout for service calls, and the idle timeout of fetches and uploads (default: 60 seconds)
    ///
    /// Fetches and uploads are bounded per step (connect, reply, body chunk), never as a whole.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            size_ceiling: default_size_ceiling(),
            oracle_base_url: default_oracle_base_url(),
            list_service_base_url: default_list_service_base_url(),
            manifest_base_url: default_manifest_base_url(),
            upload_concurrency: default_upload_concurrency(),
            archived_scheme: default_archived_scheme(),
            retry_wait: default_retry_wait(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl PipelineConfig {
    /// Base URL item manifests are fetched from
    pub fn manifest_base(&self) -> &str {
        self.manifest_base_url
            .as_deref()
            .unwrap_or(&self.list_service_base_url)
    }
}

/// Tracker identity (where to claim work and who is claiming it)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracker project URL, e.g. `http://tracker.example.org/ftp-gov`
    #[serde(default = "default_tracker_url")]
    pub url: String,

    /// Project identifier
    #[serde(default = "default_project")]
    pub project: String,

    /// Pipeline version reported to the tracker and written into every container
    #[serde(default = "default_version")]
    pub version: String,

    /// Downloader (operator) name
    #[serde(default = "default_downloader")]
    pub downloader: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: default_tracker_url(),
            project: default_project(),
            version: default_version(),
            downloader: default_downloader(),
        }
    }
}

/// Filesystem layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Shared data directory; item working directories live beneath it (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Prefix of every container/index base name (default: "ftp-gov")
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

/// Network health check (detects DNS interception by proxies)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Run the check at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hostnames that must all resolve to distinct addresses
    #[serde(default = "default_health_hostnames")]
    pub hostnames: Vec<String>,

    /// Check once every this many items (default: 10)
    #[serde(default = "default_health_interval")]
    pub interval_items: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hostnames: default_health_hostnames(),
            interval_items: default_health_interval(),
        }
    }
}

/// How finished items reach the remote store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMethod {
    /// rsync to the target handed out by the tracker (default)
    #[default]
    Rsync,
    /// HTTP PUT of each file below the target URL
    Http,
}

/// Upload configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Transport used for uploads
    #[serde(default)]
    pub method: UploadMethod,

    /// Path to the rsync executable (searched in PATH if None)
    #[serde(default)]
    pub rsync_path: Option<PathBuf>,

    /// Extra arguments appended to every rsync invocation
    #[serde(default = "default_rsync_extra_args")]
    pub rsync_extra_args: Vec<String>,

    /// Retry policy for transport failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            method: UploadMethod::default(),
            rsync_path: None,
            rsync_extra_args: default_rsync_extra_args(),
            retry: RetryConfig::default(),
        }
    }
}

/// Worker loop configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WarriorConfig {
    /// Items processed concurrently (default: 2)
    #[serde(default = "default_concurrent_items")]
    pub concurrent_items: usize,

    /// Delay before asking the tracker again when no work is available (default: 30 seconds)
    #[serde(default = "default_idle_delay", with = "duration_serde")]
    pub idle_delay: Duration,
}

impl Default for WarriorConfig {
    fn default() -> Self {
        Self {
            concurrent_items: default_concurrent_items(),
            idle_delay: default_idle_delay(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Main configuration
///
/// Every section has defaults, so an empty TOML document is a valid configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Item processing knobs
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Tracker identity
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Filesystem layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Network health check
    #[serde(default)]
    pub health: HealthCheckConfig,

    /// Upload transport and retry policy
    #[serde(default)]
    pub upload: UploadConfig,

    /// Tracker report retry policy
    #[serde(default)]
    pub report_retry: RetryConfig,

    /// Worker loop
    #[serde(default)]
    pub warrior: WarriorConfig,
}

impl Config {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config {
            message: format!("invalid TOML: {e}"),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file and validate it
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {e}", path.display()),
            key: None,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if !(1..=MAX_UPLOAD_CONCURRENCY).contains(&p.upload_concurrency) {
            return Err(Error::config(
                "upload_concurrency",
                format!(
                    "must be between 1 and {MAX_UPLOAD_CONCURRENCY}, got {}",
                    p.upload_concurrency
                ),
            ));
        }
        if p.max_retries == 0 {
            return Err(Error::config("max_retries", "must be at least 1"));
        }
        for (key, value) in [
            ("oracle_base_url", p.oracle_base_url.as_str()),
            ("list_service_base_url", p.list_service_base_url.as_str()),
            ("tracker.url", self.tracker.url.as_str()),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::config(key, format!("invalid URL {value:?}: {e}")))?;
        }
        if p.archived_scheme.is_empty() {
            return Err(Error::config("archived_scheme", "must not be empty"));
        }
        if self.tracker.downloader.trim().is_empty() {
            return Err(Error::config("tracker.downloader", "must not be empty"));
        }
        if self.warrior.concurrent_items == 0 {
            return Err(Error::config("warrior.concurrent_items", "must be at least 1"));
        }
        if self.health.enabled && self.health.interval_items == 0 {
            return Err(Error::config("health.interval_items", "must be at least 1"));
        }
        Ok(())
    }

    /// Shared data directory
    pub fn data_dir(&self) -> &PathBuf {
        &self.paths.data_dir
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    5
}

fn default_size_ceiling() -> u64 {
    10 * 1024 * 1024 * 1024 // 10 GiB
}

fn default_oracle_base_url() -> String {
    "http://archive.org/download/ftp-gov-not-found".into()
}

fn default_list_service_base_url() -> String {
    "https://raw.githubusercontent.com/ArchiveTeam/ftp-items/master".into()
}

fn default_manifest_base_url() -> Option<String> {
    Some("http://master.newsbuddy.net/ftplists".into())
}

fn default_upload_concurrency() -> usize {
    MAX_UPLOAD_CONCURRENCY
}

fn default_archived_scheme() -> String {
    "ftp".into()
}

fn default_retry_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_tracker_url() -> String {
    "http://tracker.archiveteam.org/ftp-gov".into()
}

fn default_project() -> String {
    "ftp-gov".into()
}

fn default_version() -> String {
    "20170226.01".into()
}

fn default_downloader() -> String {
    "anonymous".into()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_file_prefix() -> String {
    "ftp-gov".into()
}

fn default_health_hostnames() -> Vec<String> {
    vec![
        "twitter.com".into(),
        "facebook.com".into(),
        "youtube.com".into(),
        "microsoft.com".into(),
        "icanhas.cheezburger.com".into(),
        "archiveteam.org".into(),
    ]
}

fn default_health_interval() -> u64 {
    10
}

fn default_rsync_extra_args() -> Vec<String> {
    vec![
        "--recursive".into(),
        "--partial".into(),
        "--partial-dir".into(),
        ".rsync-tmp".into(),
    ]
}

fn default_concurrent_items() -> usize {
    2
}

fn default_idle_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.pipeline.max_retries, 5);
        assert_eq!(config.pipeline.size_ceiling, 10_737_418_240);
        assert_eq!(config.pipeline.upload_concurrency, 20);
        assert_eq!(config.pipeline.archived_scheme, "ftp");
        assert_eq!(config.health.hostnames.len(), 6);
        assert_eq!(config.upload.method, UploadMethod::Rsync);
    }

    #[test]
    fn toml_overrides_nested_sections() {
        let text = r#"
            [pipeline]
            upload_concurrency = 4
            retry_wait = 1
            oracle_base_url = "http://oracle.test/items"

            [tracker]
            downloader = "alice"

            [paths]
            data_dir = "/var/lib/harvest"

            [upload]
            method = "http"
        "#;

        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.pipeline.upload_concurrency, 4);
        assert_eq!(config.pipeline.retry_wait, Duration::from_secs(1));
        assert_eq!(config.pipeline.oracle_base_url, "http://oracle.test/items");
        assert_eq!(config.tracker.downloader, "alice");
        assert_eq!(config.data_dir(), &PathBuf::from("/var/lib/harvest"));
        assert_eq!(config.upload.method, UploadMethod::Http);
    }

    #[test]
    fn upload_concurrency_outside_range_is_rejected() {
        for bad in [0, 21, 100] {
            let mut config = Config::default();
            config.pipeline.upload_concurrency = bad;
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, Error::Config { ref key, .. } if key.as_deref() == Some("upload_concurrency")),
                "{bad} should be rejected, got {err:?}"
            );
        }

        for good in [1, 20] {
            let mut config = Config::default();
            config.pipeline.upload_concurrency = good;
            assert!(config.validate().is_ok(), "{good} should be accepted");
        }
    }

    #[test]
    fn invalid_service_url_is_rejected() {
        let mut config = Config::default();
        config.pipeline.list_service_base_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn manifest_base_falls_back_to_list_service() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.manifest_base(), "http://master.newsbuddy.net/ftplists");

        config.manifest_base_url = None;
        assert_eq!(config.manifest_base(), config.list_service_base_url);
    }

    #[test]
    fn retry_config_durations_serialize_as_seconds() {
        let retry = RetryConfig::default();
        let json = serde_json::to_value(&retry).unwrap();
        assert_eq!(json["initial_delay"], 1);
        assert_eq!(json["max_delay"], 60);
    }
}
