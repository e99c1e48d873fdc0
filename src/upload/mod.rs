//! Upload transports
//!
//! An [`Uploader`] moves an item's container and index to the target the tracker hands out.
//! Failures are split into transport errors (retried by the pipeline) and rejections by the
//! remote store (not retried).

mod http;
mod rsync;

pub use http::HttpUploader;
pub use rsync::{RsyncUploader, TRANSPORT_EXIT_CODES, classify_exit};

use crate::config::{UploadConfig, UploadMethod};
use crate::error::UploadError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Moves finished files to remote storage
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `files` to `target`
    async fn upload(&self, target: &str, files: &[PathBuf]) -> Result<(), UploadError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Build the configured uploader
///
/// # Errors
///
/// A missing `rsync` binary is a process-fatal [`crate::error::ProcessError::MissingTool`].
pub fn from_config(
    config: &UploadConfig,
    client: reqwest::Client,
) -> crate::Result<Arc<dyn Uploader>> {
    match config.method {
        UploadMethod::Rsync => {
            let uploader = match &config.rsync_path {
                Some(path) => RsyncUploader::new(path.clone(), config.rsync_extra_args.clone()),
                None => RsyncUploader::from_path(config.rsync_extra_args.clone())?,
            };
            tracing::debug!(binary = %uploader.binary_path().display(), "using rsync uploader");
            Ok(Arc::new(uploader))
        }
        UploadMethod::Http => Ok(Arc::new(HttpUploader::new(client))),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_rsync_path_skips_discovery() {
        let config = UploadConfig {
            rsync_path: Some(PathBuf::from("/opt/bin/rsync")),
            ..UploadConfig::default()
        };
        let uploader = from_config(&config, reqwest::Client::new()).unwrap();
        assert_eq!(uploader.name(), "rsync");
    }

    #[test]
    fn http_method_needs_no_binary() {
        let config = UploadConfig {
            method: UploadMethod::Http,
            ..UploadConfig::default()
        };
        assert_eq!(
            from_config(&config, reqwest::Client::new()).unwrap().name(),
            "http"
        );
    }
}
