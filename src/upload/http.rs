//! HTTP PUT uploader
//!
//! Files are streamed from disk, never read whole into memory. The client should bound connecting
//! only: a total request timeout would cut off a large container that is still uploading.

use super::Uploader;
use crate::error::UploadError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::io::ReaderStream;

/// Uploads each file with `PUT <target>/<file name>`
///
/// Connection failures and 5xx answers are transport failures; 4xx answers are rejections.
#[derive(Clone, Debug)]
pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    /// Wrap a configured client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, target: &str, files: &[PathBuf]) -> Result<(), UploadError> {
        let base = target.trim_end_matches('/');
        for file in files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| UploadError::Rejected {
                    target: target.to_string(),
                    reason: format!("{} has no file name", file.display()),
                })?;
            let unreadable = |e: std::io::Error| UploadError::Rejected {
                target: target.to_string(),
                reason: format!("cannot read {}: {e}", file.display()),
            };
            let source = tokio::fs::File::open(file).await.map_err(unreadable)?;
            let length = source.metadata().await.map_err(unreadable)?.len();
            let url = format!("{base}/{}", urlencoding::encode(&name));

            let response = self
                .client
                .put(&url)
                .header(reqwest::header::CONTENT_LENGTH, length)
                .body(reqwest::Body::wrap_stream(ReaderStream::new(source)))
                .send()
                .await
                .map_err(|e| UploadError::Transport {
                    target: url.clone(),
                    reason: e.to_string(),
                })?;

            let status = response.status();
            if status.is_server_error() {
                return Err(UploadError::Transport {
                    target: url,
                    reason: format!("status {status}"),
                });
            }
            if !status.is_success() {
                return Err(UploadError::Rejected {
                    target: url,
                    reason: format!("status {status}"),
                });
            }
            tracing::debug!(url = %url, bytes = length, "uploaded file");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
