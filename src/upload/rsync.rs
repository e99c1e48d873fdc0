//! rsync-based uploader using the external `rsync` binary

use super::Uploader;
use crate::error::{ProcessError, UploadError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// rsync exit codes caused by the network rather than the remote store:
/// socket I/O (10), protocol stream (12), data timeout (30), connect timeout (35)
pub const TRANSPORT_EXIT_CODES: [i32; 4] = [10, 12, 30, 35];

/// Uploads by running `rsync <args> <files...> <target>`
///
/// # Examples
///
/// ```no_run
/// use ftp_harvest::upload::{RsyncUploader, Uploader};
/// use std::path::PathBuf;
///
/// # async fn example() -> ftp_harvest::Result<()> {
/// let uploader = RsyncUploader::from_path(vec!["--recursive".into()])?;
/// uploader
///     .upload("rsync://upload.example/ftp-gov/", &[PathBuf::from("data/x.warc.gz")])
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct RsyncUploader {
    binary_path: PathBuf,
    args: Vec<String>,
}

impl RsyncUploader {
    /// Create an uploader with an explicit binary path
    pub fn new(binary_path: PathBuf, args: Vec<String>) -> Self {
        Self { binary_path, args }
    }

    /// Find `rsync` in PATH
    ///
    /// A missing binary is fatal for the process: nothing can ever be uploaded.
    pub fn from_path(args: Vec<String>) -> crate::Result<Self> {
        let binary_path = which::which("rsync").map_err(|e| ProcessError::MissingTool {
            tool: "rsync".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(binary_path, args))
    }

    /// Binary this uploader runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

/// Map an rsync exit status to an upload result
pub fn classify_exit(target: &str, code: Option<i32>, stderr: &str) -> Result<(), UploadError> {
    let reason = |what: String| {
        let detail = stderr.trim();
        if detail.is_empty() {
            what
        } else {
            format!("{what}: {detail}")
        }
    };
    match code {
        Some(0) => Ok(()),
        Some(code) if TRANSPORT_EXIT_CODES.contains(&code) => Err(UploadError::Transport {
            target: target.to_string(),
            reason: reason(format!("rsync exit code {code}")),
        }),
        Some(code) => Err(UploadError::Rejected {
            target: target.to_string(),
            reason: reason(format!("rsync exit code {code}")),
        }),
        None => Err(UploadError::Transport {
            target: target.to_string(),
            reason: reason("rsync killed by signal".to_string()),
        }),
    }
}

#[async_trait]
impl Uploader for RsyncUploader {
    async fn upload(&self, target: &str, files: &[PathBuf]) -> Result<(), UploadError> {
        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .args(files)
            .arg(target)
            .output()
            .await
            .map_err(|e| UploadError::Transport {
                target: target.to_string(),
                reason: format!("failed to execute rsync: {e}"),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        classify_exit(target, output.status.code(), &stderr)
    }

    fn name(&self) -> &'static str {
        "rsync"
    }
}
