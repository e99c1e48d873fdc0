//! Tracker statistics for a finished container

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::types::{ItemName, ItemStats, StatsFingerprint};
use crate::utils::environment_fingerprint;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// Name and version of the fetching software, as reported to the tracker
pub const FETCH_TOOL: &str = concat!("ftp-harvest/", env!("CARGO_PKG_VERSION"));

/// Compute the statistics reported for `item` from its finalized container
///
/// Hashing a container of several gigabytes takes a while, so it runs on the blocking pool.
pub async fn extract_stats(
    container: &Path,
    item: &ItemName,
    tracker: &TrackerConfig,
) -> Result<ItemStats> {
    let container = container.to_path_buf();
    let (size, digest) = tokio::task::spawn_blocking(move || -> Result<(u64, String)> {
        let mut file = std::fs::File::open(&container)?;
        let mut hasher = Sha256::new();
        let size = std::io::copy(&mut file, &mut hasher)?;
        Ok((size, hex::encode(hasher.finalize())))
    })
    .await
    .map_err(|e| Error::Other(format!("container hashing task panicked: {e}")))??;

    let mut bytes = BTreeMap::new();
    bytes.insert("data".to_string(), size);

    Ok(ItemStats {
        items: vec![item.to_string()],
        bytes,
        version: tracker.version.clone(),
        downloader: tracker.downloader.clone(),
        id: StatsFingerprint {
            container_hash: digest,
            fetch_tool: FETCH_TOOL.to_string(),
            environment: environment_fingerprint(),
        },
    })
}
