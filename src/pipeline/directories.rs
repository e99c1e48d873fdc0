//! Working directory preparation

use crate::error::Result;
use crate::types::{ItemName, ItemPaths};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Create a clean working directory for `item` beneath `data_dir`
///
/// A directory left behind by an earlier aborted run is removed first. The output base name is
/// `<prefix>-<escaped item>-<YYYYmmdd-HHMMSS>`, and empty container and index files are created so
/// both exist for the whole fetch phase.
pub async fn prepare_directories(
    data_dir: &Path,
    prefix: &str,
    item: &ItemName,
    now: DateTime<Utc>,
) -> Result<ItemPaths> {
    let escaped = item.escaped();
    let item_dir = data_dir.join(&escaped);

    if tokio::fs::try_exists(&item_dir).await? {
        tracing::warn!(item = %item, dir = %item_dir.display(), "removing stale working directory");
        tokio::fs::remove_dir_all(&item_dir).await?;
    }
    tokio::fs::create_dir_all(&item_dir).await?;

    let paths = ItemPaths {
        data_dir: data_dir.to_path_buf(),
        item_dir,
        file_base: format!("{prefix}-{escaped}-{}", now.format("%Y%m%d-%H%M%S")),
    };
    tokio::fs::File::create(paths.container()).await?;
    tokio::fs::File::create(paths.index()).await?;

    tracing::debug!(item = %item, base = %paths.file_base, "prepared working directory");
    Ok(paths)
}
