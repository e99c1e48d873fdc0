//! Moving finished outputs into the shared data directory
//!
//! Container and index move as a pair: if the second rename fails the first is rolled back, so the
//! data directory never holds one without the other.

use crate::error::{ItemError, Result};
use crate::types::ItemPaths;
use std::path::{Path, PathBuf};

/// Final locations of a relocated item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelocatedFiles {
    /// Container in the data directory
    pub container: PathBuf,
    /// Index in the data directory
    pub index: PathBuf,
}

impl RelocatedFiles {
    /// Both files, container first
    pub fn to_vec(&self) -> Vec<PathBuf> {
        vec![self.container.clone(), self.index.clone()]
    }
}

/// Move the container and index out of the working directory, then delete it
///
/// # Errors
///
/// - [`ItemError::UnexpectedExtension`] if an uncompressed container exists; nothing is moved
/// - [`ItemError::MissingOutput`] if the container or index is missing; nothing is moved
/// - [`ItemError::MoveFailed`] if a rename fails; the working directory is left as it was
pub async fn relocate(paths: &ItemPaths) -> Result<RelocatedFiles> {
    let uncompressed = paths.uncompressed_container();
    if tokio::fs::try_exists(&uncompressed).await? {
        return Err(ItemError::UnexpectedExtension { path: uncompressed }.into());
    }

    let container = paths.container();
    let index = paths.index();
    for path in [&container, &index] {
        if !tokio::fs::try_exists(path).await? {
            return Err(ItemError::MissingOutput { path: path.clone() }.into());
        }
    }

    let relocated = RelocatedFiles {
        container: paths.relocated_container(),
        index: paths.relocated_index(),
    };

    rename(&container, &relocated.container).await?;
    if let Err(e) = rename(&index, &relocated.index).await {
        if let Err(rollback) = tokio::fs::rename(&relocated.container, &container).await {
            tracing::error!(
                path = %relocated.container.display(),
                error = %rollback,
                "failed to roll back container move"
            );
        }
        return Err(e);
    }

    if let Err(e) = tokio::fs::remove_dir_all(&paths.item_dir).await {
        tracing::warn!(
            dir = %paths.item_dir.display(),
            error = %e,
            "failed to remove working directory after relocation"
        );
    }
    Ok(relocated)
}

async fn rename(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::rename(from, to).await.map_err(|e| {
        ItemError::MoveFailed {
            source_path: from.to_path_buf(),
            dest_path: to.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}
