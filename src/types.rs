//! Core types for ftp-harvest

use crate::error::{ItemError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Name of a claimed work item: `<category>:<relative-path>`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemName {
    full: String,
    split: usize,
}

impl ItemName {
    /// Parse an item name, requiring a `:` separating category and path
    pub fn parse(name: &str) -> Result<Self> {
        match name.find(':') {
            Some(split) if split > 0 && split + 1 < name.len() => Ok(Self {
                full: name.to_string(),
                split,
            }),
            _ => Err(ItemError::InvalidName {
                name: name.to_string(),
            }
            .into()),
        }
    }

    /// Category part (before the first `:`)
    pub fn category(&self) -> &str {
        &self.full[..self.split]
    }

    /// Relative path part (after the first `:`)
    pub fn path(&self) -> &str {
        &self.full[self.split + 1..]
    }

    /// The full `<category>:<relative-path>` string
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// Filesystem-safe form: `:` and `/` replaced with `_`
    pub fn escaped(&self) -> String {
        self.full.replace([':', '/'], "_")
    }
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl TryFrom<String> for ItemName {
    type Error = crate::error::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ItemName> for String {
    fn from(name: ItemName) -> Self {
        name.full
    }
}

/// A claimed unit of work as handed out by the tracker
#[derive(Clone, Debug)]
pub struct ClaimedItem {
    /// Item name
    pub name: ItemName,
    /// Size hint from the tracker, if it sent one
    pub size: Option<u64>,
}

/// Working directory and output file locations of one item
#[derive(Clone, Debug)]
pub struct ItemPaths {
    /// Shared data directory
    pub data_dir: PathBuf,
    /// The item's private working directory
    pub item_dir: PathBuf,
    /// Base name of the container and index files (no extension)
    pub file_base: String,
}

/// Extension of the compressed container
pub const CONTAINER_EXTENSION: &str = "warc.gz";
/// Extension of an uncompressed container, which must never be produced
pub const UNCOMPRESSED_CONTAINER_EXTENSION: &str = "warc";
/// Extension of the sidecar index
pub const INDEX_EXTENSION: &str = "records";

impl ItemPaths {
    /// Container path inside the working directory
    pub fn container(&self) -> PathBuf {
        self.item_dir
            .join(format!("{}.{CONTAINER_EXTENSION}", self.file_base))
    }

    /// Uncompressed container path inside the working directory
    pub fn uncompressed_container(&self) -> PathBuf {
        self.item_dir
            .join(format!("{}.{UNCOMPRESSED_CONTAINER_EXTENSION}", self.file_base))
    }

    /// Index path inside the working directory
    pub fn index(&self) -> PathBuf {
        self.item_dir
            .join(format!("{}.{INDEX_EXTENSION}", self.file_base))
    }

    /// Container path after relocation
    pub fn relocated_container(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}.{CONTAINER_EXTENSION}", self.file_base))
    }

    /// Index path after relocation
    pub fn relocated_index(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}.{INDEX_EXTENSION}", self.file_base))
    }
}

/// Terminal (or pending) state of one URL's fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    /// Still being driven
    Pending,
    /// Fetched and archived
    Accepted,
    /// Confirmed absent upstream
    Skipped,
    /// Gave up; the item aborts
    Aborted,
}

/// Per-URL attempt state, owned by exactly one fetch session
#[derive(Clone, Debug)]
pub struct FetchAttempt {
    /// The URL being fetched
    pub url: url::Url,
    /// Consecutive non-terminal outcomes so far
    pub attempts: u32,
    /// Current state
    pub status: FetchStatus,
}

impl FetchAttempt {
    /// Fresh attempt state for a URL
    pub fn new(url: url::Url) -> Self {
        Self {
            url,
            attempts: 0,
            status: FetchStatus::Pending,
        }
    }
}

/// One archived resource as listed in the sidecar index
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Block digest, `algorithm:value`
    pub digest: String,
    /// Unique record id, `<urn:uuid:...>`
    pub record_id: String,
    /// Record timestamp as written in the container
    pub timestamp: String,
    /// The archived URI
    pub target_uri: String,
}

/// Pipeline stage, used in events and logs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// DNS interception check
    HealthCheck,
    /// Claim an item from the tracker
    Claim,
    /// Create the working directory and empty outputs
    PrepareDirectories,
    /// Fetch skip-lists and the item manifest
    ResolveManifest,
    /// Fetch every URL into the container
    Fetch,
    /// Compute tracker statistics
    ExtractStats,
    /// Build the sidecar index from the container
    ExtractRecordsInfo,
    /// Move outputs into the shared data directory
    Relocate,
    /// Upload outputs to the remote store
    Upload,
    /// Tell the tracker the item is done
    ReportDone,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::HealthCheck => "health_check",
            Stage::Claim => "claim",
            Stage::PrepareDirectories => "prepare_directories",
            Stage::ResolveManifest => "resolve_manifest",
            Stage::Fetch => "fetch",
            Stage::ExtractStats => "extract_stats",
            Stage::ExtractRecordsInfo => "extract_records_info",
            Stage::Relocate => "relocate",
            Stage::Upload => "upload",
            Stage::ReportDone => "report_done",
        };
        f.write_str(s)
    }
}

/// Statistics reported to the tracker for a finished item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
    /// Item names covered by this report
    pub items: Vec<String>,
    /// Byte counts per file group (`data` = the container)
    pub bytes: BTreeMap<String, u64>,
    /// Pipeline version
    pub version: String,
    /// Downloader name
    pub downloader: String,
    /// Accountability fingerprint
    pub id: StatsFingerprint,
}

/// Accountability fingerprint sent with every report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsFingerprint {
    /// SHA-256 of the finalized container
    pub container_hash: String,
    /// Name and version of the fetching software
    pub fetch_tool: String,
    /// Operating system and architecture
    pub environment: String,
}

/// Summary of a fully processed item
#[derive(Clone, Debug)]
pub struct ItemReport {
    /// Item name
    pub name: ItemName,
    /// URLs archived
    pub accepted: usize,
    /// URLs confirmed absent
    pub skipped: usize,
    /// Sidecar index lines written
    pub records: usize,
    /// Statistics sent to the tracker
    pub stats: ItemStats,
    /// Where the container ended up
    pub container: PathBuf,
    /// Where the index ended up
    pub index: PathBuf,
    /// When processing started
    pub started_at: DateTime<Utc>,
    /// When the tracker acknowledged completion
    pub finished_at: DateTime<Utc>,
}

/// Event emitted during the item lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An item was claimed from the tracker
    ItemClaimed {
        /// Item name
        item: String,
    },

    /// A pipeline stage started
    StageStarted {
        /// Item name
        item: String,
        /// The stage
        stage: Stage,
    },

    /// A URL will be fetched again
    RetryScheduled {
        /// Item name
        item: String,
        /// The URL
        url: String,
        /// Consecutive failed attempts so far
        attempt: u32,
    },

    /// A URL was fetched and archived
    ResourceAccepted {
        /// Item name
        item: String,
        /// The URL
        url: String,
    },

    /// A URL was confirmed absent and skipped
    ResourceSkipped {
        /// Item name
        item: String,
        /// The URL
        url: String,
    },

    /// Outputs reached the remote store
    ItemUploaded {
        /// Item name
        item: String,
    },

    /// The tracker acknowledged completion
    ItemDone {
        /// Item name
        item: String,
    },

    /// The item aborted
    ItemFailed {
        /// Item name
        item: String,
        /// Stage that failed
        stage: Stage,
        /// Error message
        error: String,
    },
}
