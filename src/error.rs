//! Error types for ftp-harvest
//!
//! This module provides error handling for the crate, including:
//! - Domain-specific error types (Fetch, Item, Upload, Process)
//! - The operator-facing taxonomy ([`ErrorClass`]) that decides whether a failure is retried,
//!   skipped, fatal to one work item, or fatal to the whole process
//! - Context information (URL, status code, attempt counts, sizes, paths)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ftp-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ftp-harvest
///
/// This is the primary error type used throughout the crate. Each variant includes
/// contextual information to help diagnose issues without re-running the item.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "upload_concurrency")
        key: Option<String>,
    },

    /// Resource fetch failed terminally
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Work item rejected or failed
    #[error("item error: {0}")]
    Item(#[from] ItemError),

    /// Upload to the remote store failed
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Process-wide precondition failed
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// Tracker protocol error
    #[error("tracker error: {message}")]
    Tracker {
        /// What went wrong
        message: String,
        /// HTTP status returned by the tracker, if any
        status: Option<u16>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// Shutdown in progress - not claiming new items
    #[error("shutdown in progress: not claiming new items")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Terminal failures of a single resource fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL kept producing non-terminal outcomes until the attempt budget ran out
    #[error("{url}: gave up after {attempts} consecutive failed attempts (last status: {last})")]
    RetriesExhausted {
        /// The URL being fetched
        url: String,
        /// Number of consecutive non-terminal outcomes observed
        attempts: u32,
        /// Last status code or transport error message
        last: String,
    },

    /// The existence oracle answered with a status other than 200 or 404
    #[error("existence oracle {oracle_url} returned unexpected status {status} while checking {url}")]
    OracleMisconfigured {
        /// The manifest URL of the oracle
        oracle_url: String,
        /// The unexpected HTTP status
        status: u16,
        /// The resource URL being classified
        url: String,
    },

    /// Writing an accepted resource into the container failed
    #[error("failed to archive {url}: {reason}")]
    ArchiveWrite {
        /// The resource URL being archived
        url: String,
        /// Underlying failure
        reason: String,
    },
}

/// Errors that reject or abort one work item
#[derive(Debug, Error)]
pub enum ItemError {
    /// The item name is not of the form `<category>:<relative-path>`
    #[error("invalid item name {name:?}: expected <category>:<relative-path>")]
    InvalidName {
        /// The offending item name
        name: String,
    },

    /// The item matches the global skip-list
    #[error("item {item} is skip-listed (prefix {prefix:?})")]
    SkipListed {
        /// The item name
        item: String,
        /// The skip-list entry that matched
        prefix: String,
    },

    /// The item declares more bytes than the configured ceiling
    #[error("item {item} is {size} bytes, larger than the {ceiling} byte ceiling")]
    Oversized {
        /// The item name
        item: String,
        /// Declared total size in bytes
        size: u64,
        /// Configured ceiling in bytes
        ceiling: u64,
    },

    /// A candidate URL contains a fragment character after decoding
    #[error("{url} contains a bad character ('#')")]
    BadCharacter {
        /// The decoded URL
        url: String,
    },

    /// The item manifest could not be parsed
    #[error("malformed manifest at {url}: {reason}")]
    MalformedManifest {
        /// The manifest URL
        url: String,
        /// What was wrong with it
        reason: String,
    },

    /// A listing endpoint returned something other than 200
    #[error("list service returned status {status} for {url}")]
    ListService {
        /// The listing URL
        url: String,
        /// The HTTP status received
        status: u16,
    },

    /// An alternate container extension was found, which means the archive writer is misconfigured
    #[error("unexpected container file {path}: archives must be written compressed")]
    UnexpectedExtension {
        /// The unexpected file
        path: PathBuf,
    },

    /// Container or index file is missing from the working directory
    #[error("expected output file {path} is missing")]
    MissingOutput {
        /// The missing file
        path: PathBuf,
    },

    /// Moving output files into the shared data directory failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// The file being moved
        source_path: PathBuf,
        /// Where it was going
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// The finalized container or its index could not be parsed
    #[error("corrupt container {path}: {reason}")]
    CorruptContainer {
        /// The container path
        path: PathBuf,
        /// Parser failure
        reason: String,
    },
}

/// Upload failures, split by whether the transport or the remote store is at fault
#[derive(Debug, Error)]
pub enum UploadError {
    /// Connection, protocol or timeout failure (retryable)
    #[error("upload transport failure to {target}: {reason}")]
    Transport {
        /// Upload target
        target: String,
        /// What failed
        reason: String,
    },

    /// The remote store refused the upload (not retryable)
    #[error("upload rejected by {target}: {reason}")]
    Rejected {
        /// Upload target
        target: String,
        /// Why it was refused
        reason: String,
    },
}

/// Failures that invalidate the whole run, not just one item
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Well-known hostnames resolved to too few distinct addresses
    #[error(
        "network health check failed: {distinct} distinct addresses for {expected} hostnames; you are behind a firewall or proxy"
    )]
    NetworkIntercepted {
        /// Number of distinct addresses resolved
        distinct: usize,
        /// Number of distinct addresses expected
        expected: usize,
    },

    /// A required external tool is not installed
    #[error("required tool {tool} not found: {reason}")]
    MissingTool {
        /// Tool name
        tool: String,
        /// Lookup failure
        reason: String,
    },
}

/// Operator-facing failure taxonomy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried with bounded attempts or backoff
    Transient,
    /// Confirmed-absent resource; processing continues
    PermanentSkip,
    /// Aborts the current work item; working state is left for diagnosis
    FatalItem,
    /// Aborts the entire run
    FatalProcess,
}

impl Error {
    /// Create a configuration error tied to a key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Create a tracker error
    pub fn tracker(message: impl Into<String>, status: Option<u16>) -> Self {
        Error::Tracker {
            message: message.into(),
            status,
        }
    }

    /// Classify this error into the operator-facing taxonomy
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Process(_) | Error::Config { .. } | Error::ShuttingDown => {
                ErrorClass::FatalProcess
            }
            Error::Upload(UploadError::Transport { .. }) => ErrorClass::Transient,
            Error::Network(e) if e.is_timeout() || e.is_connect() => ErrorClass::Transient,
            Error::Tracker { status, .. } => match status {
                None => ErrorClass::Transient,
                Some(code) if *code >= 500 => ErrorClass::Transient,
                Some(_) => ErrorClass::FatalItem,
            },
            Error::Fetch(_)
            | Error::Item(_)
            | Error::Upload(UploadError::Rejected { .. })
            | Error::Network(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::InsufficientSpace { .. }
            | Error::DiskSpaceCheckFailed(_)
            | Error::Other(_) => ErrorClass::FatalItem,
        }
    }

    /// Whether this error must stop the whole run
    pub fn is_fatal_process(&self) -> bool {
        self.class() == ErrorClass::FatalProcess
    }
}
