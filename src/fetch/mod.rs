//! Resource fetching
//!
//! - [`Fetcher`] and its FTP, HTTP and scheme-dispatching implementations
//! - [`RetryClassifier`]: turns each response or transport error into accept/skip/retry/abort
//! - [`ExistenceOracle`]: published "not found" error text used to recognise absent resources
//! - [`FetchSession`]: drives one URL to a terminal state

mod classifier;
mod fetcher;
mod ftp;
mod http;
pub mod oracle;
mod session;

pub use classifier::{Outcome, PERMANENT_SKIP_CODES, RetryClassifier, Verdict};
pub use fetcher::{FetchedResource, Fetcher, ResourceKind, SchemeFetcher, TransportError};
pub use ftp::FtpFetcher;
pub use http::HttpFetcher;
pub use oracle::{ExistenceOracle, OracleAnswer, PathKind};
pub use session::{FetchSession, SessionContext};
