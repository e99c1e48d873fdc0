//! Archival container and sidecar index
//!
//! - [`ArchiveWriter`]: append-only gzip-per-record WARC writer, owned by one item
//! - [`WarcReader`]: record iterator over a finalized container
//! - [`SidecarIndex`]: the `;`-joined resource record index written next to the container

mod index;
mod reader;
mod writer;

pub use index::SidecarIndex;
pub use reader::{WarcReader, WarcRecord};
pub use writer::{AppendedRecord, ArchiveWriter, RecordType, WarcInfo, block_digest};
