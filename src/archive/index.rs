//! Sidecar index of resource records
//!
//! One line per record, fields `digest;record-id;timestamp;target-uri`, lines joined by `\n`
//! with no trailing newline. The index is written once, after the container is finalized.

use super::reader::WarcReader;
use crate::error::{Error, ItemError, Result};
use crate::types::ResourceRecord;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const FIELD_SEPARATOR: char = ';';

/// Reads and writes sidecar index files
pub struct SidecarIndex;

impl SidecarIndex {
    /// Scan a finalized container for `resource` records whose target URI uses `scheme`
    ///
    /// Runs on the blocking pool; only record headers are read, blocks are skipped.
    pub async fn extract(container: &Path, scheme: &str) -> Result<Vec<ResourceRecord>> {
        let container = container.to_path_buf();
        let scheme = scheme.to_string();
        tokio::task::spawn_blocking(move || Self::extract_blocking(&container, &scheme))
            .await
            .map_err(|e| Error::Other(format!("index extraction task panicked: {e}")))?
    }

    fn extract_blocking(container: &Path, scheme: &str) -> Result<Vec<ResourceRecord>> {
        let prefix = format!("{}://", scheme.to_ascii_lowercase());
        let mut records = Vec::new();

        for record in WarcReader::open(container)?.headers_only() {
            let record = record?;
            if !record
                .record_type()
                .is_some_and(|t| t.eq_ignore_ascii_case("resource"))
            {
                continue;
            }
            let Some(target) = record.target_uri() else {
                continue;
            };
            if !target.to_ascii_lowercase().starts_with(&prefix) {
                continue;
            }

            let field = |name: &str| {
                record
                    .header(name)
                    .map(str::to_string)
                    .ok_or_else(|| ItemError::CorruptContainer {
                        path: container.to_path_buf(),
                        reason: format!("resource record for {target} has no {name}"),
                    })
            };
            records.push(ResourceRecord {
                digest: field("WARC-Block-Digest")?,
                record_id: field("WARC-Record-ID")?,
                timestamp: field("WARC-Date")?,
                target_uri: target.to_string(),
            });
        }
        Ok(records)
    }

    /// Render records in index format
    pub fn render(records: &[ResourceRecord]) -> String {
        records
            .iter()
            .map(|r| {
                [
                    r.digest.as_str(),
                    r.record_id.as_str(),
                    r.timestamp.as_str(),
                    r.target_uri.as_str(),
                ]
                .join(";")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse index text; the target URI may itself contain `;`
    ///
    /// A line with fewer than four fields, or an empty field, is reported with its line number.
    pub fn parse(text: &str) -> std::result::Result<Vec<ResourceRecord>, String> {
        text.split('\n')
            .enumerate()
            .filter(|(_, line)| !line.is_empty())
            .map(|(n, line)| {
                let fields: Vec<&str> = line.splitn(4, FIELD_SEPARATOR).collect();
                match fields.as_slice() {
                    [digest, record_id, timestamp, target_uri]
                        if fields.iter().all(|f| !f.is_empty()) =>
                    {
                        Ok(ResourceRecord {
                            digest: digest.to_string(),
                            record_id: record_id.to_string(),
                            timestamp: timestamp.to_string(),
                            target_uri: target_uri.to_string(),
                        })
                    }
                    _ => Err(format!("line {} is not a four-field record: {line:?}", n + 1)),
                }
            })
            .collect()
    }

    /// Write the index file on the blocking pool, replacing any previous content
    pub async fn write(path: &Path, records: &[ResourceRecord]) -> Result<()> {
        let path: PathBuf = path.to_path_buf();
        let text = Self::render(records);
        tokio::task::spawn_blocking(move || std::fs::write(&path, text))
            .await
            .map_err(|e| Error::Other(format!("index write task panicked: {e}")))??;
        Ok(())
    }

    /// Read an index file
    ///
    /// # Errors
    ///
    /// [`ItemError::MissingOutput`] if the file does not exist, [`ItemError::CorruptContainer`] if
    /// it is not valid UTF-8 or has a malformed line, and [`Error::Io`] for any other read failure.
    pub fn read(path: &Path) -> Result<Vec<ResourceRecord>> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ItemError::MissingOutput {
                path: path.to_path_buf(),
            }
            .into(),
            ErrorKind::InvalidData => ItemError::CorruptContainer {
                path: path.to_path_buf(),
                reason: format!("index is not UTF-8: {e}"),
            }
            .into(),
            _ => Error::Io(e),
        })?;
        Self::parse(&text).map_err(|reason| {
            ItemError::CorruptContainer {
                path: path.to_path_buf(),
                reason,
            }
            .into()
        })
    }
}
