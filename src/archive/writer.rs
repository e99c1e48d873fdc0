//! Append-only WARC container writer
//!
//! Every record is its own gzip member, so a container truncated by a crash is still readable up
//! to the last complete record. The first record is always `warcinfo`.

use crate::error::{Error, FetchError, Result};
use crate::fetch::{FetchedResource, ResourceKind};
use crate::types::ResourceRecord;
use chrono::{SecondsFormat, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Record types this writer produces
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
    /// Container metadata
    Warcinfo,
    /// Raw payload of a non-HTTP retrieval
    Resource,
    /// Full HTTP response
    Response,
}

impl RecordType {
    /// Value of the `WARC-Type` header
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Warcinfo => "warcinfo",
            RecordType::Resource => "resource",
            RecordType::Response => "response",
        }
    }
}

/// Container-level metadata written into the `warcinfo` record
#[derive(Clone, Debug)]
pub struct WarcInfo {
    /// Software name and version
    pub software: String,
    /// Operator of the crawl
    pub operator: String,
    /// Item name
    pub item: String,
    /// Downloader name
    pub downloader: String,
    /// Pipeline version
    pub pipeline_version: String,
}

/// A record that has been appended
#[derive(Clone, Debug)]
pub struct AppendedRecord {
    /// Its `WARC-Type`
    pub record_type: RecordType,
    /// Index fields of the record
    pub record: ResourceRecord,
}

/// Writer owning one container file for the duration of an item
///
/// Compression and disk writes run on the blocking pool so a large record never stalls the other
/// items sharing the runtime. The file handle travels into each blocking task and back; if a task
/// panics the handle is lost and the writer refuses further records.
pub struct ArchiveWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    warcinfo_id: String,
    records: usize,
}

impl ArchiveWriter {
    /// Truncate `path` and start a container with a `warcinfo` record
    pub async fn create(path: &Path, info: &WarcInfo) -> Result<Self> {
        let path = path.to_path_buf();
        let info = info.clone();
        tokio::task::spawn_blocking(move || Self::create_blocking(path, &info))
            .await
            .map_err(|e| Error::Other(format!("container task panicked: {e}")))?
    }

    fn create_blocking(path: PathBuf, info: &WarcInfo) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let mut out = BufWriter::new(file);
        let warcinfo_id = new_record_id();

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let block = format!(
            "software: {}\r\nformat: WARC File Format 1.0\r\noperator: {}\r\nftp-harvest-item: {}\r\nftp-harvest-downloader: {}\r\nftp-harvest-version: {}\r\n",
            info.software, info.operator, info.item, info.downloader, info.pipeline_version
        );
        let headers = vec![
            ("WARC-Type", RecordType::Warcinfo.as_str().to_string()),
            ("WARC-Record-ID", warcinfo_id.clone()),
            ("WARC-Date", now_timestamp()),
            ("WARC-Filename", filename),
            ("Content-Type", "application/warc-fields".to_string()),
        ];
        write_record(&mut out, &headers, &[block.as_bytes()])?;

        Ok(Self {
            path,
            out: Some(out),
            warcinfo_id,
            records: 1,
        })
    }

    /// Append one fetched resource
    ///
    /// FTP payloads become `resource` records; HTTP exchanges become `response` records with the
    /// status line and headers in the block. The payload is moved in, not copied.
    pub async fn append(&mut self, resource: FetchedResource) -> Result<AppendedRecord> {
        let url = resource.url.to_string();
        let write_failed = |reason: String| {
            Error::Fetch(FetchError::ArchiveWrite {
                url: url.clone(),
                reason,
            })
        };

        let mut out = self
            .out
            .take()
            .ok_or_else(|| write_failed("container was closed by an earlier failure".into()))?;
        let warcinfo_id = self.warcinfo_id.clone();
        let (out, written) = tokio::task::spawn_blocking(move || {
            let written = write_resource(&mut out, &warcinfo_id, &resource);
            (out, written)
        })
        .await
        .map_err(|e| write_failed(format!("append task panicked: {e}")))?;
        self.out = Some(out);

        let (appended, bytes) = written.map_err(|e| write_failed(e.to_string()))?;
        self.records += 1;
        tracing::debug!(
            url = %url,
            record_type = appended.record_type.as_str(),
            bytes,
            "appended record"
        );
        Ok(appended)
    }

    /// Records written so far, including `warcinfo`
    pub fn records(&self) -> usize {
        self.records
    }

    /// Flush and close the container
    pub async fn finish(mut self) -> Result<PathBuf> {
        let out = self.out.take().ok_or_else(|| {
            Error::Other(format!(
                "container {} was closed by an earlier failure",
                self.path.display()
            ))
        })?;
        let path = self.path;
        tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let file = out.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            Ok(path)
        })
        .await
        .map_err(|e| Error::Other(format!("container task panicked: {e}")))?
    }
}

/// Write one resource as a record, returning its index fields and block length
fn write_resource(
    out: &mut BufWriter<File>,
    warcinfo_id: &str,
    resource: &FetchedResource,
) -> Result<(AppendedRecord, usize)> {
    let (record_type, prologue, content_type) = match resource.kind {
        ResourceKind::Ftp => (
            RecordType::Resource,
            Vec::new(),
            resource
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        ),
        ResourceKind::Http => (
            RecordType::Response,
            http_prologue(resource),
            "application/http; msgtype=response".to_string(),
        ),
    };
    let block = [prologue.as_slice(), resource.body.as_slice()];

    let mut hasher = Sha256::new();
    for part in block {
        hasher.update(part);
    }
    let record = ResourceRecord {
        digest: format!("sha256:{}", hex::encode(hasher.finalize())),
        record_id: new_record_id(),
        timestamp: now_timestamp(),
        target_uri: resource.url.to_string(),
    };
    let headers = vec![
        ("WARC-Type", record_type.as_str().to_string()),
        ("WARC-Record-ID", record.record_id.clone()),
        ("WARC-Date", record.timestamp.clone()),
        ("WARC-Target-URI", record.target_uri.clone()),
        ("WARC-Warcinfo-ID", warcinfo_id.to_string()),
        ("WARC-Block-Digest", record.digest.clone()),
        ("Content-Type", content_type),
    ];
    let bytes = write_record(out, &headers, &block)?;
    Ok((
        AppendedRecord {
            record_type,
            record,
        },
        bytes,
    ))
}

/// Compress one record as its own gzip member straight into `out`
fn write_record(
    out: &mut BufWriter<File>,
    headers: &[(&str, String)],
    block: &[&[u8]],
) -> Result<usize> {
    let length: usize = block.iter().map(|part| part.len()).sum();
    let mut head = String::from("WARC/1.0\r\n");
    for (name, value) in headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str(&format!("Content-Length: {length}\r\n\r\n"));

    let mut member = GzEncoder::new(&mut *out, Compression::default());
    member.write_all(head.as_bytes())?;
    for part in block {
        member.write_all(part)?;
    }
    member.write_all(b"\r\n\r\n")?;
    member.finish()?;
    Ok(length)
}

/// Status line and headers preceding the body of a `response` block
fn http_prologue(resource: &FetchedResource) -> Vec<u8> {
    let mut prologue = format!("HTTP/1.1 {} {}\r\n", resource.status, resource.reason);
    for (name, value) in &resource.headers {
        prologue.push_str(&format!("{name}: {value}\r\n"));
    }
    prologue.push_str("\r\n");
    prologue.into_bytes()
}

fn new_record_id() -> String {
    format!("<urn:uuid:{}>", uuid::Uuid::new_v4())
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `sha256:<hex>` digest of a record block
pub fn block_digest(block: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(block)))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::WarcReader;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;
    use tempfile::TempDir;
    use url::Url;

    fn info() -> WarcInfo {
        WarcInfo {
            software: "ftp-harvest/0.1.0".into(),
            operator: "Archive Team".into(),
            item: "noaa:/pub/data/foo".into(),
            downloader: "tester".into(),
            pipeline_version: "20170226.01".into(),
        }
    }

    fn ftp_resource(url: &str, body: &[u8]) -> FetchedResource {
        FetchedResource {
            url: Url::parse(url).unwrap(),
            status: 200,
            reason: "Transfer complete".into(),
            headers: Vec::new(),
            content_type: None,
            body: body.to_vec(),
            kind: ResourceKind::Ftp,
        }
    }

    fn decompressed(path: &Path) -> String {
        let mut text = String::new();
        MultiGzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        text
    }

    #[tokio::test]
    async fn ftp_payloads_become_resource_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.warc.gz");
        let mut writer = ArchiveWriter::create(&path, &info()).await.unwrap();

        let appended = writer
            .append(ftp_resource("ftp://ftp.example.gov/pub/a.txt", b"hello"))
            .await
            .unwrap();
        assert_eq!(appended.record_type, RecordType::Resource);
        assert_eq!(appended.record.target_uri, "ftp://ftp.example.gov/pub/a.txt");
        assert_eq!(appended.record.digest, block_digest(b"hello"));
        assert!(appended.record.record_id.starts_with("<urn:uuid:"));
        assert_eq!(writer.records(), 2);
        writer.finish().await.unwrap();

        let text = decompressed(&path);
        assert!(text.starts_with("WARC/1.0\r\nWARC-Type: warcinfo\r\n"));
        assert!(text.contains("WARC-Type: resource\r\n"));
        assert!(text.contains("Content-Length: 5\r\n\r\nhello\r\n\r\n"));
    }

    #[tokio::test]
    async fn http_exchanges_become_response_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.warc.gz");
        let mut writer = ArchiveWriter::create(&path, &info()).await.unwrap();

        let resource = FetchedResource {
            url: Url::parse("http://lists.example.org/ftplists/foo").unwrap(),
            status: 200,
            reason: "OK".into(),
            headers: vec![("Content-Type".into(), "text/plain".into())],
            content_type: Some("text/plain".into()),
            body: b"ITEM_TOTAL_SIZE: 0\n".to_vec(),
            kind: ResourceKind::Http,
        };
        let appended = writer.append(resource).await.unwrap();
        assert_eq!(appended.record_type, RecordType::Response);
        // the digest covers status line, headers and body as one block
        assert_eq!(
            appended.record.digest,
            block_digest(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nITEM_TOTAL_SIZE: 0\n")
        );
        writer.finish().await.unwrap();

        let text = decompressed(&path);
        assert!(text.contains("HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nITEM_TOTAL_SIZE"));
    }

    #[tokio::test]
    async fn large_payload_is_written_intact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.warc.gz");
        let payload: Vec<u8> = (0..6 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let mut writer = ArchiveWriter::create(&path, &info()).await.unwrap();

        let appended = writer
            .append(ftp_resource("ftp://ftp.example.gov/pub/big.bin", &payload))
            .await
            .unwrap();
        writer.finish().await.unwrap();

        let records: Vec<_> = WarcReader::open(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].block, payload);
        assert_eq!(
            records[1].header("WARC-Block-Digest"),
            Some(appended.record.digest.as_str())
        );
        assert_eq!(appended.record.digest, block_digest(&payload));
    }

    #[tokio::test]
    async fn create_truncates_a_stale_container() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.warc.gz");
        std::fs::write(&path, b"stale garbage").unwrap();

        ArchiveWriter::create(&path, &info())
            .await
            .unwrap()
            .finish()
            .await
            .unwrap();
        assert!(!decompressed(&path).contains("stale garbage"));
    }
}
