//! Sequential reader for finalized WARC containers

use crate::error::{ItemError, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

/// One parsed record
#[derive(Clone, Debug)]
pub struct WarcRecord {
    /// Header fields in file order
    pub headers: Vec<(String, String)>,
    /// Record block
    pub block: Vec<u8>,
}

impl WarcRecord {
    /// First header with this name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `WARC-Type`
    pub fn record_type(&self) -> Option<&str> {
        self.header("WARC-Type")
    }

    /// `WARC-Target-URI`
    pub fn target_uri(&self) -> Option<&str> {
        self.header("WARC-Target-URI")
    }
}

/// Iterator over the records of a gzip-compressed container
pub struct WarcReader {
    path: PathBuf,
    input: BufReader<MultiGzDecoder<File>>,
    keep_blocks: bool,
    done: bool,
}

impl WarcReader {
    /// Open a container for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ItemError::MissingOutput {
                path: path.to_path_buf(),
            }
            .into(),
            _ => crate::error::Error::Io(e),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            input: BufReader::new(MultiGzDecoder::new(file)),
            keep_blocks: true,
            done: false,
        })
    }

    /// Skip record blocks instead of loading them; yielded records have an empty `block`
    pub fn headers_only(mut self) -> Self {
        self.keep_blocks = false;
        self
    }

    fn corrupt(&self, reason: impl Into<String>) -> crate::error::Error {
        ItemError::CorruptContainer {
            path: self.path.clone(),
            reason: reason.into(),
        }
        .into()
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut raw = Vec::new();
        let n = self
            .input
            .read_until(b'\n', &mut raw)
            .map_err(|e| self.corrupt(e.to_string()))?;
        if n == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&raw);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn next_record(&mut self) -> Result<Option<WarcRecord>> {
        // skip blank separators between records
        let version = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        if !version.starts_with("WARC/") {
            return Err(self.corrupt(format!("expected WARC version line, found {version:?}")));
        }

        let mut headers = Vec::new();
        loop {
            let line = self
                .read_line()?
                .ok_or_else(|| self.corrupt("truncated record header"))?;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| self.corrupt(format!("malformed header line {line:?}")))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let record = WarcRecord {
            headers,
            block: Vec::new(),
        };
        let length: usize = record
            .header("Content-Length")
            .ok_or_else(|| self.corrupt("record without Content-Length"))?
            .parse()
            .map_err(|e| self.corrupt(format!("bad Content-Length: {e}")))?;

        if !self.keep_blocks {
            let mut block = (&mut self.input).take(length as u64);
            let copied = std::io::copy(&mut block, &mut std::io::sink());
            let skipped =
                copied.map_err(|e| self.corrupt(format!("truncated record block: {e}")))?;
            if skipped != length as u64 {
                return Err(self.corrupt("truncated record block"));
            }
            return Ok(Some(record));
        }

        let mut block = vec![0u8; length];
        self.input
            .read_exact(&mut block)
            .map_err(|e| self.corrupt(format!("truncated record block: {e}")))?;

        Ok(Some(WarcRecord { block, ..record }))
    }
}

impl Iterator for WarcReader {
    type Item = Result<WarcRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveWriter, WarcInfo};
    use crate::error::Error;
    use crate::fetch::{FetchedResource, ResourceKind};
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

    async fn container_with(dir: &TempDir, body: &[u8]) -> PathBuf {
        let path = dir.path().join("c.warc.gz");
        let mut writer = ArchiveWriter::create(&path, &info()).await.unwrap();
        writer
            .append(FetchedResource {
                url: Url::parse("ftp://ftp.example.gov/pub/blob.bin").unwrap(),
                status: 200,
                reason: "Transfer complete".into(),
                headers: Vec::new(),
                content_type: None,
                body: body.to_vec(),
                kind: ResourceKind::Ftp,
            })
            .await
            .unwrap();
        writer.finish().await.unwrap()
    }

    #[tokio::test]
    async fn reads_back_what_the_writer_wrote() {
        let dir = TempDir::new().unwrap();
        let body: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let path = container_with(&dir, &body).await;

        let records: Vec<_> = WarcReader::open(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_type(), Some("warcinfo"));
        assert_eq!(records[1].record_type(), Some("resource"));
        assert_eq!(
            records[1].target_uri(),
            Some("ftp://ftp.example.gov/pub/blob.bin")
        );
        assert_eq!(records[1].block, body);
        assert_eq!(
            records[1].header("warc-block-digest"),
            Some(crate::archive::block_digest(&body).as_str())
        );
    }

    #[tokio::test]
    async fn headers_only_skips_blocks() {
        let dir = TempDir::new().unwrap();
        let path = container_with(&dir, b"payload that is not kept").await;

        let records: Vec<_> = WarcReader::open(&path)
            .unwrap()
            .headers_only()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].block.is_empty());
        assert_eq!(records[1].header("Content-Length"), Some("24"));
        assert_eq!(
            records[1].target_uri(),
            Some("ftp://ftp.example.gov/pub/blob.bin")
        );
    }

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.warc.gz");
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut gz, b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
        std::fs::write(&path, gz.finish().unwrap()).unwrap();

        let first = WarcReader::open(&path).unwrap().next().unwrap();
        assert!(matches!(
            first,
            Err(Error::Item(ItemError::CorruptContainer { .. }))
        ));
    }

    #[test]
    fn missing_container_is_reported() {
        let err = WarcReader::open(Path::new("/nonexistent/c.warc.gz"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Item(ItemError::MissingOutput { .. })));
    }
}
