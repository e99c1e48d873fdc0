//! Anonymous passive-mode FTP fetcher
//!
//! Just enough FTP to archive public servers: log in anonymously, switch to binary, open a passive
//! data connection and `RETR` a file (or `LIST` a directory URL ending in `/`).
//!
//! A negative reply at any step ends the exchange and is returned as a response carrying that reply
//! code, so `550` and `530` reach the classifier as statuses. A completed transfer (`226`/`250`) is
//! reported as `200`. Only socket failures, idle timeouts and unparseable replies are transport
//! errors.
//!
//! The timeout bounds each step (connect, every reply, every data chunk), never the whole exchange:
//! a multi-gigabyte transfer that keeps moving is never cut off.

use super::fetcher::{FetchedResource, Fetcher, ResourceKind, TransportError};
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use url::Url;

const DEFAULT_PORT: u16 = 21;
const DATA_CHUNK: usize = 64 * 1024;

/// A parsed server reply
#[derive(Debug)]
struct Reply {
    code: u16,
    text: String,
}

impl Reply {
    fn is_positive(&self) -> bool {
        (100..400).contains(&self.code)
    }
}

/// FTP implementation of [`Fetcher`]
#[derive(Clone, Debug)]
pub struct FtpFetcher {
    idle_timeout: Duration,
    user: String,
    password: String,
}

impl FtpFetcher {
    /// Anonymous fetcher giving up once any single step stalls for `idle_timeout`
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            user: "anonymous".to_string(),
            password: "anonymous@".to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for FtpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedResource, TransportError> {
        self.exchange(url).await
    }
}

/// Await one I/O step, failing if it makes no progress within `limit`
async fn step<T>(
    limit: Duration,
    url: &Url,
    what: &str,
    io: impl Future<Output = std::io::Result<T>>,
) -> Result<T, TransportError> {
    match tokio::time::timeout(limit, io).await {
        Ok(result) => result.map_err(|e| TransportError::new(url, e.to_string())),
        Err(_) => Err(TransportError::new(
            url,
            format!("{what} stalled for {limit:?}"),
        )),
    }
}

struct Control {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    idle_timeout: Duration,
}

impl FtpFetcher {
    async fn exchange(&self, url: &Url) -> Result<FetchedResource, TransportError> {
        let io = |e: std::io::Error| TransportError::new(url, e.to_string());
        let limit = self.idle_timeout;

        let host = url
            .host_str()
            .ok_or_else(|| TransportError::new(url, "URL has no host"))?;
        let port = url.port().unwrap_or(DEFAULT_PORT);
        let stream = step(limit, url, "connect", TcpStream::connect((host, port))).await?;
        let peer = stream.peer_addr().map_err(io)?;
        let (read_half, write_half) = stream.into_split();
        let mut control = Control {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer,
            idle_timeout: limit,
        };

        let greeting = control.read_reply(url).await?;
        if !greeting.is_positive() {
            return Ok(failure(url, greeting));
        }

        let mut login = control.command(url, &format!("USER {}", self.user)).await?;
        if login.code == 331 {
            login = control
                .command(url, &format!("PASS {}", self.password))
                .await?;
        }
        if login.code != 230 && login.code != 202 {
            return Ok(failure(url, login));
        }

        let binary = control.command(url, "TYPE I").await?;
        if !binary.is_positive() {
            return Ok(failure(url, binary));
        }

        let pasv = control.command(url, "PASV").await?;
        if pasv.code != 227 {
            return Ok(failure(url, pasv));
        }
        let data_port = parse_pasv(&pasv.text)
            .ok_or_else(|| TransportError::new(url, format!("unparseable PASV reply {:?}", pasv.text)))?;
        // Connect to the control peer, not the announced address, which may be private
        let mut data = step(
            limit,
            url,
            "data connect",
            TcpStream::connect((control.peer.ip(), data_port)),
        )
        .await?;

        let path = decoded_path(url);
        let listing = path.ends_with('/');
        let verb = if listing { "LIST" } else { "RETR" };
        let start = control.command(url, &format!("{verb} {path}")).await?;
        if !(100..200).contains(&start.code) {
            return Ok(failure(url, start));
        }

        let mut body = Vec::new();
        let mut chunk = vec![0u8; DATA_CHUNK];
        loop {
            let n = step(limit, url, "data transfer", data.read(&mut chunk)).await?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        drop(data);

        let done = control.read_reply(url).await?;
        let _ = step(limit, url, "QUIT", control.writer.write_all(b"QUIT\r\n")).await;

        if done.code != 226 && done.code != 250 {
            return Ok(failure(url, done));
        }
        tracing::debug!(url = %url, bytes = body.len(), verb, "ftp transfer complete");
        Ok(FetchedResource {
            url: url.clone(),
            status: 200,
            reason: done.text,
            headers: Vec::new(),
            content_type: listing.then(|| "text/plain".to_string()),
            body,
            kind: ResourceKind::Ftp,
        })
    }
}

impl Control {
    async fn command(&mut self, url: &Url, line: &str) -> Result<Reply, TransportError> {
        let command = format!("{line}\r\n");
        step(
            self.idle_timeout,
            url,
            "command",
            self.writer.write_all(command.as_bytes()),
        )
        .await?;
        self.read_reply(url).await
    }

    async fn read_reply(&mut self, url: &Url) -> Result<Reply, TransportError> {
        let first = self.read_line(url).await?;
        let code = parse_code(&first)
            .ok_or_else(|| TransportError::new(url, format!("malformed reply {first:?}")))?;
        let mut text = first[3..].trim_start_matches(['-', ' ']).to_string();

        // multi-line reply: "123-..." until "123 ..."
        if first.as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{code} ");
            loop {
                let line = self.read_line(url).await?;
                if line.starts_with(&terminator) || line == code.to_string() {
                    text.push('\n');
                    text.push_str(line[3..].trim_start());
                    break;
                }
                text.push('\n');
                text.push_str(&line);
            }
        }
        Ok(Reply { code, text })
    }

    async fn read_line(&mut self, url: &Url) -> Result<String, TransportError> {
        let mut line = String::new();
        let n = step(
            self.idle_timeout,
            url,
            "reply",
            self.reader.read_line(&mut line),
        )
        .await?;
        if n == 0 {
            return Err(TransportError::new(url, "control connection closed"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

fn failure(url: &Url, reply: Reply) -> FetchedResource {
    tracing::debug!(url = %url, code = reply.code, text = %reply.text, "ftp negative reply");
    FetchedResource {
        url: url.clone(),
        status: reply.code,
        reason: reply.text,
        headers: Vec::new(),
        content_type: None,
        body: Vec::new(),
        kind: ResourceKind::Ftp,
    }
}

fn parse_code(line: &str) -> Option<u16> {
    let digits = line.get(..3)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Port from `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
fn parse_pasv(text: &str) -> Option<u16> {
    let open = text.find('(')?;
    let close = text[open..].find(')')? + open;
    let numbers: Vec<u16> = text[open + 1..close]
        .split(',')
        .map(|n| n.trim().parse().ok())
        .collect::<Option<_>>()?;
    if numbers.len() != 6 || numbers.iter().any(|n| *n > 255) {
        return None;
    }
    Some(numbers[4] * 256 + numbers[5])
}

fn decoded_path(url: &Url) -> String {
    let path = url.path();
    let decoded = urlencoding::decode_binary(path.as_bytes());
    let path = String::from_utf8_lossy(&decoded).into_owned();
    if path.is_empty() { "/".to_string() } else { path }
}
