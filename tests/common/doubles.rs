//! In-memory stand-ins for the FTP side of a crawl

use async_trait::async_trait;
use ftp_harvest::fetch::{FetchedResource, Fetcher, ResourceKind, TransportError};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

/// How the fake FTP server answers one path
#[derive(Clone, Debug)]
pub enum FtpAnswer {
    /// Transfer completes with this payload
    File(Vec<u8>),
    /// Server replies with this code and text
    Reply(u16, String),
    /// Connection drops with this message
    Drop(String),
}

/// Serves a fixed set of FTP paths; anything else gets a 550
#[derive(Default)]
pub struct FakeFtp {
    answers: HashMap<String, FtpAnswer>,
    requests: Mutex<Vec<String>>,
}

impl FakeFtp {
    /// Answer `url` with `answer`
    pub fn with(mut self, url: &str, answer: FtpAnswer) -> Self {
        self.answers.insert(url.to_string(), answer);
        self
    }

    /// Every URL fetched so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFtp {
    async fn fetch(&self, url: &Url) -> Result<FetchedResource, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        let answer = self
            .answers
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| FtpAnswer::Reply(550, "No such file or directory".into()));

        let (status, reason, body) = match answer {
            FtpAnswer::File(body) => (200, "Transfer complete".to_string(), body),
            FtpAnswer::Reply(code, text) => (code, text, Vec::new()),
            FtpAnswer::Drop(message) => return Err(TransportError::new(url, message)),
        };
        Ok(FetchedResource {
            url: url.clone(),
            status,
            reason,
            headers: Vec::new(),
            content_type: None,
            body,
            kind: ResourceKind::Ftp,
        })
    }
}
