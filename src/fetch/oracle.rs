//! Existence oracle
//!
//! For servers that answer "does not exist" with a dropped connection or an ambiguous error,
//! operators publish the error text the server produces for a path known not to exist, split by
//! whether the requested path was a directory or a file:
//!
//! `GET <base>/<server>_dir_not_found`, `GET <base>/<server>_file_not_found`
//!
//! The body is that error text with the requested path replaced by [`ORACLE_SENTINEL`]. The pieces
//! around the sentinel are the fragments any genuine "not found" error from that server contains.
//! A 404 means nobody has published data for the server. Any other status means the oracle itself
//! is misconfigured and the item aborts.
//!
//! Answers are cached per server and path kind for the lifetime of one oracle, which the pipeline
//! creates per item.

use crate::error::FetchError;
use crate::utils::is_directory_url;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

/// Token standing in for the requested path in published error text
pub const ORACLE_SENTINEL: &str = "NONEXISTINGFILEdgdjahxnedadbacxjbc";

/// Whether a URL names a directory or a file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// Path ends with `/`
    Directory,
    /// Anything else
    File,
}

impl PathKind {
    /// Kind of the path of `url`
    pub fn of(url: &Url) -> Self {
        if is_directory_url(url) {
            PathKind::Directory
        } else {
            PathKind::File
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            PathKind::Directory => "dir_not_found",
            PathKind::File => "file_not_found",
        }
    }
}

/// What the oracle knows about a server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OracleAnswer {
    /// Error text fragments every nonexistence error from this server contains
    Fragments(Vec<String>),
    /// Nothing published (or nothing usable)
    NoData,
}

/// Client for the existence oracle
pub struct ExistenceOracle {
    client: reqwest::Client,
    base: String,
    cache: Mutex<HashMap<(String, PathKind), OracleAnswer>>,
}

impl ExistenceOracle {
    /// Create an oracle client for `base`
    pub fn new(client: reqwest::Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Oracle manifest URL for the server and path kind of `url`
    pub fn manifest_url(&self, url: &Url) -> String {
        format!(
            "{}/{}_{}",
            self.base,
            server_key(url),
            PathKind::of(url).suffix()
        )
    }

    /// Look up the nonexistence fragments for the server of `url`
    ///
    /// An unreachable oracle counts as [`OracleAnswer::NoData`] and is not cached. A status other
    /// than 200 or 404 is [`FetchError::OracleMisconfigured`].
    pub async fn lookup(&self, url: &Url) -> Result<OracleAnswer, FetchError> {
        let key = (server_key(url), PathKind::of(url));
        if let Some(answer) = self.cached(&key) {
            return Ok(answer);
        }

        let oracle_url = self.manifest_url(url);
        let response = match self.client.get(&oracle_url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(oracle_url = %oracle_url, error = %e, "existence oracle unreachable");
                return Ok(OracleAnswer::NoData);
            }
        };

        let answer = match response.status().as_u16() {
            200 => match response.text().await {
                Ok(body) => {
                    let fragments = parse_fragments(&body);
                    if fragments.is_empty() {
                        OracleAnswer::NoData
                    } else {
                        OracleAnswer::Fragments(fragments)
                    }
                }
                Err(e) => {
                    tracing::warn!(oracle_url = %oracle_url, error = %e, "existence oracle body unreadable");
                    return Ok(OracleAnswer::NoData);
                }
            },
            404 => OracleAnswer::NoData,
            status => {
                return Err(FetchError::OracleMisconfigured {
                    oracle_url,
                    status,
                    url: url.to_string(),
                });
            }
        };

        tracing::debug!(oracle_url = %oracle_url, answer = ?answer, "existence oracle answered");
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, answer.clone());
        }
        Ok(answer)
    }

    fn cached(&self, key: &(String, PathKind)) -> Option<OracleAnswer> {
        self.cache.lock().ok()?.get(key).cloned()
    }
}

/// `host[:port]` of a URL, the key oracle manifests are published under
pub fn server_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Split an oracle body on the sentinel into non-empty fragments
///
/// The sentinel usually follows a `/` (it stands in for a path component), so one trailing `/` is
/// removed from each piece before trimming.
pub fn parse_fragments(body: &str) -> Vec<String> {
    body.split(ORACLE_SENTINEL)
        .map(|piece| piece.strip_suffix('/').unwrap_or(piece).trim())
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `message` contains every fragment
pub fn confirms_absence(fragments: &[String], message: &str) -> bool {
    !fragments.is_empty() && fragments.iter().all(|f| message.contains(f.as_str()))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn fragments_drop_the_slash_before_the_sentinel() {
        let body = format!("550 /pub/{ORACLE_SENTINEL}: No such file or directory\n");
        assert_eq!(
            parse_fragments(&body),
            vec!["550 /pub", ": No such file or directory"]
        );
        let plain = format!("Failed to change directory {ORACLE_SENTINEL}");
        assert_eq!(parse_fragments(&plain), vec!["Failed to change directory"]);
        assert!(parse_fragments(ORACLE_SENTINEL).is_empty());
    }

    #[test]
    fn absence_needs_every_fragment() {
        let fragments = vec!["550".to_string(), "No such file".to_string()];
        assert!(confirms_absence(
            &fragments,
            "550 /pub/x.txt: No such file or directory"
        ));
        assert!(!confirms_absence(&fragments, "550 Permission denied"));
        assert!(!confirms_absence(&[], "anything"));
    }

    #[test]
    fn manifest_url_is_keyed_by_server_and_kind() {
        let oracle = ExistenceOracle::new(reqwest::Client::new(), "http://oracle.example/nf/");
        let dir = Url::parse("ftp://ftp.example.gov/pub/").unwrap();
        let file = Url::parse("ftp://ftp.example.gov:2121/pub/a").unwrap();
        assert_eq!(
            oracle.manifest_url(&dir),
            "http://oracle.example/nf/ftp.example.gov_dir_not_found"
        );
        assert_eq!(
            oracle.manifest_url(&file),
            "http://oracle.example/nf/ftp.example.gov:2121_file_not_found"
        );
    }

    #[tokio::test]
    async fn published_text_yields_fragments_and_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nf/ftp.example.gov_file_not_found"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("550 {ORACLE_SENTINEL}: No such file")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let oracle = ExistenceOracle::new(reqwest::Client::new(), &format!("{}/nf", server.uri()));
        let a = Url::parse("ftp://ftp.example.gov/pub/a").unwrap();
        let b = Url::parse("ftp://ftp.example.gov/pub/b").unwrap();

        let expected = OracleAnswer::Fragments(vec!["550".into(), ": No such file".into()]);
        assert_eq!(oracle.lookup(&a).await.unwrap(), expected);
        assert_eq!(oracle.lookup(&b).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn not_found_means_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let oracle = ExistenceOracle::new(reqwest::Client::new(), &server.uri());
        let url = Url::parse("ftp://ftp.example.gov/pub/").unwrap();
        assert_eq!(oracle.lookup(&url).await.unwrap(), OracleAnswer::NoData);
    }

    #[tokio::test]
    async fn unexpected_status_is_a_misconfiguration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let oracle = ExistenceOracle::new(reqwest::Client::new(), &server.uri());
        let url = Url::parse("ftp://ftp.example.gov/pub/a").unwrap();
        match oracle.lookup(&url).await.unwrap_err() {
            FetchError::OracleMisconfigured { status, url, .. } => {
                assert_eq!(status, 403);
                assert_eq!(url, "ftp://ftp.example.gov/pub/a");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_oracle_means_no_data() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let oracle = ExistenceOracle::new(reqwest::Client::new(), &format!("http://127.0.0.1:{port}"));
        let url = Url::parse("ftp://ftp.example.gov/pub/a").unwrap();
        assert_eq!(oracle.lookup(&url).await.unwrap(), OracleAnswer::NoData);
    }
}
