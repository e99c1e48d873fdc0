//! Manifest resolution: skip-lists, size budget and URL selection
//!
//! Rejections here are fatal for the item and happen before anything is fetched.

use crate::config::PipelineConfig;
use crate::error::{Error, ItemError, Result};
use crate::listing::{ListService, ManifestDocument};
use crate::types::ItemName;
use crate::utils::decode_candidate_url;
use regex::Regex;
use url::Url;

/// Header line declaring the item's total size in bytes
pub const TOTAL_SIZE_HEADER: &str = "ITEM_TOTAL_SIZE";

/// The fetch set of one item
#[derive(Clone, Debug)]
pub struct ResolvedManifest {
    /// URLs to fetch, in manifest order, with the manifest URL last
    pub urls: Vec<Url>,
    /// Declared total size in bytes
    pub total_size: u64,
    /// Where the manifest was fetched from
    pub manifest_url: Url,
}

/// Resolve the fetch set of `item`
///
/// # Errors
///
/// - [`ItemError::SkipListed`] if the item matches the global skip-list
/// - [`ItemError::Oversized`] if the declared size exceeds `size_ceiling`
/// - [`ItemError::BadCharacter`] if a decoded URL that would be fetched contains `#`
/// - [`ItemError::MalformedManifest`] if the size header is missing or a URL does not parse
/// - whatever the list service returns for unreachable or non-200 listings
pub async fn resolve_manifest(
    list_service: &dyn ListService,
    item: &ItemName,
    config: &PipelineConfig,
) -> Result<ResolvedManifest> {
    let skipped_sites = list_service.skipped_sites().await?;
    if let Some(prefix) = check_skipped_sites(item, &skipped_sites) {
        return Err(ItemError::SkipListed {
            item: item.to_string(),
            prefix: prefix.to_string(),
        }
        .into());
    }

    let skipped_dirs: Vec<String> = list_service
        .skipped_dirs()
        .await?
        .iter()
        .filter_map(|entry| normalize_skipped_dir(entry, &config.archived_scheme))
        .collect();

    let document = list_service.manifest(item.path()).await?;
    let total_size = parse_total_size(&document)?;
    if total_size > config.size_ceiling {
        return Err(ItemError::Oversized {
            item: item.to_string(),
            size: total_size,
            ceiling: config.size_ceiling,
        }
        .into());
    }

    let mut urls = select_urls(&document, &config.archived_scheme, &skipped_dirs)?;
    urls.push(document.url.clone());

    tracing::info!(
        item = %item,
        urls = urls.len(),
        total_size,
        "resolved manifest"
    );
    Ok(ResolvedManifest {
        urls,
        total_size,
        manifest_url: document.url,
    })
}

/// The first non-blank skip-list prefix matching the item's path or full name
pub fn check_skipped_sites<'a>(item: &ItemName, skipped_sites: &'a [String]) -> Option<&'a str> {
    skipped_sites
        .iter()
        .map(|prefix| prefix.trim())
        .filter(|prefix| !prefix.is_empty())
        .find(|prefix| item.path().starts_with(prefix) || item.as_str().starts_with(prefix))
}

/// Turn a published skipped-dir entry into a URL prefix
///
/// Entries that already carry a scheme are used as-is. Bare `host:path` entries get `scheme://`
/// prepended with their first `:` removed.
pub fn normalize_skipped_dir(entry: &str, scheme: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.is_empty() {
        None
    } else if entry.contains("://") {
        Some(entry.to_string())
    } else {
        Some(format!("{scheme}://{}", entry.replacen(':', "", 1)))
    }
}

/// Read the `ITEM_TOTAL_SIZE: <n>` header
pub fn parse_total_size(document: &ManifestDocument) -> Result<u64> {
    let malformed = |reason: String| -> Error {
        ItemError::MalformedManifest {
            url: document.url.to_string(),
            reason,
        }
        .into()
    };

    let pattern = Regex::new(&format!(r"(?m)^\s*{TOTAL_SIZE_HEADER}:\s*([0-9]+)\s*$"))
        .map_err(|e| Error::Other(format!("invalid size header pattern: {e}")))?;
    let digits = pattern
        .captures(&document.body)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| malformed(format!("no {TOTAL_SIZE_HEADER} header")))?;

    digits
        .as_str()
        .parse()
        .map_err(|e| malformed(format!("bad {TOTAL_SIZE_HEADER} value {:?}: {e}", digits.as_str())))
}

/// Decode and filter the candidate URLs of a manifest
///
/// The survivors are those with the archived scheme that match no skipped-dir prefix. Only they are
/// checked for `#`, and one bad survivor rejects the whole item before any URL is parsed.
pub fn select_urls(
    document: &ManifestDocument,
    scheme: &str,
    skipped_dirs: &[String],
) -> Result<Vec<Url>> {
    let prefix = format!("{scheme}://");
    let mut selected = Vec::new();
    for candidate in document
        .body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(TOTAL_SIZE_HEADER))
        .filter(|line| line.starts_with(&prefix))
        .map(decode_candidate_url)
    {
        if let Some(dir) = skipped_dirs.iter().find(|dir| candidate.starts_with(dir.as_str())) {
            tracing::debug!(url = %candidate, prefix = %dir, "url is skip-listed");
            continue;
        }
        selected.push(candidate);
    }

    if let Some(bad) = selected.iter().find(|url| url.contains('#')) {
        return Err(ItemError::BadCharacter { url: bad.clone() }.into());
    }

    selected
        .into_iter()
        .map(|candidate| {
            Url::parse(&candidate).map_err(|e| {
                ItemError::MalformedManifest {
                    url: document.url.to_string(),
                    reason: format!("invalid URL {candidate:?}: {e}"),
                }
                .into()
            })
        })
        .collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn document(body: &str) -> ManifestDocument {
        ManifestDocument {
            url: Url::parse("http://lists.example.org/ftplists/pub/data/foo").unwrap(),
            body: body.to_string(),
        }
    }

    #[test]
    fn size_header_is_required() {
        assert_eq!(
            parse_total_size(&document("ITEM_TOTAL_SIZE: 1000\nftp://h/a\n")).unwrap(),
            1000
        );
        assert_eq!(
            parse_total_size(&document("ftp://h/a\nITEM_TOTAL_SIZE:42")).unwrap(),
            42
        );
        assert!(matches!(
            parse_total_size(&document("ftp://h/a\n")),
            Err(Error::Item(ItemError::MalformedManifest { .. }))
        ));
        assert!(matches!(
            parse_total_size(&document("ITEM_TOTAL_SIZE: 99999999999999999999999")),
            Err(Error::Item(ItemError::MalformedManifest { .. }))
        ));
    }

    #[test]
    fn skip_list_matches_path_or_full_name() {
        let item = ItemName::parse("noaa:/pub/data/foo").unwrap();
        let list = |entries: &[&str]| entries.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(
            check_skipped_sites(&item, &list(&["/pub/data"])),
            Some("/pub/data")
        );
        assert_eq!(check_skipped_sites(&item, &list(&["noaa:"])), Some("noaa:"));
        assert_eq!(check_skipped_sites(&item, &list(&["", "   ", "/other"])), None);
    }

    #[test]
    fn skipped_dirs_are_normalized_to_url_prefixes() {
        assert_eq!(
            normalize_skipped_dir("ftp.example.gov:/pub/private", "ftp").as_deref(),
            Some("ftp://ftp.example.gov/pub/private")
        );
        assert_eq!(
            normalize_skipped_dir("ftp://ftp.example.gov/incoming", "ftp").as_deref(),
            Some("ftp://ftp.example.gov/incoming")
        );
        assert_eq!(normalize_skipped_dir("  ", "ftp"), None);
    }

    #[test]
    fn urls_are_decoded_and_filtered() {
        let doc = document(
            "ITEM_TOTAL_SIZE: 10\n\
             ftp://ftp.example.gov/pub/a&#32;b.txt\n\
             http://www.example.gov/index.html\n\
             ftp://ftp.example.gov/pub/private/secret\n\
             not a url\n\
             ftp://ftp.example.gov/pub/c%2Etxt\n",
        );
        let skipped = vec!["ftp://ftp.example.gov/pub/private".to_string()];

        let urls = select_urls(&doc, "ftp", &skipped).unwrap();

        let urls: Vec<&str> = urls.iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "ftp://ftp.example.gov/pub/a%20b.txt",
                "ftp://ftp.example.gov/pub/c.txt"
            ]
        );
    }

    #[test]
    fn encoded_fragment_character_rejects_the_item() {
        let doc = document("ITEM_TOTAL_SIZE: 10\nftp://h/ok\nftp://h/bad%23name\n");
        match select_urls(&doc, "ftp", &[]) {
            Err(Error::Item(ItemError::BadCharacter { url })) => {
                assert_eq!(url, "ftp://h/bad#name");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn fragment_in_an_unfetched_url_is_ignored() {
        let doc = document(
            "ITEM_TOTAL_SIZE: 10\n\
             http://h/page#top\n\
             ftp://h/private/notes%23draft\n\
             ftp://h/pub/ok.txt\n",
        );
        let skipped = vec!["ftp://h/private".to_string()];

        let urls = select_urls(&doc, "ftp", &skipped).unwrap();

        let urls: Vec<&str> = urls.iter().map(Url::as_str).collect();
        assert_eq!(urls, vec!["ftp://h/pub/ok.txt"]);
    }
}
