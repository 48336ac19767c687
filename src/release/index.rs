//! Release index parsing
//!
//! The index is the GitHub releases listing: an array of releases, each with a
//! tag and a list of assets. A release counts as a converter version when one
//! of its assets matches the configured prefix and suffix.

use crate::types::ToolArtifact;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct IndexRelease {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    assets: Vec<IndexAsset>,
}

#[derive(Debug, Deserialize)]
struct IndexAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: Option<u64>,
    /// `sha256:<hex>` on recent releases
    #[serde(default)]
    digest: Option<String>,
}

/// Parse an index body into artifacts, newest first
///
/// Drafts and releases without a matching asset are skipped. When a release has
/// several matching assets the first one listed wins. Releases without a
/// publication date sort last, in index order.
pub(crate) fn parse_index(
    body: &[u8],
    prefix: &str,
    suffix: &str,
) -> std::result::Result<Vec<ToolArtifact>, serde_json::Error> {
    let releases: Vec<IndexRelease> = serde_json::from_slice(body)?;

    let mut artifacts: Vec<ToolArtifact> = releases
        .into_iter()
        .filter(|release| !release.draft)
        .filter_map(|release| {
            let asset = release
                .assets
                .into_iter()
                .find(|a| a.name.starts_with(prefix) && a.name.ends_with(suffix))?;

            Some(ToolArtifact {
                version_tag: release.tag_name,
                jar_name: asset.name,
                download_url: asset.browser_download_url,
                published_at: release.published_at,
                size: asset.size.filter(|s| *s > 0),
                sha256: asset.digest.as_deref().and_then(parse_sha256_digest),
                local_path: None,
            })
        })
        .collect();

    // Stable sort: None compares lowest, Reverse puts it last
    artifacts.sort_by_key(|a| std::cmp::Reverse(a.published_at));

    Ok(artifacts)
}

fn parse_sha256_digest(digest: &str) -> Option<String> {
    let hex = digest.strip_prefix("sha256:")?;
    if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(hex.to_ascii_lowercase())
    } else {
        None
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "chunker-cli-";
    const SUFFIX: &str = ".jar";

    #[test]
    fn newest_release_comes_first() {
        let body = br#"[
            {"tag_name": "1.6.0", "published_at": "2024-11-02T10:00:00Z",
             "assets": [{"name": "chunker-cli-1.6.0.jar", "browser_download_url": "https://x/1.6.0.jar", "size": 10}]},
            {"tag_name": "1.7.0", "published_at": "2025-03-14T10:00:00Z",
             "assets": [{"name": "chunker-cli-1.7.0.jar", "browser_download_url": "https://x/1.7.0.jar", "size": 12}]}
        ]"#;

        let artifacts = parse_index(body, PREFIX, SUFFIX).unwrap();
        let tags: Vec<&str> = artifacts.iter().map(|a| a.version_tag.as_str()).collect();
        assert_eq!(tags, vec!["1.7.0", "1.6.0"]);
        assert_eq!(artifacts[0].jar_name, "chunker-cli-1.7.0.jar");
        assert_eq!(artifacts[0].size, Some(12));
    }

    #[test]
    fn releases_without_matching_asset_are_skipped() {
        let body = br#"[
            {"tag_name": "gui-only", "published_at": "2025-01-01T00:00:00Z",
             "assets": [{"name": "Chunker-Setup.exe", "browser_download_url": "https://x/setup.exe"}]},
            {"tag_name": "1.5.0", "published_at": "2024-06-01T00:00:00Z",
             "assets": [
                {"name": "chunker-cli-1.5.0-sources.zip", "browser_download_url": "https://x/src.zip"},
                {"name": "chunker-cli-1.5.0.jar", "browser_download_url": "https://x/1.5.0.jar"}
             ]},
            {"tag_name": "1.4.0", "published_at": "2024-01-01T00:00:00Z", "assets": []}
        ]"#;

        let artifacts = parse_index(body, PREFIX, SUFFIX).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].version_tag, "1.5.0");
        assert_eq!(artifacts[0].download_url, "https://x/1.5.0.jar");
    }

    #[test]
    fn drafts_are_skipped_and_undated_sort_last() {
        let body = br#"[
            {"tag_name": "undated",
             "assets": [{"name": "chunker-cli-u.jar", "browser_download_url": "https://x/u.jar"}]},
            {"tag_name": "draft", "draft": true, "published_at": "2026-01-01T00:00:00Z",
             "assets": [{"name": "chunker-cli-d.jar", "browser_download_url": "https://x/d.jar"}]},
            {"tag_name": "dated", "published_at": "2023-01-01T00:00:00Z",
             "assets": [{"name": "chunker-cli-a.jar", "browser_download_url": "https://x/a.jar"}]}
        ]"#;

        let artifacts = parse_index(body, PREFIX, SUFFIX).unwrap();
        let tags: Vec<&str> = artifacts.iter().map(|a| a.version_tag.as_str()).collect();
        assert_eq!(tags, vec!["dated", "undated"]);
    }

    #[test]
    fn digest_is_extracted_when_well_formed() {
        let hex = "A".repeat(64);
        let body = format!(
            r#"[{{"tag_name": "1.7.0", "assets": [
                {{"name": "chunker-cli-1.7.0.jar", "browser_download_url": "https://x/a.jar",
                  "digest": "sha256:{hex}"}}]}},
               {{"tag_name": "1.6.0", "assets": [
                {{"name": "chunker-cli-1.6.0.jar", "browser_download_url": "https://x/b.jar",
                  "digest": "md5:abc"}}]}}]"#
        );

        let artifacts = parse_index(body.as_bytes(), PREFIX, SUFFIX).unwrap();
        assert_eq!(artifacts[0].sha256, Some("a".repeat(64)));
        assert_eq!(artifacts[1].sha256, None);
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_index(b"<html>rate limited</html>", PREFIX, SUFFIX).is_err());
        assert!(parse_index(br#"{"message": "Not Found"}"#, PREFIX, SUFFIX).is_err());
    }

    #[test]
    fn empty_index_is_not_an_error() {
        assert!(parse_index(b"[]", PREFIX, SUFFIX).unwrap().is_empty());
    }
}
