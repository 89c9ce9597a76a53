//! Asset lists read from HTML pages.
//!
//! Used when the GitHub API cannot be reached or is rate limited, and for
//! nightly.link workflow pages, which have no API at all.

use std::collections::HashSet;

use regex::Regex;

use crate::error::Result;
use crate::release::ReleaseAsset;

const GITHUB: &str = "https://github.com";

/// Assets linked from a `releases/expanded_assets/<tag>` page.
pub fn parse_release_page(html: &str) -> Result<Vec<ReleaseAsset>> {
    let re = Regex::new(
        r#"<a\s+href="(?P<path>/[^/"]+/[^/"]+/releases/download/[^/"]+/(?P<name>[^"]+))"\s+rel="nofollow""#,
    )?;
    let mut seen = HashSet::new();
    let mut assets = Vec::new();
    for caps in re.captures_iter(html) {
        let name = caps["name"].to_string();
        if !seen.insert(name.clone()) {
            continue;
        }
        assets.push(ReleaseAsset {
            name,
            download_url: format!("{GITHUB}{}", &caps["path"]),
        });
    }
    Ok(assets)
}

/// Newest tag linked from a `releases` page.
pub fn parse_latest_tag(html: &str) -> Result<Option<String>> {
    let re = Regex::new(r#"href="/[^/"]+/[^/"]+/releases/tag/(?P<tag>[^"]+)""#)?;
    Ok(re.captures(html).map(|caps| caps["tag"].to_string()))
}

/// `https://nightly.link/<owner>/<repo>/workflows/<workflow>/<branch>[?preview]`
pub fn is_nightly_url(url: &str) -> Result<bool> {
    let re = Regex::new(r"^https://nightly\.link/[^/]+/[^/]+/workflows/[^/]+/[^/?]+(\?preview)?$")?;
    Ok(re.is_match(url))
}

/// Artifacts listed on a nightly.link page. A page for a run whose
/// artifacts expired lists none.
pub fn parse_nightly_page(html: &str) -> Result<Vec<ReleaseAsset>> {
    if html.contains(r#"class="absent""#) {
        tracing::debug!("nightly.link reports no artifacts");
        return Ok(Vec::new());
    }
    let re = Regex::new(
        r#"<th><a rel="nofollow" href="[^"]+">(?P<name>[^<]+)</a></th>\s*<td><a rel="nofollow" href="(?P<url>[^"]+)">"#,
    )?;
    let mut seen = HashSet::new();
    let mut assets = Vec::new();
    for caps in re.captures_iter(html) {
        let name = caps["name"].trim().to_string();
        if !seen.insert(name.clone()) {
            continue;
        }
        assets.push(ReleaseAsset {
            name,
            download_url: caps["url"].to_string(),
        });
    }
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE_PAGE: &str = r#"
<ul>
  <li><a href="/sharkdp/fd/releases/download/v10.2.0/fd-v10.2.0-x86_64-unknown-linux-gnu.tar.gz" rel="nofollow" data-turbo="false">
  <li><a href="/sharkdp/fd/releases/download/v10.2.0/fd-v10.2.0-x86_64-pc-windows-msvc.zip" rel="nofollow" data-turbo="false">
  <li><a href="/sharkdp/fd/releases/download/v10.2.0/fd-v10.2.0-x86_64-pc-windows-msvc.zip" rel="nofollow" data-turbo="false">
  <li><a href="/sharkdp/fd/archive/refs/tags/v10.2.0.zip" rel="nofollow" data-turbo="false">
</ul>"#;

    #[test]
    fn test_parse_release_page() {
        let assets = parse_release_page(RELEASE_PAGE).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].name, "fd-v10.2.0-x86_64-unknown-linux-gnu.tar.gz");
        assert_eq!(
            assets[0].download_url,
            "https://github.com/sharkdp/fd/releases/download/v10.2.0/fd-v10.2.0-x86_64-unknown-linux-gnu.tar.gz"
        );
        assert!(parse_release_page("<html></html>").unwrap().is_empty());
    }

    #[test]
    fn test_parse_latest_tag() {
        let html = r#"<a href="/sharkdp/fd/releases/tag/v10.2.0" data-view-component="true">v10.2.0</a>
            <a href="/sharkdp/fd/releases/tag/v10.1.0">"#;
        assert_eq!(parse_latest_tag(html).unwrap().as_deref(), Some("v10.2.0"));
        assert_eq!(parse_latest_tag("").unwrap(), None);
    }

    #[test]
    fn test_nightly_url() {
        for url in [
            "https://nightly.link/ahaoboy/cross-env/workflows/release/main",
            "https://nightly.link/ahaoboy/cross-env/workflows/release/main?preview",
        ] {
            assert!(is_nightly_url(url).unwrap(), "{url}");
        }
        assert!(!is_nightly_url("https://nightly.link/ahaoboy/cross-env").unwrap());
        assert!(!is_nightly_url("https://github.com/o/r/releases/download/v1/a.zip").unwrap());
    }

    #[test]
    fn test_parse_nightly_page() {
        let html = r#"<table>
<tr><th><a rel="nofollow" href="https://nightly.link/o/r/workflows/release/main/tool-x86_64-unknown-linux-gnu">tool-x86_64-unknown-linux-gnu</a></th>
<td><a rel="nofollow" href="https://nightly.link/o/r/workflows/release/main/tool-x86_64-unknown-linux-gnu.zip">tool-x86_64-unknown-linux-gnu.zip</a></td></tr>
<tr><th><a rel="nofollow" href="https://nightly.link/o/r/workflows/release/main/tool-aarch64-apple-darwin">tool-aarch64-apple-darwin</a></th>
<td><a rel="nofollow" href="https://nightly.link/o/r/workflows/release/main/tool-aarch64-apple-darwin.zip">tool-aarch64-apple-darwin.zip</a></td></tr>
</table>"#;
        let assets = parse_nightly_page(html).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].name, "tool-x86_64-unknown-linux-gnu");
        assert_eq!(
            assets[0].download_url,
            "https://nightly.link/o/r/workflows/release/main/tool-x86_64-unknown-linux-gnu.zip"
        );

        let expired = r#"<p class="absent">No artifacts</p>"#;
        assert!(parse_nightly_page(expired).unwrap().is_empty());
    }
}
