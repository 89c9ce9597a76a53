//! Download mirrors for GitHub release assets.
//!
//! A mirror is given as a URL prefix. Release downloads from github.com are
//! fetched as `<prefix><download url>`, the form common GitHub download
//! mirrors accept. Anything else, API calls included, goes out unchanged.

use std::fmt;
use std::str::FromStr;

use crate::error::InstallError;
use crate::manifest::is_url;

const RELEASE_PREFIX: &str = "https://github.com/";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Proxy {
    /// Download straight from github.com.
    #[default]
    Github,
    /// Prefix mirror, always ending in `/`.
    Prefix(String),
}

impl Proxy {
    pub fn rewrite(&self, url: &str) -> String {
        match self {
            Proxy::Prefix(prefix) if is_release_download(url) => format!("{prefix}{url}"),
            _ => url.to_string(),
        }
    }
}

fn is_release_download(url: &str) -> bool {
    let Some(rest) = url.strip_prefix(RELEASE_PREFIX) else {
        return false;
    };
    // owner/repo/releases/...
    let mut parts = rest.splitn(3, '/');
    let (Some(_), Some(_), Some(tail)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    tail.starts_with("releases/download/") || tail.starts_with("releases/latest/download/")
}

impl FromStr for Proxy {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("github") {
            return Ok(Proxy::Github);
        }
        if !is_url(s) {
            return Err(InstallError::Config {
                path: "proxy".to_string(),
                message: format!("'{s}' is neither 'github' nor an http(s) URL prefix"),
            });
        }
        Ok(Proxy::Prefix(format!("{}/", s.trim_end_matches('/'))))
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proxy::Github => f.write_str("github"),
            Proxy::Prefix(prefix) => f.write_str(prefix),
        }
    }
}
