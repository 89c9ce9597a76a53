//! Classifying what the user asked to install.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::archive::is_archive;
use crate::error::{InstallError, Result};
use crate::manifest::{is_url, MANIFEST_FILENAME};
use crate::page::is_nightly_url;

/// A GitHub repository, optionally pinned to a release tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repo {
    pub owner: String,
    pub name: String,
    pub tag: Option<String>,
}

impl Repo {
    /// Parse `owner/repo[@tag]`.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || InstallError::InvalidSource {
            input: input.to_string(),
        };

        let (repo_part, tag) = match input.rsplit_once('@') {
            Some((repo, tag)) if !tag.is_empty() => (repo, Some(tag.to_string())),
            Some(_) => return Err(invalid()),
            None => (input, None),
        };

        let (owner, name) = repo_part.split_once('/').ok_or_else(invalid)?;
        if !is_name(owner) || !is_name(name) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.trim_end_matches(".git").to_string(),
            tag,
        })
    }

    /// Parse a repository, release or tag page URL on github.com.
    pub fn from_url(url: &str) -> Result<Option<Self>> {
        let re = Regex::new(
            r"^https?://github\.com/(?P<owner>[^/]+)/(?P<repo>[^/#?]+)(?:/releases(?:/tag/(?P<tag>[^/#?]+)|/latest)?)?/?$",
        )?;
        let Some(caps) = re.captures(url) else {
            return Ok(None);
        };
        Ok(Some(Self {
            owner: caps["owner"].to_string(),
            name: caps["repo"].trim_end_matches(".git").to_string(),
            tag: caps.name("tag").map(|t| t.as_str().to_string()),
        }))
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        if self.tag.is_none() {
            self.tag = tag;
        }
        self
    }

    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn releases_page_url(&self) -> String {
        format!("{}/releases", self.url())
    }

    /// The HTML fragment listing every asset of a release.
    pub fn expanded_assets_url(&self, tag: &str) -> String {
        format!("{}/releases/expanded_assets/{tag}", self.url())
    }

    /// Where cargo-dist style releases publish their manifest.
    pub fn manifest_url(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}/releases/download/{tag}/{MANIFEST_FILENAME}", self.url()),
            None => format!("{}/releases/latest/download/{MANIFEST_FILENAME}", self.url()),
        }
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, "@{tag}")?;
        }
        Ok(())
    }
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A `dist-manifest.json`, by URL or local path.
    Manifest(String),
    /// An archive to download and unpack.
    ArchiveUrl(String),
    /// A download that is the binary itself.
    FileUrl(String),
    /// A file on disk, archive or binary.
    Local(PathBuf),
    /// A nightly.link page listing a workflow run's artifacts.
    Nightly(String),
    Repo(Repo),
}

impl Source {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.to_ascii_lowercase().ends_with(".json") {
            return Ok(Source::Manifest(input.to_string()));
        }

        if is_nightly_url(input)? {
            return Ok(Source::Nightly(input.to_string()));
        }

        if is_url(input) {
            if let Some(repo) = Repo::from_url(input)? {
                return Ok(Source::Repo(repo));
            }
            if is_archive(input) {
                return Ok(Source::ArchiveUrl(input.to_string()));
            }
            return Ok(Source::FileUrl(input.to_string()));
        }

        if Path::new(input).exists() {
            return Ok(Source::Local(PathBuf::from(input)));
        }

        Repo::parse(input).map(Source::Repo)
    }
}
