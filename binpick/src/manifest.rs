//! `dist-manifest.json` support.
//!
//! A release that ships a dist manifest declares which artifact is built for
//! which target triple and which files inside each archive are worth
//! installing. When one is available it replaces the filename heuristics
//! entirely, except for artifacts that declare no triples at all.

use std::collections::HashSet;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::archive::strip_archive_extension;
use crate::error::{InstallError, Result};
use crate::platform::Target;
use crate::release::{should_skip, ResolvedAsset};
use crate::rule::RuleSet;

pub const DEFAULT_ARTIFACT_KIND: &str = "executable-zip";
pub const MANIFEST_FILENAME: &str = "dist-manifest.json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DistManifest {
    /// Artifacts in document order; the first match wins, so order matters.
    #[serde(default, deserialize_with = "ordered_artifacts")]
    pub artifacts: Vec<(String, Artifact)>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target_triples: Vec<String>,
    #[serde(default)]
    pub assets: Vec<AssetEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub kind: AssetKind,
    #[serde(default)]
    pub executable_name: Option<String>,
    #[serde(default)]
    pub executable_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Executable,
    #[serde(rename = "executable-dir")]
    ExecutableDir,
    CDynamicLibrary,
    CStaticLibrary,
    Readme,
    License,
    Changelog,
    #[default]
    #[serde(other)]
    Unknown,
}

impl AssetKind {
    /// Executables and libraries are installed; documentation is not.
    pub fn is_installable(&self) -> bool {
        matches!(
            self,
            AssetKind::Executable | AssetKind::CDynamicLibrary | AssetKind::CStaticLibrary
        )
    }
}

fn ordered_artifacts<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, Artifact)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ArtifactMap;

    impl<'de> Visitor<'de> for ArtifactMap {
        type Value = Vec<(String, Artifact)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of artifact id to artifact")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut artifacts = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, artifact)) = map.next_entry::<String, Artifact>()? {
                artifacts.push((key, artifact));
            }
            Ok(artifacts)
        }
    }

    deserializer.deserialize_map(ArtifactMap)
}

impl DistManifest {
    /// Parse a manifest; `location` only labels the error.
    pub fn parse(location: &str, text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| InstallError::ManifestParse {
            location: location.to_string(),
            reason: e.to_string(),
        })
    }

    /// First installable artifact, in manifest order, built for any of
    /// the local targets.
    pub fn select_artifact(&self, local: &[Target]) -> Option<&Artifact> {
        let found = self
            .artifacts
            .iter()
            .map(|(_, a)| a)
            .find(|a| a.is_installable() && a.matches_targets(local));
        match found {
            Some(a) => tracing::debug!("selected artifact {:?} for {:?}", a.name, a.target_triples),
            None => tracing::debug!("no manifest artifact for the local targets"),
        }
        found
    }

    /// The artifact a candidate URL was listed from.
    pub fn artifact_for_url(&self, url: &str) -> Option<&Artifact> {
        let name = file_name(url);
        self.artifacts
            .iter()
            .find(|(key, _)| file_name(key) == name)
            .map(|(_, a)| a)
    }

    /// Download URLs for the local machine, one per binary name.
    ///
    /// Artifacts that declare target triples are taken on a triple match
    /// alone. Only artifacts with no declared triples are classified by
    /// filename. Relative keys are resolved against `base_url`.
    pub fn list_candidate_urls(
        &self,
        local: &[Target],
        base_url: Option<&str>,
    ) -> Result<Vec<ResolvedAsset>> {
        let mut rules: Option<RuleSet> = None;
        let mut seen = HashSet::new();
        let mut urls = Vec::new();

        for (key, artifact) in &self.artifacts {
            let filename = file_name(key);
            if should_skip(filename) {
                continue;
            }

            let name = if artifact.target_triples.is_empty() {
                if rules.is_none() {
                    rules = Some(RuleSet::build(None)?);
                }
                match rules.as_ref().and_then(|r| r.guess(filename, local)) {
                    Some(m) => m.name,
                    None => continue,
                }
            } else {
                if !artifact.is_installable() || !artifact.matches_targets(local) {
                    continue;
                }
                artifact.binary_name(filename)
            };

            if !seen.insert(name.clone()) {
                tracing::debug!("{} already has a candidate, skipping {}", name, key);
                continue;
            }

            let url = match base_url {
                Some(base) if !is_url(key) => replace_filename(base, key),
                _ => key.clone(),
            };
            urls.push(ResolvedAsset { name, url });
        }
        Ok(urls)
    }
}

impl Artifact {
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(DEFAULT_ARTIFACT_KIND)
    }

    pub fn is_installable(&self) -> bool {
        self.kind() == DEFAULT_ARTIFACT_KIND
    }

    pub fn matches_targets(&self, local: &[Target]) -> bool {
        local
            .iter()
            .any(|t| self.target_triples.iter().any(|triple| *triple == t.label))
    }

    /// `mujs-x86_64-unknown-linux-gnu.tar.xz` -> `mujs`
    fn binary_name(&self, filename: &str) -> String {
        let base = strip_archive_extension(self.name.as_deref().unwrap_or(filename));
        for triple in &self.target_triples {
            if let Some(stem) = base.strip_suffix(triple.as_str()) {
                let stem = stem.trim_end_matches(['-', '_']);
                if !stem.is_empty() {
                    return stem.to_string();
                }
            }
        }
        base.to_string()
    }

    /// Path of an archive member relative to the artifact root.
    ///
    /// Archives usually wrap their content in a directory named after the
    /// artifact, which the manifest paths leave out.
    pub fn relative_path(&self, path: &str) -> String {
        let path = path.replace('\\', "/");
        if let Some(name) = &self.name {
            let prefix = format!("{}/", strip_archive_extension(name));
            if let Some(rest) = path.strip_prefix(&prefix) {
                return rest.to_string();
            }
        }
        path
    }

    pub fn asset_by_path(&self, path: &str) -> Option<&AssetEntry> {
        let rel = self.relative_path(path);
        self.assets.iter().find(|a| a.path.as_deref() == Some(rel.as_str()))
    }

    pub fn executable_dir_asset(&self) -> Option<&AssetEntry> {
        self.assets.iter().find(|a| a.kind == AssetKind::ExecutableDir)
    }

    /// Whether an archive member should be installed.
    ///
    /// An entry with an exact path decides by its kind, and it wins over a
    /// `*` entry wherever the two appear in the list: a `*` next to a
    /// `readme` entry for `README.md` still leaves `README.md` out. Without
    /// an exact entry, a lone `*` path admits everything. Other wildcard
    /// forms are not supported and match nothing.
    ///
    /// An artifact that declares no assets has no allow-list at all; callers
    /// check [`Artifact::assets`] before filtering.
    pub fn has_file(&self, path: &str) -> bool {
        if let Some(asset) = self.asset_by_path(path) {
            return asset.kind.is_installable();
        }

        let mut wildcard = false;
        for asset in &self.assets {
            match asset.path.as_deref() {
                Some("*") => wildcard = true,
                Some(p) if is_pattern(p) => {
                    tracing::warn!("unsupported asset path pattern {:?} in {:?}", p, self.name)
                }
                _ => {}
            }
        }
        wildcard
    }
}

fn is_pattern(path: &str) -> bool {
    path.contains(['*', '?', '[', '^', '$'])
}

pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Last `/`-separated component of a URL or path.
pub fn file_name(s: &str) -> &str {
    s.rsplit(['/', '\\']).next().unwrap_or(s)
}

/// `https://h/a/dist-manifest.json` + `x.zip` -> `https://h/a/x.zip`
pub fn replace_filename(base: &str, name: &str) -> String {
    match base.rfind('/') {
        Some(i) => format!("{}/{}", &base[..i], name),
        None => name.to_string(),
    }
}
