//! Asset selection for releases without structured metadata.

use serde::{Deserialize, Serialize};

use crate::error::{InstallError, Result};
use crate::platform::Target;
use crate::rule::{preference, RuleSet};

const HASH_EXTENSIONS: &[&str] = &[
    ".sha256", ".sha256sum", ".sha512", ".sha512sum", ".sha1", ".md5", ".sum", ".sig", ".asc",
    ".minisig", ".pem", ".sbom",
];

const INSTALLER_EXTENSIONS: &[&str] = &[
    ".msi", ".msix", ".appx", ".deb", ".rpm", ".dmg", ".pkg", ".apk", ".ipa", ".appimage",
];

const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".json", ".xml", ".csv", ".log", ".ini", ".cfg", ".conf", ".yaml", ".yml",
];

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub download_url: String,
}

/// An asset picked for the local machine, keyed by the binary it provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub name: String,
    pub url: String,
}

fn has_extension(name: &str, exts: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    exts.iter().any(|e| lower.ends_with(e))
}

pub fn is_hash_file(name: &str) -> bool {
    has_extension(name, HASH_EXTENSIONS)
}

pub fn is_installer_file(name: &str) -> bool {
    has_extension(name, INSTALLER_EXTENSIONS)
}

pub fn is_text_file(name: &str) -> bool {
    has_extension(name, TEXT_EXTENSIONS)
}

/// Checksums, signatures, installers and documents are never installed.
pub fn should_skip(name: &str) -> bool {
    is_hash_file(name) || is_installer_file(name) || is_text_file(name)
}

/// Pick the assets the local machine can run, one per binary name.
///
/// Better matches come first: higher rule rank, then the local target the
/// machine prefers. An empty result is an expected outcome; it is logged and
/// returned rather than raised.
pub fn resolve_asset_urls(
    assets: &[ReleaseAsset],
    hint: Option<&str>,
    local: &[Target],
) -> Result<Vec<ResolvedAsset>> {
    let rules = RuleSet::build(hint)?;

    let mut hits: Vec<(u32, u32, ResolvedAsset)> = Vec::new();
    for asset in assets {
        if should_skip(&asset.name) {
            tracing::trace!("skipping {}", asset.name);
            continue;
        }
        let Some(m) = rules.guess(&asset.name, local) else {
            tracing::trace!("no local target matches {}", asset.name);
            continue;
        };
        tracing::debug!(
            "{} -> {} ({}, rank {})",
            asset.name,
            m.name,
            m.target().label,
            m.rule.rank
        );
        let pref = preference(m.target(), local).unwrap_or_default();
        hits.push((
            m.rule.rank,
            pref,
            ResolvedAsset {
                name: m.name,
                url: asset.download_url.clone(),
            },
        ));
    }

    hits.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

    let mut resolved: Vec<ResolvedAsset> = Vec::new();
    for (_, _, asset) in hits {
        if resolved.iter().any(|r| r.name == asset.name) {
            tracing::debug!("{} already resolved, dropping {}", asset.name, asset.url);
            continue;
        }
        resolved.push(asset);
    }

    if resolved.is_empty() {
        let diagnostic = InstallError::NoMatchFound {
            input: hint.unwrap_or("release").to_string(),
            targets: target_list(local),
        };
        tracing::warn!("{}", diagnostic);
    }
    Ok(resolved)
}

pub fn target_list(local: &[Target]) -> String {
    if local.is_empty() {
        return "<unsupported platform>".to_string();
    }
    local
        .iter()
        .map(|t| t.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
