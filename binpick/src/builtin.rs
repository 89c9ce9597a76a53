//! Builtin name table.
//!
//! Some projects publish plain binaries without a dist manifest. The builtin
//! index maps their repository URL to the name of a manifest kept next to
//! the index, under `dist-manifest/<name>.json`.

use std::collections::HashMap;

use tokio::sync::OnceCell;

use crate::error::{InstallError, Result};
use crate::github::GitHubClient;
use crate::manifest::replace_filename;
use crate::source::Repo;

static TABLE: OnceCell<HashMap<String, String>> = OnceCell::const_new();

pub fn parse_table(location: &str, text: &str) -> Result<HashMap<String, String>> {
    serde_json::from_str(text).map_err(|e| InstallError::ManifestParse {
        location: location.to_string(),
        reason: e.to_string(),
    })
}

/// Fetch a fresh copy of the table. Does not touch the process cache.
pub async fn refresh(client: &GitHubClient, index_url: &str) -> Result<HashMap<String, String>> {
    let text = client.download_text(index_url).await?;
    let table = parse_table(index_url, &text)?;
    tracing::debug!("builtin index {} has {} entries", index_url, table.len());
    Ok(table)
}

/// The table for this process, fetched on first use.
///
/// A failed fetch is cached as an empty table so the lookup is attempted
/// once per run at most.
pub async fn table(client: &GitHubClient, index_url: &str) -> &'static HashMap<String, String> {
    TABLE
        .get_or_init(|| async {
            refresh(client, index_url).await.unwrap_or_else(|e| {
                tracing::warn!("builtin index unavailable: {}", e);
                HashMap::new()
            })
        })
        .await
}

/// Manifest name registered for `repo`, compared without case.
pub fn lookup(table: &HashMap<String, String>, repo: &Repo) -> Option<String> {
    let mut hits: Vec<(&String, &String)> = table
        .iter()
        .filter(|(url, _)| match Repo::from_url(url) {
            Ok(Some(item)) => {
                item.owner.eq_ignore_ascii_case(&repo.owner)
                    && item.name.eq_ignore_ascii_case(&repo.name)
            }
            _ => false,
        })
        .collect();
    hits.sort();
    hits.first().map(|(_, name)| (*name).clone())
}

pub fn manifest_url(index_url: &str, name: &str) -> String {
    replace_filename(index_url, &format!("dist-manifest/{name}.json"))
}

/// Point a manifest written against the latest release at `tag`.
pub fn retag(text: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) if tag != "latest" => text.replace(
            "/releases/latest/download/",
            &format!("/releases/download/{tag}/"),
        ),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{
      "https://github.com/pnpm/pnpm": "pnpm",
      "https://github.com/denoland/deno": "deno",
      "not a url": "ignored"
    }"#;

    #[test]
    fn test_lookup() {
        let table = parse_table("index.json", INDEX).unwrap();
        for input in [
            "https://github.com/pnpm/pnpm",
            "https://github.com/pnpm/pnpm/releases/tag/v10.4.1",
            "https://github.com/pnpm/pnpm/releases",
            "https://github.com/PNPM/pnpm",
        ] {
            let repo = Repo::from_url(input).unwrap().unwrap();
            assert_eq!(lookup(&table, &repo).as_deref(), Some("pnpm"), "{input}");
        }

        let missing = Repo::parse("owner/unknown").unwrap();
        assert_eq!(lookup(&table, &missing), None);
    }

    #[test]
    fn test_parse_table_rejects_garbage() {
        let err = parse_table("index.json", "[1, 2]").unwrap_err();
        assert!(matches!(err, InstallError::ManifestParse { .. }));
    }

    #[test]
    fn test_manifest_url() {
        assert_eq!(
            manifest_url("https://example.com/raw/main/builtin.json", "pnpm"),
            "https://example.com/raw/main/dist-manifest/pnpm.json"
        );
    }

    #[test]
    fn test_retag() {
        let text = r#"{"https://github.com/pnpm/pnpm/releases/latest/download/pnpm-linux-x64": {}}"#;
        assert_eq!(retag(text, None), text);
        assert_eq!(retag(text, Some("latest")), text);
        assert_eq!(
            retag(text, Some("v9.15.3")),
            r#"{"https://github.com/pnpm/pnpm/releases/download/v9.15.3/pnpm-linux-x64": {}}"#
        );
    }
}
