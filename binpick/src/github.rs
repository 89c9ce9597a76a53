use crate::error::{InstallError, Result};
use crate::page;
use crate::proxy::Proxy;
use crate::release::ReleaseAsset;
use crate::retry::{with_retry, RetryConfig};
use crate::source::Repo;
use futures_util::StreamExt;
use octocrab::Octocrab;
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("binpick/", env!("CARGO_PKG_VERSION"));

/// Release listing through the GitHub API and plain HTTPS downloads.
///
/// `GITHUB_TOKEN` (or `GH_TOKEN`) only raises the API rate limit; nothing
/// else depends on it. When the API fails, the release is read from its
/// HTML page instead.
pub struct GitHubClient {
    octocrab: Octocrab,
    http_client: Client,
    retry_config: RetryConfig,
    proxy: Proxy,
}

impl GitHubClient {
    pub fn new(timeout: Duration, retry_config: RetryConfig) -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .or_else(|_| std::env::var("GH_TOKEN"))
            .ok()
            .filter(|t| !t.is_empty());

        let octocrab = match token {
            Some(token) => Octocrab::builder().personal_token(token).build()?,
            None => Octocrab::builder().build()?,
        };

        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            octocrab,
            http_client,
            retry_config,
            proxy: Proxy::Github,
        })
    }

    /// Fetch release downloads through `proxy`.
    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = proxy;
        self
    }

    /// Assets of the tagged release, or of the latest one.
    pub async fn release_assets(&self, repo: &Repo) -> Result<Vec<ReleaseAsset>> {
        let api_error = match self.release_assets_from_api(repo).await {
            Ok(assets) => return Ok(assets),
            Err(e) => e,
        };
        tracing::warn!(
            "GitHub API listing for {} failed: {}. Trying the release page",
            repo,
            api_error
        );

        match self.release_assets_from_page(repo).await {
            Ok(assets) if !assets.is_empty() => {
                tracing::info!("Read {} assets from the release page of {}", assets.len(), repo);
                Ok(assets)
            }
            Ok(_) => {
                tracing::debug!("the release page of {} lists no assets", repo);
                Err(release_error(repo, api_error))
            }
            Err(page_error) => {
                tracing::debug!("release page of {} is unusable: {}", repo, page_error);
                Err(release_error(repo, api_error))
            }
        }
    }

    async fn release_assets_from_api(&self, repo: &Repo) -> Result<Vec<ReleaseAsset>> {
        let operation_name = match &repo.tag {
            Some(tag) => format!("Fetching release '{}' for {}", tag, repo.full_name()),
            None => format!("Fetching latest release for {}", repo.full_name()),
        };

        let release = with_retry(&operation_name, &self.retry_config, || {
            let octocrab = self.octocrab.clone();
            let owner = repo.owner.clone();
            let name = repo.name.clone();
            let tag = repo.tag.clone();

            async move {
                let release = match tag {
                    Some(tag) => octocrab.repos(&owner, &name).releases().get_by_tag(&tag).await?,
                    None => octocrab.repos(&owner, &name).releases().get_latest().await?,
                };
                Ok::<_, InstallError>(release)
            }
        })
        .await?;

        tracing::debug!(
            "release {} has {} assets",
            release.tag_name,
            release.assets.len()
        );
        Ok(release
            .assets
            .iter()
            .map(|a| ReleaseAsset {
                name: a.name.clone(),
                download_url: a.browser_download_url.to_string(),
            })
            .collect())
    }

    async fn release_assets_from_page(&self, repo: &Repo) -> Result<Vec<ReleaseAsset>> {
        let tag = match &repo.tag {
            Some(tag) => tag.clone(),
            None => {
                let html = self.download_text(&repo.releases_page_url()).await?;
                page::parse_latest_tag(&html)?.ok_or_else(|| InstallError::ReleaseNotFound {
                    tag: "latest".to_string(),
                    owner: repo.owner.clone(),
                    repo: repo.name.clone(),
                })?
            }
        };
        let html = self.download_text(&repo.expanded_assets_url(&tag)).await?;
        page::parse_release_page(&html)
    }

    /// Artifacts listed on a nightly.link workflow page.
    pub async fn nightly_assets(&self, url: &str) -> Result<Vec<ReleaseAsset>> {
        let html = self.download_text(url).await?;
        page::parse_nightly_page(&html)
    }

    /// Download `url` into memory.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.proxy.rewrite(url);
        tracing::info!("Downloading {}", url);
        let operation_name = format!("Downloading {url}");

        with_retry(&operation_name, &self.retry_config, || {
            let http_client = self.http_client.clone();
            let url = url.clone();

            async move {
                let response = http_client.get(&url).send().await?.error_for_status()?;
                let mut buffer = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok::<_, InstallError>(buffer)
            }
        })
        .await
        .map_err(|e| match e {
            InstallError::Http(err) => InstallError::DownloadFailed {
                url: url.clone(),
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            },
            other => other,
        })
    }

    pub async fn download_text(&self, url: &str) -> Result<String> {
        let bytes = self.download(url).await?;
        String::from_utf8(bytes).map_err(|e| InstallError::DownloadFailed {
            url: url.to_string(),
            status: None,
            message: e.to_string(),
        })
    }
}

/// HTTP status behind a transport failure, when there was a response.
pub fn status_code(error: &InstallError) -> Option<u16> {
    match error {
        InstallError::GitHubApi(e) => match e.as_ref() {
            octocrab::Error::GitHub { source, .. } => Some(source.status_code.as_u16()),
            _ => None,
        },
        InstallError::Http(e) => e.status().map(|s| s.as_u16()),
        InstallError::DownloadFailed { status, .. } => *status,
        _ => None,
    }
}

/// Only a 404 means the release is missing; rate limits and network
/// failures keep their own error.
pub fn release_error(repo: &Repo, error: InstallError) -> InstallError {
    if status_code(&error) == Some(404) {
        return InstallError::ReleaseNotFound {
            tag: repo.tag.clone().unwrap_or_else(|| "latest".to_string()),
            owner: repo.owner.clone(),
            repo: repo.name.clone(),
        };
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download_failed(status: Option<u16>) -> InstallError {
        InstallError::DownloadFailed {
            url: "https://api.github.com/repos/o/r/releases/latest".to_string(),
            status,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_release_error_only_maps_404() {
        let repo = Repo::parse("o/r@v1").unwrap();

        assert!(matches!(
            release_error(&repo, download_failed(Some(404))),
            InstallError::ReleaseNotFound { ref tag, .. } if tag == "v1"
        ));
        assert!(matches!(
            release_error(&repo, download_failed(Some(403))),
            InstallError::DownloadFailed { status: Some(403), .. }
        ));
        assert!(matches!(
            release_error(&repo, download_failed(None)),
            InstallError::DownloadFailed { status: None, .. }
        ));

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        assert!(matches!(
            release_error(&repo, InstallError::Io(io)),
            InstallError::Io(_)
        ));
    }

    #[test]
    fn test_status_code() {
        assert_eq!(status_code(&download_failed(Some(429))), Some(429));
        assert_eq!(
            status_code(&InstallError::InvalidSource {
                input: "x".to_string()
            }),
            None
        );
    }
}
