use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

use crate::archive::{self, is_archive, strip_archive_extension};
use crate::builtin;
use crate::cli::Args;
use crate::config::Config;
use crate::error::InstallError;
use crate::github::GitHubClient;
use crate::manifest::{file_name, is_url, Artifact, DistManifest};
use crate::output::{InstallItem, InstallOutput};
use crate::planner::{write_files, InstallPlanner};
use crate::proxy::Proxy;
use crate::platform::{FixedPlatform, HostPlatform, Os, Platform, Target};
use crate::release::{resolve_asset_urls, target_list, ResolvedAsset};
use crate::rule::RuleSet;
use crate::source::{Repo, Source};

pub struct Installer {
    args: Args,
    config: Config,
    source: Source,
    github_client: GitHubClient,
    rules: RuleSet,
    local: Vec<Target>,
    os: Os,
}

impl Installer {
    pub fn new(mut args: Args) -> Result<Self> {
        // Load configuration
        let config = Config::load(&args.config).context("Failed to load configuration")?;

        let input = args.source.clone().ok_or_else(|| InstallError::InvalidSource {
            input: String::new(),
        })?;
        let source = match Source::parse(&input)? {
            Source::Repo(repo) => Source::Repo(repo.with_tag(args.tag.clone())),
            other => other,
        };
        let repo = match &source {
            Source::Repo(repo) => Some(repo),
            _ => None,
        };
        config.merge_with_args(&mut args, repo);

        let platform: Box<dyn Platform> = match &args.target {
            Some(triple) => Box::new(
                FixedPlatform::from_triple(triple)
                    .ok_or_else(|| anyhow!("Unknown target triple '{}'", triple))?,
            ),
            None => Box::new(HostPlatform),
        };
        let description = platform.describe();
        let local = platform.local_targets();
        if local.is_empty() {
            tracing::warn!(
                "{}-{} is not a supported platform; no release asset will match",
                std::env::consts::OS,
                std::env::consts::ARCH
            );
        }
        tracing::debug!("local targets: {}", target_list(&local));
        let os = description
            .map(|d| d.os)
            .or_else(|| Os::from_host(std::env::consts::OS))
            .unwrap_or(Os::Linux);

        let proxy: Proxy = args.proxy.as_deref().unwrap_or_default().parse()?;
        if proxy != Proxy::Github {
            tracing::info!("Downloading GitHub releases through {}", proxy);
        }
        let github_client =
            GitHubClient::new(args.timeout(), args.retry_config())?.with_proxy(proxy);
        let rules = RuleSet::build(None)?;

        Ok(Self {
            args,
            config,
            source,
            github_client,
            rules,
            local,
            os,
        })
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn local_targets(&self) -> &[Target] {
        &self.local
    }

    pub async fn run(&self) -> Result<InstallOutput> {
        let install_dir = self.args.install_dir()?;
        tracing::info!(
            "Installing {} into {}",
            self.args.source.as_deref().unwrap_or_default(),
            install_dir.display()
        );

        let output = match &self.source {
            Source::Manifest(location) => {
                let manifest = self.fetch_manifest(location, None).await?;
                self.install_from_manifest(&manifest, location, &install_dir)
                    .await
            }
            Source::Repo(repo) => self.install_from_repo(repo, &install_dir).await?,
            Source::ArchiveUrl(url) | Source::FileUrl(url) => {
                let name = self.guess_name(file_name(url));
                self.install_asset(url, &name, None, &install_dir).await?
            }
            Source::Local(path) => self.install_local(path, &install_dir)?,
            Source::Nightly(url) => self.install_from_nightly(url, &install_dir).await?,
        };

        tracing::info!("Installed {} item(s)", output.len());
        Ok(output)
    }

    async fn install_from_repo(&self, repo: &Repo, install_dir: &Path) -> Result<InstallOutput> {
        tracing::info!(
            "Installing from {} (tag: {})",
            repo.full_name(),
            repo.tag.as_deref().unwrap_or("latest")
        );

        // A dist manifest, when the release has one, replaces filename guessing.
        let manifest_url = repo.manifest_url();
        match self.fetch_manifest(&manifest_url, None).await {
            Ok(manifest) => {
                return Ok(self
                    .install_from_manifest(&manifest, &manifest_url, install_dir)
                    .await)
            }
            Err(e) => tracing::debug!("no usable dist manifest for {}: {:#}", repo, e),
        }

        if let Some(index_url) = &self.config.default.builtin_index {
            let table = builtin::table(&self.github_client, index_url).await;
            if let Some(name) = builtin::lookup(table, repo) {
                let url = builtin::manifest_url(index_url, &name);
                tracing::info!("{} is a builtin entry, using {}", repo.full_name(), url);
                match self.fetch_manifest(&url, repo.tag.as_deref()).await {
                    Ok(manifest) => {
                        return Ok(self.install_from_manifest(&manifest, &url, install_dir).await)
                    }
                    Err(e) => tracing::warn!("builtin manifest {} is unusable: {:#}", url, e),
                }
            }
        }

        let assets = self.github_client.release_assets(repo).await?;
        tracing::debug!("{} assets in the release", assets.len());
        let resolved = resolve_asset_urls(&assets, self.args.hint(), &self.local)?;
        if resolved.is_empty() {
            tracing::error!(
                "No release asset of {} matches this machine ({})",
                repo.url(),
                target_list(&self.local)
            );
        }
        Ok(self.install_resolved(resolved, None, install_dir).await)
    }

    async fn install_from_nightly(&self, url: &str, install_dir: &Path) -> Result<InstallOutput> {
        tracing::info!("Installing workflow artifacts from {}", url);
        let assets = self.github_client.nightly_assets(url).await?;
        tracing::debug!("{} artifacts on {}", assets.len(), url);
        let resolved = resolve_asset_urls(&assets, self.args.hint(), &self.local)?;
        if resolved.is_empty() {
            tracing::error!(
                "No artifact on {} matches this machine ({})",
                url,
                target_list(&self.local)
            );
        }
        Ok(self.install_resolved(resolved, None, install_dir).await)
    }

    /// Read a manifest from a URL or a path, re-pointed at `tag` if given.
    async fn fetch_manifest(&self, location: &str, tag: Option<&str>) -> Result<DistManifest> {
        let text = if is_url(location) {
            self.github_client.download_text(location).await?
        } else {
            fs::read_to_string(location)
                .with_context(|| format!("Failed to read manifest {location}"))?
        };
        let text = builtin::retag(&text, tag);
        Ok(DistManifest::parse(location, &text)?)
    }

    async fn install_from_manifest(
        &self,
        manifest: &DistManifest,
        location: &str,
        install_dir: &Path,
    ) -> InstallOutput {
        if let Some(artifact) = manifest.select_artifact(&self.local) {
            tracing::info!(
                "Using artifact {} from {}",
                artifact.name.as_deref().unwrap_or("<unnamed>"),
                location
            );
        }
        let candidates = match manifest.list_candidate_urls(&self.local, Some(location)) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!("Failed to read candidates from {}: {}", location, e);
                return InstallOutput::new();
            }
        };
        if candidates.is_empty() {
            let diagnostic = InstallError::NoMatchFound {
                input: location.to_string(),
                targets: target_list(&self.local),
            };
            tracing::warn!("{}", diagnostic);
        }
        self.install_resolved(candidates, Some(manifest), install_dir)
            .await
    }

    /// Install each candidate in turn. One failure does not stop the rest.
    async fn install_resolved(
        &self,
        candidates: Vec<ResolvedAsset>,
        manifest: Option<&DistManifest>,
        install_dir: &Path,
    ) -> InstallOutput {
        let mut output = InstallOutput::new();
        for candidate in candidates {
            if !self.args.bin.is_empty() && !self.args.bin.contains(&candidate.name) {
                tracing::debug!("{} was not requested, skipping", candidate.name);
                continue;
            }
            let artifact = manifest.and_then(|m| m.artifact_for_url(&candidate.url));
            match self
                .install_asset(&candidate.url, &candidate.name, artifact, install_dir)
                .await
            {
                Ok(installed) => output.extend(installed),
                Err(e) => tracing::error!(
                    "Failed to install {} from {}: {:#}",
                    candidate.name,
                    candidate.url,
                    e
                ),
            }
        }
        output
    }

    async fn install_asset(
        &self,
        url: &str,
        name: &str,
        artifact: Option<&Artifact>,
        install_dir: &Path,
    ) -> Result<InstallOutput> {
        let filename = file_name(url);
        if self.is_foreign_exe(filename) {
            tracing::info!("Skipping Windows executable {}", url);
            return Ok(InstallOutput::new());
        }

        // local manifests list files next to themselves
        let bytes = if is_url(url) {
            self.github_client.download(url).await?
        } else {
            fs::read(url).with_context(|| format!("Failed to read {url}"))?
        };
        let item = self.plan_download(filename, bytes, name, artifact, install_dir)?;
        self.write(url, item)
    }

    fn install_local(&self, path: &Path, install_dir: &Path) -> Result<InstallOutput> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| InstallError::InvalidSource {
                input: path.display().to_string(),
            })?;
        if self.is_foreign_exe(filename) {
            tracing::info!("Skipping Windows executable {}", path.display());
            return Ok(InstallOutput::new());
        }

        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let name = self.guess_name(filename);
        let item = self.plan_download(filename, bytes, &name, None, install_dir)?;
        self.write(&path.display().to_string(), item)
    }

    fn plan_download(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        name: &str,
        artifact: Option<&Artifact>,
        install_dir: &Path,
    ) -> Result<InstallItem> {
        let planner = InstallPlanner::new(install_dir, name, self.os)
            .with_alias(self.args.alias.as_deref())
            .with_artifact(artifact);

        if !is_archive(filename) {
            return Ok(planner.plan_single_file(filename, bytes));
        }

        let mut entries = archive::extract(filename, &bytes)?;

        // An archive holding nothing but another archive, e.g. a zip
        // wrapping a tarball.
        if entries.len() == 1 && !entries[0].is_dir && is_archive(&entries[0].path) {
            let inner = entries.remove(0);
            let inner_file = file_name(&inner.path).to_string();
            let inner_name = self.guess_name(&inner_file);
            tracing::info!(
                "Nested archive {} in {}, installing as {}",
                inner_file,
                filename,
                inner_name
            );
            return self.plan_download(&inner_file, inner.content, &inner_name, None, install_dir);
        }

        Ok(planner.plan(entries))
    }

    fn write(&self, origin: &str, mut item: InstallItem) -> Result<InstallOutput> {
        let mut output = InstallOutput::new();
        if item.files.is_empty() {
            tracing::warn!("Nothing to install from {}", origin);
            return Ok(output);
        }

        write_files(&mut item)
            .with_context(|| format!("Failed to install files from {origin}"))?;
        output.insert(origin, item);
        Ok(output)
    }

    /// Binary name for a file the rules may or may not recognise.
    fn guess_name(&self, filename: &str) -> String {
        if let Some(m) = self.rules.guess(filename, &self.local) {
            return m.name;
        }
        let stem = strip_archive_extension(filename);
        let stem = stem
            .strip_suffix(".exe")
            .or_else(|| stem.strip_suffix(".EXE"))
            .unwrap_or(stem);
        stem.to_string()
    }

    fn is_foreign_exe(&self, filename: &str) -> bool {
        self.os != Os::Windows && filename.to_ascii_lowercase().ends_with(".exe")
    }
}
