use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::cli::ConfigKey;
use crate::env::DEFAULT_INSTALL_DIR;
use crate::error::{InstallError, Result};
use crate::platform::FixedPlatform;
use crate::proxy::Proxy;
use crate::source::Repo;

pub const DEFAULT_CONFIG_PATH: &str = ".config/binpick.toml";

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub repo: HashMap<String, RepoConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DefaultConfig {
    #[serde(default = "default_install_dir")]
    pub install_dir: String,

    /// Seconds allowed for each HTTP request.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Target triple to install for instead of the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Download mirror, `github` or a URL prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// URL of the builtin name table; the lookup is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin_index: Option<String>,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            target: None,
            proxy: None,
            builtin_index: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct RepoConfig {
    #[serde(default)]
    pub bin: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

fn default_install_dir() -> String {
    DEFAULT_INSTALL_DIR.to_string()
}

fn default_timeout() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

impl Config {
    /// Load configuration from file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let config_error = |message: String| InstallError::Config {
            path: path.display().to_string(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        toml::from_str(&content).map_err(|e| config_error(e.to_string()))
    }

    /// Write the configuration back, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_error = |message: String| InstallError::Config {
            path: path.display().to_string(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| config_error(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| config_error(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| config_error(e.to_string()))?;
        tracing::debug!("saved configuration to {}", path.display());
        Ok(())
    }

    /// Current value of a `[default]` setting, for display.
    pub fn get(&self, key: ConfigKey) -> String {
        let d = &self.default;
        match key {
            ConfigKey::Dir => d.install_dir.clone(),
            ConfigKey::Target => d
                .target
                .clone()
                .unwrap_or_else(|| "not set (detected from the host)".to_string()),
            ConfigKey::Timeout => format!("{} seconds", d.timeout),
            ConfigKey::Retry => d.max_retries.to_string(),
            ConfigKey::Proxy => d.proxy.clone().unwrap_or_else(|| Proxy::Github.to_string()),
        }
    }

    /// Change a `[default]` setting after checking the value.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        let invalid = |message: String| InstallError::Config {
            path: format!("{key:?}").to_lowercase(),
            message,
        };
        let d = &mut self.default;
        match key {
            ConfigKey::Dir => {
                if value.trim().is_empty() {
                    return Err(invalid("install directory is empty".to_string()));
                }
                d.install_dir = value.to_string();
            }
            ConfigKey::Target => {
                if FixedPlatform::from_triple(value).is_none() {
                    return Err(invalid(format!("unknown target triple '{value}'")));
                }
                d.target = Some(value.to_string());
            }
            ConfigKey::Timeout => {
                d.timeout = value
                    .parse()
                    .map_err(|_| invalid(format!("'{value}' is not a number of seconds")))?;
            }
            ConfigKey::Retry => {
                d.max_retries = value
                    .parse()
                    .map_err(|_| invalid(format!("'{value}' is not a retry count")))?;
            }
            ConfigKey::Proxy => {
                let proxy: Proxy = value.parse()?;
                d.proxy = match proxy {
                    Proxy::Github => None,
                    prefix => Some(prefix.to_string()),
                };
            }
        }
        Ok(())
    }

    /// Settings for `owner/repo`, matched without case.
    pub fn get_repo_config(&self, repo: &Repo) -> Option<&RepoConfig> {
        let key = repo.full_name();
        self.repo
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
            .map(|(_, v)| v)
    }

    /// Fill the arguments the command line left unset.
    pub fn merge_with_args(&self, args: &mut crate::cli::Args, repo: Option<&Repo>) {
        if args.install_dir.is_none() {
            args.install_dir = Some(self.default.install_dir.clone());
        }
        if args.timeout.is_none() {
            args.timeout = Some(self.default.timeout);
        }
        if args.max_retries.is_none() {
            args.max_retries = Some(self.default.max_retries);
        }
        if args.proxy.is_none() {
            args.proxy = self.default.proxy.clone();
        }

        if let Some(repo_config) = repo.and_then(|r| self.get_repo_config(r)) {
            if args.bin.is_empty() {
                args.bin = repo_config.bin.clone();
            }
            if args.target.is_none() {
                args.target = repo_config.target.clone();
            }
        }
        if args.target.is_none() {
            args.target = self.default.target.clone();
        }
    }
}
