use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::env::{resolve_install_dir, DEFAULT_INSTALL_DIR};
use crate::error::Result;
use crate::retry::RetryConfig;

#[derive(Parser, Debug, Clone)]
#[clap(
    name = "binpick",
    version,
    about = "Install released binaries for the running platform",
    long_about = None,
    args_conflicts_with_subcommands = true
)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Option<Command>,

    /// What to install
    /// Formats: owner/repo[@tag], a GitHub repository, release or download URL,
    /// a nightly.link workflow URL, an asset URL, a local file, or a dist-manifest .json
    #[clap(value_name = "SOURCE")]
    pub source: Option<String>,

    /// Release tag, when SOURCE does not carry one
    #[clap(short, long)]
    pub tag: Option<String>,

    /// Binary to keep (repeatable); a single name also steers asset matching
    #[clap(short, long)]
    pub bin: Vec<String>,

    /// Install for this target triple instead of the host (e.g., aarch64-apple-darwin)
    #[clap(short = 'T', long)]
    pub target: Option<String>,

    /// Install root [default: ~/.binpick]
    #[clap(long, env = "BINPICK_INSTALL_DIR")]
    pub install_dir: Option<String>,

    /// Subdirectory of the install root, or a path when it contains a separator
    #[clap(short = 'd', long)]
    pub dir: Option<String>,

    /// Rename the installed binary (single file) or its directory
    #[clap(short, long)]
    pub alias: Option<String>,

    /// Seconds allowed for each HTTP request [default: 600]
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Maximum number of retries for network operations [default: 3]
    #[clap(long)]
    pub max_retries: Option<u32>,

    /// Disable retries for network operations
    #[clap(long)]
    pub no_retry: bool,

    /// Do not register the bin directory on PATH
    #[clap(long, visible_alias = "install-only")]
    pub no_path: bool,

    /// Fetch GitHub release downloads through a mirror: 'github' or a URL prefix
    #[clap(long)]
    pub proxy: Option<String>,

    /// Configuration file path
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enable verbose output
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show or change the saved defaults in the configuration file
    Config {
        /// Setting to show or change; all settings are shown when omitted
        #[clap(value_enum)]
        key: Option<ConfigKey>,

        /// New value; the current value is shown when omitted
        value: Option<String>,
    },
}

/// Settings the `config` subcommand can show and change.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    /// Install root
    Dir,
    /// Target triple used instead of the host
    Target,
    /// Seconds allowed for each HTTP request
    Timeout,
    /// Maximum number of retries
    Retry,
    /// Download mirror
    Proxy,
}

impl Args {
    pub fn retry_config(&self) -> RetryConfig {
        if self.no_retry {
            return RetryConfig::disabled();
        }
        RetryConfig {
            max_retries: self.max_retries.unwrap_or(RetryConfig::default().max_retries),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(600))
    }

    /// Where files go, with `~` expanded and `--dir` applied.
    pub fn install_dir(&self) -> Result<PathBuf> {
        resolve_install_dir(
            self.install_dir.as_deref().unwrap_or(DEFAULT_INSTALL_DIR),
            self.dir.as_deref(),
        )
    }

    /// A single `--bin` narrows filename matching to that name.
    pub fn hint(&self) -> Option<&str> {
        match self.bin.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}
