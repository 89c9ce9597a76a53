//! Install root and `PATH` registration.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{InstallError, Result};

pub const DEFAULT_INSTALL_DIR: &str = "~/.binpick";

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with(['/', '\\']) {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest.trim_start_matches(['/', '\\']));
            }
        }
    }
    PathBuf::from(path)
}

/// Where to install, given the configured root and an optional `--dir`.
///
/// A `dir` that looks like a path replaces the root; a bare name is a
/// subdirectory of it.
pub fn resolve_install_dir(root: &str, dir: Option<&str>) -> Result<PathBuf> {
    let root = expand_tilde(root);
    if root.as_os_str().is_empty() {
        return Err(InstallError::Config {
            path: "install_dir".to_string(),
            message: "install directory is empty".to_string(),
        });
    }
    Ok(match dir {
        Some(d) if d.contains(['/', '\\']) || d.starts_with('~') => expand_tilde(d),
        Some(d) => root.join(d),
        None => root,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRegistration {
    AlreadyPresent,
    /// Appended to the file named by `$GITHUB_PATH`.
    GithubPath(PathBuf),
    /// The user has to add it; carries the suggested command.
    Hint(String),
}

/// Make `dir` discoverable on `PATH` for the current environment.
///
/// Shell profiles are never edited: under GitHub Actions the directory is
/// appended to `$GITHUB_PATH`, elsewhere a hint is returned.
pub fn register_path(dir: &Path) -> Result<PathRegistration> {
    register_path_with(
        dir,
        std::env::var_os("PATH"),
        std::env::var_os("GITHUB_PATH").map(PathBuf::from),
    )
}

pub fn register_path_with(
    dir: &Path,
    path_var: Option<OsString>,
    github_path: Option<PathBuf>,
) -> Result<PathRegistration> {
    if is_on_path(dir, path_var.as_deref()) {
        return Ok(PathRegistration::AlreadyPresent);
    }

    if let Some(file) = github_path {
        let mut f = OpenOptions::new().create(true).append(true).open(&file)?;
        writeln!(f, "{}", dir.display())?;
        tracing::info!("added {} to {}", dir.display(), file.display());
        return Ok(PathRegistration::GithubPath(file));
    }

    Ok(PathRegistration::Hint(path_hint(dir)))
}

fn is_on_path(dir: &Path, path_var: Option<&std::ffi::OsStr>) -> bool {
    path_var
        .map(|p| std::env::split_paths(p).any(|entry| entry == dir))
        .unwrap_or(false)
}

fn path_hint(dir: &Path) -> String {
    if cfg!(windows) {
        format!("$env:PATH = \"{};$env:PATH\"", dir.display())
    } else {
        format!("export PATH=\"{}:$PATH\"", dir.display())
    }
}
