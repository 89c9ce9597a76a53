//! Install layout.
//!
//! Turns decoded archive entries (or a single downloaded file) into the set
//! of [`OutputFile`]s to write, then writes them. Planning is pure; only
//! [`write_files`] touches the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::Entry;
use crate::error::{InstallError, Result};
use crate::manifest::{Artifact, AssetKind};
use crate::output::{InstallItem, OutputFile};
use crate::platform::Os;

pub const EXECUTABLE_MODE: u32 = 0o755;
pub const FILE_MODE: u32 = 0o644;

const EXECUTABLE_EXTENSIONS: &[&str] = &["exe", "bat", "cmd", "ps1", "com"];

/// Length of the directory prefix shared by every path, separators included.
///
/// Only directory segments count; the final segment of each path is its file
/// name and is never stripped.
pub fn common_prefix_len(paths: &[&str]) -> usize {
    let Some((first, rest)) = paths.split_first() else {
        return 0;
    };

    let dirs = |p: &str| -> Vec<String> {
        let mut parts: Vec<String> = p.split('/').map(str::to_string).collect();
        parts.pop();
        parts
    };

    let mut common = dirs(*first);
    for path in rest {
        let other = dirs(*path);
        let shared = common
            .iter()
            .zip(other.iter())
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
    }

    common.iter().map(|s| s.len() + 1).sum()
}

/// `name` as an installable file name for `os`.
pub fn bin_name(name: &str, os: Os) -> String {
    if os == Os::Windows && Path::new(name).extension().is_none() {
        return format!("{name}.exe");
    }
    name.to_string()
}

fn has_executable_extension(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| EXECUTABLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Where and how to install one download.
#[derive(Debug, Clone)]
pub struct InstallPlanner<'a> {
    pub install_dir: &'a Path,
    /// Binary or bundle name, from the manifest or the filename rules.
    pub name: &'a str,
    pub alias: Option<&'a str>,
    pub artifact: Option<&'a Artifact>,
    pub os: Os,
}

impl<'a> InstallPlanner<'a> {
    pub fn new(install_dir: &'a Path, name: &'a str, os: Os) -> Self {
        Self {
            install_dir,
            name,
            alias: None,
            artifact: None,
            os,
        }
    }

    pub fn with_alias(mut self, alias: Option<&'a str>) -> Self {
        self.alias = alias;
        self
    }

    pub fn with_artifact(mut self, artifact: Option<&'a Artifact>) -> Self {
        self.artifact = artifact;
        self
    }

    /// Lay out the entries of an unpacked archive.
    pub fn plan(&self, entries: Vec<Entry>) -> InstallItem {
        if let Some(artifact) = self.artifact {
            if artifact.executable_dir_asset().is_some() {
                return self.plan_executable_dir(artifact, entries);
            }
        }

        let files: Vec<Entry> = entries
            .into_iter()
            .filter(|e| !e.is_dir)
            .filter(|e| match self.artifact {
                // no declared assets means no allow-list
                Some(a) if !a.assets.is_empty() => a.has_file(&e.path),
                _ => true,
            })
            .collect();

        let prefix_len = {
            let paths: Vec<&str> = files.iter().map(|e| e.path.as_str()).collect();
            common_prefix_len(&paths)
        };
        let single = files.len() == 1;
        let root = if single {
            self.install_dir.to_path_buf()
        } else {
            self.install_dir.join(self.alias.unwrap_or(self.name))
        };
        tracing::debug!(
            "planning {} files under {} (prefix {})",
            files.len(),
            root.display(),
            prefix_len
        );

        let mut planned = Vec::with_capacity(files.len());
        for entry in files {
            let mut relative = PathBuf::from(&entry.path[prefix_len..]);
            if let Some(renamed) = self.renamed(&entry.path, single) {
                relative.set_file_name(renamed);
            }
            let executable = self.is_executable(&entry);
            planned.push(output_file(entry, root.join(relative), executable));
        }

        let bin_dir = planned
            .iter()
            .find(|f| f.is_executable())
            .and_then(|f| f.install_path.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());

        InstallItem {
            install_dir: root,
            bin_dir,
            files: planned,
        }
    }

    /// Everything under the `executable-dir` asset's path, structure kept.
    fn plan_executable_dir(&self, artifact: &Artifact, entries: Vec<Entry>) -> InstallItem {
        let Some(asset) = artifact.executable_dir_asset() else {
            return InstallItem::default();
        };
        let dir_name = self
            .alias
            .or(asset.name.as_deref())
            .unwrap_or(self.name);
        let root = self.install_dir.join(dir_name);
        let bin_dir = match &asset.executable_dir {
            Some(d) => root.join(d),
            None => root.clone(),
        };
        let prefix = asset.path.as_deref().unwrap_or("").trim_matches('/');

        let mut planned = Vec::new();
        for entry in entries.into_iter().filter(|e| !e.is_dir) {
            let relative = artifact.relative_path(&entry.path);
            let Some(rest) = strip_dir_prefix(&relative, prefix) else {
                tracing::trace!("{} is outside {}", entry.path, prefix);
                continue;
            };
            let install_path = root.join(rest);
            let executable = self.is_executable(&entry);
            planned.push(output_file(entry, install_path, executable));
        }

        InstallItem {
            install_dir: root,
            bin_dir,
            files: planned,
        }
    }

    /// Lay out a download that is itself the binary.
    pub fn plan_single_file(&self, origin: &str, content: Vec<u8>) -> InstallItem {
        let file_name = bin_name(self.alias.unwrap_or(self.name), self.os);
        let install_path = self.install_dir.join(file_name);
        let file = OutputFile {
            mode: EXECUTABLE_MODE,
            size: content.len() as u64,
            install_path,
            origin_path: origin.to_string(),
            is_dir: false,
            content,
        };
        InstallItem {
            install_dir: self.install_dir.to_path_buf(),
            bin_dir: self.install_dir.to_path_buf(),
            files: vec![file],
        }
    }

    fn renamed(&self, path: &str, single: bool) -> Option<String> {
        let declared = self
            .artifact
            .and_then(|a| a.asset_by_path(path))
            .and_then(|a| a.executable_name.as_deref());
        match (declared, self.alias) {
            (_, Some(alias)) if single => Some(bin_name(alias, self.os)),
            (Some(exe), _) => Some(bin_name(exe, self.os)),
            _ => None,
        }
    }

    fn is_executable(&self, entry: &Entry) -> bool {
        if entry.mode.is_some_and(|m| m & 0o111 != 0) || has_executable_extension(&entry.path) {
            return true;
        }
        let declared = self
            .artifact
            .and_then(|a| a.asset_by_path(&entry.path))
            .is_some_and(|a| a.kind == AssetKind::Executable);
        let file_name = Path::new(&entry.path).file_name().and_then(|s| s.to_str());
        declared || file_name == Some(self.name)
    }
}

fn strip_dir_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    if prefix.is_empty() {
        return Some(path);
    }
    if let Some(rest) = path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
        return Some(rest);
    }
    let needle = format!("/{prefix}/");
    path.find(&needle).map(|i| &path[i + needle.len()..])
}

fn output_file(entry: Entry, install_path: PathBuf, executable: bool) -> OutputFile {
    let default = if executable { EXECUTABLE_MODE } else { FILE_MODE };
    let mut mode = entry.mode.map(|m| m & 0o7777).unwrap_or(default);
    if executable {
        mode |= 0o111;
    }
    OutputFile {
        mode,
        size: entry.content.len() as u64,
        install_path,
        origin_path: entry.path,
        is_dir: false,
        content: entry.content,
    }
}

/// Write every planned file, consuming its content.
///
/// Nothing is written when the target volume is too small for the files.
/// Later files overwrite earlier ones at the same path. A file standing where
/// a directory is needed is removed first; nothing is rolled back on failure.
pub fn write_files(item: &mut InstallItem) -> Result<()> {
    ensure_space(item)?;
    for file in &mut item.files {
        if file.is_dir {
            ensure_dir(&file.install_path)?;
            continue;
        }
        if let Some(parent) = file.install_path.parent() {
            ensure_dir(parent)?;
        }
        if file.install_path.is_dir() {
            return Err(InstallError::InstallConflict {
                path: file.install_path.display().to_string(),
            });
        }

        let content = std::mem::take(&mut file.content);
        fs::write(&file.install_path, &content)?;
        set_mode(&file.install_path, file.mode)?;
        tracing::debug!("wrote {} ({} bytes)", file.install_path.display(), content.len());
    }
    Ok(())
}

/// Compare the planned size against the free space of the volume holding
/// the install directory, or its nearest existing ancestor.
pub fn ensure_space(item: &InstallItem) -> Result<()> {
    let required = item
        .files
        .iter()
        .filter(|f| !f.is_dir)
        .fold(0u64, |sum, f| sum.saturating_add(f.size));
    if required == 0 {
        return Ok(());
    }

    let volume = item
        .install_dir
        .ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .unwrap_or(Path::new("."));
    match fs2::available_space(volume) {
        Ok(available) if available < required => Err(InstallError::InsufficientSpace {
            path: volume.display().to_string(),
            required,
            available,
        }),
        Ok(available) => {
            tracing::trace!("{} bytes needed, {} free in {}", required, available, volume.display());
            Ok(())
        }
        Err(e) => {
            tracing::warn!("Failed to read free space of {}: {}", volume.display(), e);
            Ok(())
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    let ancestors: Vec<&Path> = dir.ancestors().collect();
    for ancestor in ancestors.into_iter().rev() {
        if ancestor.is_file() {
            tracing::warn!(
                "removing file {} to make room for a directory",
                ancestor.display()
            );
            fs::remove_file(ancestor).map_err(|_| InstallError::InstallConflict {
                path: ancestor.display().to_string(),
            })?;
        }
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
