//! In-memory archive decoding.
//!
//! Downloads are small enough to keep in memory, so archives are decoded
//! straight from the downloaded buffer into [`Entry`] values; nothing touches
//! the filesystem until the planner writes the final layout.

use std::io::{Cursor, Read};
use std::path::{Component, Path};

use crate::error::{InstallError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarXz,
    TarBz2,
    TarZstd,
    Zip,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 6] = [
        ArchiveFormat::Tar,
        ArchiveFormat::TarGz,
        ArchiveFormat::TarXz,
        ArchiveFormat::TarBz2,
        ArchiveFormat::TarZstd,
        ArchiveFormat::Zip,
    ];

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ArchiveFormat::Tar => &[".tar"],
            ArchiveFormat::TarGz => &[".tar.gz", ".tgz"],
            ArchiveFormat::TarXz => &[".tar.xz", ".txz"],
            ArchiveFormat::TarBz2 => &[".tar.bz2", ".tbz2"],
            ArchiveFormat::TarZstd => &[".tar.zst", ".tzst", ".tzstd"],
            ArchiveFormat::Zip => &[".zip"],
        }
    }

    /// Detect the format from a filename or URL, longest extension first so
    /// `.tar.gz` is not mistaken for something ending in `.gz` alone.
    pub fn detect(name: &str) -> Option<(Self, &'static str)> {
        let lower = name.to_ascii_lowercase();
        Self::ALL
            .iter()
            .flat_map(|f| f.extensions().iter().map(move |e| (*f, *e)))
            .filter(|(_, ext)| lower.ends_with(ext))
            .max_by_key(|(_, ext)| ext.len())
    }
}

pub fn is_archive(name: &str) -> bool {
    ArchiveFormat::detect(name).is_some()
}

/// `mujs-1.3.5-x86_64-unknown-linux-gnu.tar.xz` -> `mujs-1.3.5-x86_64-unknown-linux-gnu`
pub fn strip_archive_extension(name: &str) -> &str {
    match ArchiveFormat::detect(name) {
        Some((_, ext)) => &name[..name.len() - ext.len()],
        None => name,
    }
}

/// One decoded archive member. `path` is relative and `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub mode: Option<u32>,
    pub is_dir: bool,
    pub content: Vec<u8>,
}

/// Decode `bytes`, using `name` to pick the format.
pub fn extract(name: &str, bytes: &[u8]) -> Result<Vec<Entry>> {
    let (format, _) = ArchiveFormat::detect(name).ok_or_else(|| InstallError::UnsupportedArchive {
        file: name.to_string(),
    })?;
    tracing::debug!("extracting {} as {:?} ({} bytes)", name, format, bytes.len());

    let entries = match format {
        ArchiveFormat::Tar => extract_tar(name, bytes),
        ArchiveFormat::TarGz => extract_tar(name, flate2::read::GzDecoder::new(bytes)),
        ArchiveFormat::TarXz => extract_tar(name, xz2::read::XzDecoder::new(bytes)),
        ArchiveFormat::TarBz2 => extract_tar(name, bzip2::read::BzDecoder::new(bytes)),
        ArchiveFormat::TarZstd => {
            let decoder = zstd::Decoder::new(bytes).map_err(|e| extraction_error(name, e))?;
            extract_tar(name, decoder)
        }
        ArchiveFormat::Zip => extract_zip(name, bytes),
    }?;

    tracing::trace!("{} entries in {}", entries.len(), name);
    Ok(entries)
}

fn extract_tar<R: Read>(name: &str, reader: R) -> Result<Vec<Entry>> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();
    let mut links = Vec::new();

    for entry in archive.entries().map_err(|e| extraction_error(name, e))? {
        let mut entry = entry.map_err(|e| extraction_error(name, e))?;
        let raw = entry.path().map_err(|e| extraction_error(name, e))?.into_owned();
        let kind = entry.header().entry_type();

        if kind.is_symlink() || kind.is_hard_link() {
            let Some(path) = normalize_entry_path(&raw)? else {
                continue;
            };
            let target = entry
                .link_name()
                .map_err(|e| extraction_error(name, e))?
                .ok_or_else(|| extraction_error(name, format!("link {path} has no target")))?;
            let target = resolve_link(&path, &target, kind.is_symlink())?;
            links.push((path, target));
            continue;
        }

        if !(kind.is_file() || kind.is_dir()) {
            tracing::debug!("skipping non-regular entry {} in {}", raw.display(), name);
            continue;
        }

        let Some(path) = normalize_entry_path(&raw)? else {
            continue;
        };

        let mut content = Vec::new();
        if kind.is_file() {
            entry
                .read_to_end(&mut content)
                .map_err(|e| extraction_error(name, e))?;
        }

        entries.push(Entry {
            path,
            mode: entry.header().mode().ok(),
            is_dir: kind.is_dir(),
            content,
        });
    }

    materialize_links(name, &mut entries, links);
    Ok(entries)
}

/// Archive-relative path a link points at.
///
/// Symlink targets are relative to the link's directory, hard link targets
/// to the archive root. Targets outside the archive are rejected.
fn resolve_link(link: &str, target: &Path, symlink: bool) -> Result<String> {
    let escape = || InstallError::PathTraversal {
        path: format!("{link} -> {}", target.display()),
    };

    let mut parts: Vec<String> = Vec::new();
    if symlink {
        parts.extend(link.split('/').map(str::to_string));
        parts.pop();
    }
    for component in target.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop().ok_or_else(escape)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }
    if parts.is_empty() {
        return Err(escape());
    }
    Ok(parts.join("/"))
}

/// Turn links into copies of the regular files they point at.
///
/// Chains of links resolve in later passes; links to directories or to
/// missing members are dropped.
fn materialize_links(name: &str, entries: &mut Vec<Entry>, mut links: Vec<(String, String)>) {
    while !links.is_empty() {
        let before = links.len();
        links.retain(|(path, target)| {
            let Some(found) = entries.iter().find(|e| !e.is_dir && e.path == *target) else {
                return true;
            };
            let copy = Entry {
                path: path.clone(),
                mode: found.mode,
                is_dir: false,
                content: found.content.clone(),
            };
            tracing::trace!("{} -> {} in {}", path, target, name);
            entries.push(copy);
            false
        });
        if links.len() == before {
            break;
        }
    }
    for (path, target) in links {
        tracing::debug!("skipping link {} -> {} in {}: no such file", path, target, name);
    }
}

fn extract_zip(name: &str, bytes: &[u8]) -> Result<Vec<Entry>> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| extraction_error(name, e))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| extraction_error(name, e))?;
        let Some(path) = normalize_entry_path(Path::new(file.name()))? else {
            continue;
        };

        let mut content = Vec::new();
        if !file.is_dir() {
            file.read_to_end(&mut content)
                .map_err(|e| extraction_error(name, e))?;
        }

        entries.push(Entry {
            path,
            mode: file.unix_mode(),
            is_dir: file.is_dir(),
            content,
        });
    }
    Ok(entries)
}

/// Reject entries that would land outside the install directory and drop
/// `.` components. Returns `None` for the archive root itself.
fn normalize_entry_path(path: &Path) -> Result<Option<String>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(InstallError::PathTraversal {
                    path: path.display().to_string(),
                });
            }
        }
    }
    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(parts.join("/")))
}

fn extraction_error(name: &str, err: impl std::fmt::Display) -> InstallError {
    InstallError::Extraction {
        file: name.to_string(),
        reason: err.to_string(),
    }
}
