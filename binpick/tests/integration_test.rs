//! Integration tests for binpick
//!
//! These tests drive the resolution and install steps end to end on
//! in-memory archives and a temporary install root. Nothing here touches
//! the network.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use binpick::archive;
use binpick::cli::Args;
use binpick::installer::Installer;
use binpick::manifest::DistManifest;
use binpick::output::InstallItem;
use binpick::planner::{write_files, InstallPlanner};
use binpick::platform::{local_targets, Arch, FixedPlatform, Libc, Os, Platform};
use binpick::release::{resolve_asset_urls, ReleaseAsset};
use binpick::source::Source;
use clap::Parser;
use tempfile::TempDir;

/// Test helper to create a temporary installation directory
fn setup_test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

fn tar_gz(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, data, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    for (path, data) in files {
        writer.start_file(*path, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn install(archive_name: &str, bytes: &[u8], name: &str, root: &Path) -> InstallItem {
    let entries = archive::extract(archive_name, bytes).unwrap();
    let mut item = InstallPlanner::new(root, name, Os::Linux).plan(entries);
    write_files(&mut item).unwrap();
    item
}

fn summary(item: &InstallItem) -> Vec<(PathBuf, u64, u32)> {
    item.files
        .iter()
        .map(|f| (f.install_path.clone(), f.size, f.mode))
        .collect()
}

fn release(names: &[&str]) -> Vec<ReleaseAsset> {
    names
        .iter()
        .map(|name| ReleaseAsset {
            name: name.to_string(),
            download_url: format!("https://github.com/starship/starship/releases/download/v1.22.1/{name}"),
        })
        .collect()
}

const STARSHIP_ASSETS: &[&str] = &[
    "starship-aarch64-apple-darwin.tar.gz",
    "starship-aarch64-apple-darwin.tar.gz.sha256",
    "starship-x86_64-unknown-linux-gnu.tar.gz",
    "starship-x86_64-unknown-linux-musl.tar.gz",
    "starship-x86_64-unknown-linux-musl.tar.gz.sha256",
    "starship-x86_64-pc-windows-msvc.msi",
    "starship-x86_64-pc-windows-msvc.zip",
];

#[test]
fn test_release_resolution_per_platform() {
    let assets = release(STARSHIP_ASSETS);

    let gnu = local_targets(Os::Linux, Arch::X64, Some(Libc::Gnu));
    let resolved = resolve_asset_urls(&assets, None, &gnu).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].name, "starship");
    assert!(resolved[0].url.ends_with("starship-x86_64-unknown-linux-gnu.tar.gz"));

    let musl = local_targets(Os::Linux, Arch::X64, Some(Libc::Musl));
    let resolved = resolve_asset_urls(&assets, None, &musl).unwrap();
    assert!(resolved[0].url.ends_with("starship-x86_64-unknown-linux-musl.tar.gz"));

    let windows = local_targets(Os::Windows, Arch::X64, None);
    let resolved = resolve_asset_urls(&assets, None, &windows).unwrap();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].url.ends_with("starship-x86_64-pc-windows-msvc.zip"));

    let mac = local_targets(Os::Darwin, Arch::Arm64, None);
    let resolved = resolve_asset_urls(&assets, Some("starship"), &mac).unwrap();
    assert!(resolved[0].url.ends_with("starship-aarch64-apple-darwin.tar.gz"));
}

#[test]
fn test_no_match_is_an_empty_result() {
    let assets = release(&["starship-x86_64-unknown-linux-gnu.tar.gz", "checksums.txt"]);
    let freebsd = local_targets(Os::FreeBsd, Arch::Arm, None);
    assert!(resolve_asset_urls(&assets, None, &freebsd).unwrap().is_empty());
}

#[test]
fn test_injected_platform() {
    let platform = FixedPlatform::from_triple("aarch64-unknown-linux-musl").unwrap();
    let local = platform.local_targets();
    assert_eq!(local[0].label, "aarch64-unknown-linux-musl");
    assert!(local.iter().any(|t| t.label == "aarch64-unknown-linux-gnu"));
}

#[test]
fn test_install_tar_gz_into_directory() {
    let temp_dir = setup_test_dir();
    let bytes = tar_gz(&[
        ("tool-v1/tool", b"#!/bin/sh\necho tool\n", 0o755),
        ("tool-v1/README.md", b"# tool\n", 0o644),
        ("tool-v1/lib/libtool.so", b"\x7fELF", 0o644),
    ]);

    let item = install("tool-v1.tar.gz", &bytes, "tool", temp_dir.path());

    let root = temp_dir.path().join("tool");
    assert_eq!(item.install_dir, root);
    assert_eq!(item.bin_dir, root);
    assert_eq!(
        fs::read_to_string(root.join("tool")).unwrap(),
        "#!/bin/sh\necho tool\n"
    );
    assert!(root.join("README.md").is_file());
    assert!(root.join("lib/libtool.so").is_file());
    assert!(item.files.iter().all(|f| f.content.is_empty()));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(root.join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        let mode = fs::metadata(root.join("README.md")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);
    }
}

#[test]
fn test_install_single_file_zip_is_flattened() {
    let temp_dir = setup_test_dir();
    let bytes = zip(&[("dist/tool", b"binary")]);

    let item = install("tool-linux-x64.zip", &bytes, "tool", temp_dir.path());

    assert_eq!(item.files.len(), 1);
    assert_eq!(item.files[0].install_path, temp_dir.path().join("tool"));
    // named like the binary, so it is made executable
    assert_eq!(item.files[0].mode & 0o111, 0o111);
    assert!(temp_dir.path().join("tool").is_file());
}

#[test]
fn test_reinstall_is_idempotent() {
    let temp_dir = setup_test_dir();
    let bytes = tar_gz(&[
        ("pkg/bin/tool", b"v1", 0o755),
        ("pkg/share/tool.1", b"man page", 0o644),
    ]);

    let first = install("pkg.tar.gz", &bytes, "tool", temp_dir.path());
    let second = install("pkg.tar.gz", &bytes, "tool", temp_dir.path());

    assert_eq!(summary(&first), summary(&second));
    assert_eq!(first.bin_dir, temp_dir.path().join("tool").join("bin"));
}

#[test]
fn test_manifest_drives_selection() {
    let text = r#"{
      "artifacts": {
        "tool-x86_64-unknown-linux-gnu.tar.gz": {
          "name": "tool-x86_64-unknown-linux-gnu.tar.gz",
          "kind": "executable-zip",
          "target_triples": ["x86_64-unknown-linux-gnu"],
          "assets": [
            {"name": "tool", "path": "tool", "kind": "executable", "executable_name": "tool"},
            {"name": "README", "path": "README.md", "kind": "readme"}
          ]
        },
        "tool-aarch64-apple-darwin.tar.gz": {
          "name": "tool-aarch64-apple-darwin.tar.gz",
          "kind": "executable-zip",
          "target_triples": ["aarch64-apple-darwin"]
        }
      }
    }"#;
    let manifest = DistManifest::parse("dist-manifest.json", text).unwrap();
    let local = local_targets(Os::Linux, Arch::X64, Some(Libc::Gnu));

    let base = "https://github.com/o/tool/releases/download/v1/dist-manifest.json";
    let candidates = manifest.list_candidate_urls(&local, Some(base)).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].name, "tool");
    assert_eq!(
        candidates[0].url,
        "https://github.com/o/tool/releases/download/v1/tool-x86_64-unknown-linux-gnu.tar.gz"
    );

    // the readme is declared but not installable
    let artifact = manifest.artifact_for_url(&candidates[0].url).unwrap();
    let temp_dir = setup_test_dir();
    let bytes = tar_gz(&[
        ("tool-x86_64-unknown-linux-gnu/tool", b"bin", 0o755),
        ("tool-x86_64-unknown-linux-gnu/README.md", b"docs", 0o644),
    ]);
    let entries = archive::extract("tool-x86_64-unknown-linux-gnu.tar.gz", &bytes).unwrap();
    let mut item = InstallPlanner::new(temp_dir.path(), "tool", Os::Linux)
        .with_artifact(Some(artifact))
        .plan(entries);
    write_files(&mut item).unwrap();

    assert_eq!(item.files.len(), 1);
    assert!(temp_dir.path().join("tool").is_file());
    assert!(!temp_dir.path().join("README.md").exists());
}

#[test]
fn test_manifest_without_triples_installs_by_filename() {
    let text = r#"{"artifacts": {
        "https://h/r/tool-linux-x64.tar.gz": {},
        "https://h/r/tool-darwin-arm64.tar.gz": {}
    }}"#;
    let manifest = DistManifest::parse("builtin", text).unwrap();
    let local = local_targets(Os::Linux, Arch::X64, Some(Libc::Gnu));

    let candidates = manifest.list_candidate_urls(&local, None).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].url, "https://h/r/tool-linux-x64.tar.gz");

    // found, but it declares no assets to filter by
    let artifact = manifest.artifact_for_url(&candidates[0].url).unwrap();
    assert!(artifact.assets.is_empty());

    let temp_dir = setup_test_dir();
    let bytes = tar_gz(&[("tool-linux-x64/tool", b"bin", 0o755)]);
    let entries = archive::extract("tool-linux-x64.tar.gz", &bytes).unwrap();
    let mut item = InstallPlanner::new(temp_dir.path(), &candidates[0].name, Os::Linux)
        .with_artifact(Some(artifact))
        .plan(entries);
    write_files(&mut item).unwrap();

    assert_eq!(item.files.len(), 1);
    assert!(temp_dir.path().join("tool").is_file());
}

fn installer_args(source: &Path, install_root: &Path, config_dir: &Path) -> Args {
    Args::try_parse_from([
        "binpick",
        source.to_str().unwrap(),
        "--install-dir",
        install_root.to_str().unwrap(),
        "--target",
        "x86_64-unknown-linux-gnu",
        "--config",
        config_dir.join("absent.toml").to_str().unwrap(),
        "--no-retry",
        "--no-path",
    ])
    .unwrap()
}

#[tokio::test]
async fn test_installer_local_archive() {
    let work = setup_test_dir();
    let install_root = work.path().join("root");
    let archive_path = work.path().join("tool-x86_64-unknown-linux-gnu.tar.gz");
    fs::write(
        &archive_path,
        tar_gz(&[("tool-x86_64-unknown-linux-gnu/tool", b"#!/bin/sh\n", 0o755)]),
    )
    .unwrap();

    let installer = Installer::new(installer_args(&archive_path, &install_root, work.path())).unwrap();
    assert_eq!(installer.source(), &Source::Local(archive_path.clone()));
    assert_eq!(
        installer.local_targets()[0].label,
        "x86_64-unknown-linux-gnu"
    );

    let output = installer.run().await.unwrap();
    assert_eq!(output.len(), 1);
    assert!(install_root.join("tool").is_file());

    let shown = output.to_string();
    assert!(shown.contains("tool-x86_64-unknown-linux-gnu/tool"));
}

#[tokio::test]
async fn test_installer_nested_archive() {
    let work = setup_test_dir();
    let install_root = work.path().join("root");
    let inner = tar_gz(&[
        ("bloaty/bloaty", b"bin", 0o755),
        ("bloaty/LICENSE", b"license", 0o644),
    ]);
    let archive_path = work.path().join("bundle.zip");
    fs::write(
        &archive_path,
        zip(&[("bloaty-x86_64-unknown-linux-gnu.tar.gz", inner.as_slice())]),
    )
    .unwrap();

    let installer = Installer::new(installer_args(&archive_path, &install_root, work.path())).unwrap();
    installer.run().await.unwrap();

    // re-guessed from the inner archive, not the outer file name
    assert!(install_root.join("bloaty").join("bloaty").is_file());
    assert!(install_root.join("bloaty").join("LICENSE").is_file());
}

#[tokio::test]
async fn test_installer_local_manifest() {
    let work = setup_test_dir();
    let install_root = work.path().join("root");
    let dist = work.path().join("dist");
    fs::create_dir_all(&dist).unwrap();

    fs::write(
        dist.join("tool-x86_64-unknown-linux-gnu.tar.gz"),
        tar_gz(&[
            ("tool-x86_64-unknown-linux-gnu/tool", b"#!/bin/sh\n", 0o755),
            ("tool-x86_64-unknown-linux-gnu/README.md", b"docs", 0o644),
        ]),
    )
    .unwrap();
    let manifest_path = dist.join("dist-manifest.json");
    fs::write(
        &manifest_path,
        r#"{"artifacts": {
          "tool-x86_64-unknown-linux-gnu.tar.gz": {
            "name": "tool-x86_64-unknown-linux-gnu.tar.gz",
            "kind": "executable-zip",
            "target_triples": ["x86_64-unknown-linux-gnu"],
            "assets": [
              {"name": "tool", "path": "tool", "kind": "executable"},
              {"name": "README", "path": "README.md", "kind": "readme"}
            ]
          },
          "tool-aarch64-apple-darwin.tar.gz": {
            "name": "tool-aarch64-apple-darwin.tar.gz",
            "target_triples": ["aarch64-apple-darwin"]
          }
        }}"#,
    )
    .unwrap();

    let installer = Installer::new(installer_args(&manifest_path, &install_root, work.path())).unwrap();
    assert!(matches!(installer.source(), Source::Manifest(_)));

    let output = installer.run().await.unwrap();
    assert_eq!(output.len(), 1);
    assert_eq!(fs::read(install_root.join("tool")).unwrap(), b"#!/bin/sh\n");
    assert!(!install_root.join("README.md").exists());
}

#[tokio::test]
async fn test_installer_keeps_symlinked_launchers() {
    let work = setup_test_dir();
    let install_root = work.path().join("root");

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(4);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, "tool-x86_64-unknown-linux-gnu/lib/cli.js", &b"#!js"[..])
        .unwrap();
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    builder
        .append_link(&mut header, "tool-x86_64-unknown-linux-gnu/bin/tool", "../lib/cli.js")
        .unwrap();
    let archive_path = work.path().join("tool-x86_64-unknown-linux-gnu.tar");
    fs::write(&archive_path, builder.into_inner().unwrap()).unwrap();

    let installer = Installer::new(installer_args(&archive_path, &install_root, work.path())).unwrap();
    installer.run().await.unwrap();

    let launcher = install_root.join("tool").join("bin").join("tool");
    assert_eq!(fs::read(&launcher).unwrap(), b"#!js");
    assert!(install_root.join("tool").join("lib").join("cli.js").is_file());
}
