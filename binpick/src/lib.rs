//! # binpick
//!
//! Install released binaries for the running platform.
//!
//! ## Overview
//!
//! `binpick` takes a repository, a release asset URL, a local file or a
//! `dist-manifest.json`, works out which published artifact fits the local
//! machine, downloads and unpacks it, and lays the files out under a per-user
//! install root.
//!
//! When a release ships a dist manifest, its declared target triples decide.
//! Otherwise asset filenames are classified by a ranked set of patterns
//! covering the naming conventions found in the wild (`x86_64-unknown-linux-musl`,
//! `linux-amd64`, `win_x64`, `macos-universal` and many more).
//!
//! ## Usage
//!
//! ```bash
//! # Latest release of a repository
//! binpick starship/starship
//!
//! # A specific tag, keeping one binary
//! binpick owner/repo@v1.0.0 --bin tool
//!
//! # A single asset
//! binpick https://github.com/owner/repo/releases/download/v1/tool-linux-x64.tar.gz
//!
//! # Artifacts of the last workflow run
//! binpick https://nightly.link/owner/repo/workflows/release/main
//! ```
//!
//! ## Configuration
//!
//! Defaults are read from `.config/binpick.toml` (see [`config::Config`]) and
//! can be changed with `binpick config <key> <value>`.

/// Archive format detection and in-memory extraction
pub mod archive;

/// Repository to manifest-name table for projects without a dist manifest
pub mod builtin;

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Configuration file handling and repository-specific settings
pub mod config;

/// Install root resolution and PATH registration
pub mod env;

/// Error types and error handling utilities
pub mod error;

/// GitHub release listing and downloads
pub mod github;

/// Orchestration from a parsed source to installed files
pub mod installer;

/// `dist-manifest.json` parsing and artifact selection
pub mod manifest;

/// What an install produced, and how it is displayed
pub mod output;

/// Asset lists read from release and nightly.link HTML pages
pub mod page;

/// Install layout and the filesystem write step
pub mod planner;

/// Operating systems, architectures and the target labels naming them
pub mod platform;

/// GitHub download mirrors
pub mod proxy;

/// Asset selection for releases without a manifest
pub mod release;

/// Network retry logic with exponential backoff
pub mod retry;

/// Ranked filename patterns
pub mod rule;

/// Classification of the install source
pub mod source;
