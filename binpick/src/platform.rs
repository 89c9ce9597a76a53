//! Platform catalog.
//!
//! Enumerates every platform a release asset may be published for, the
//! labels used to spell each platform in asset filenames, and the subset of
//! those platforms the running machine can execute.
//!
//! Host detection sits behind the [`Platform`] trait so callers (and tests)
//! can describe an arbitrary machine without touching process globals.

use std::fmt;
use std::process::Command;

/// Base rank of a canonical target triple such as `x86_64-unknown-linux-gnu`.
///
/// Informal aliases (`linux-x64`, `win64`, ...) carry ranks of at most 10, so
/// a triple always outranks an alias of the same platform.
pub const CANONICAL_RANK: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    Darwin,
    Linux,
    Windows,
    FreeBsd,
}

impl Os {
    pub const ALL: [Os; 4] = [Os::Darwin, Os::Linux, Os::Windows, Os::FreeBsd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Darwin => "darwin",
            Os::Linux => "linux",
            Os::Windows => "windows",
            Os::FreeBsd => "freebsd",
        }
    }

    /// Map a `std::env::consts::OS` value.
    pub fn from_host(os: &str) -> Option<Self> {
        match os {
            "macos" => Some(Os::Darwin),
            "linux" => Some(Os::Linux),
            "windows" => Some(Os::Windows),
            "freebsd" => Some(Os::FreeBsd),
            _ => None,
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    X64,
    Arm64,
    Ia32,
    Arm,
}

impl Arch {
    pub const ALL: [Arch; 4] = [Arch::X64, Arch::Arm64, Arch::Ia32, Arch::Arm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
            Arch::Ia32 => "ia32",
            Arch::Arm => "arm",
        }
    }

    /// Map a `std::env::consts::ARCH` value.
    pub fn from_host(arch: &str) -> Option<Self> {
        match arch {
            "x86_64" => Some(Arch::X64),
            "aarch64" => Some(Arch::Arm64),
            "x86" => Some(Arch::Ia32),
            "arm" => Some(Arch::Arm),
            _ => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Libc {
    Gnu,
    Musl,
}

impl fmt::Display for Libc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Libc::Gnu => f.write_str("gnu"),
            Libc::Musl => f.write_str("musl"),
        }
    }
}

/// One spelling of one platform.
///
/// `libc` is only set for Linux; every other OS carries `None`, including the
/// `-gnu` Windows toolchain whose suffix lives in `label` alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub label: String,
    pub os: Os,
    pub arch: Arch,
    pub libc: Option<Libc>,
    pub rank: u32,
}

impl Target {
    pub fn new(label: impl Into<String>, os: Os, arch: Arch, libc: Option<Libc>, rank: u32) -> Self {
        Self {
            label: label.into(),
            os,
            arch,
            libc,
            rank,
        }
    }

    pub fn is_musl(&self) -> bool {
        self.libc == Some(Libc::Musl)
    }

    /// Whether both targets describe the same real platform, whatever label
    /// they are spelled with.
    pub fn same_platform(&self, other: &Target) -> bool {
        self.os == other.os && self.arch == other.arch && self.libc == other.libc
    }

    /// Look up a canonical triple such as `aarch64-apple-darwin`.
    pub fn from_triple(triple: &str) -> Option<Target> {
        platforms().into_iter().find_map(|(os, arch, libc)| {
            canonical_triples(os, arch, libc)
                .iter()
                .find(|t| t.eq_ignore_ascii_case(triple))
                .map(|t| Target::new(*t, os, arch, libc, CANONICAL_RANK))
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Every `(os, arch, libc)` combination the catalog knows about.
pub fn platforms() -> Vec<(Os, Arch, Option<Libc>)> {
    let mut v = Vec::new();
    for os in Os::ALL {
        for arch in Arch::ALL {
            if os == Os::Linux {
                v.push((os, arch, Some(Libc::Gnu)));
                v.push((os, arch, Some(Libc::Musl)));
            } else {
                v.push((os, arch, None));
            }
        }
    }
    v
}

/// Canonical Rust target triples for a platform, most common first.
pub fn canonical_triples(os: Os, arch: Arch, libc: Option<Libc>) -> &'static [&'static str] {
    use Arch::*;
    use Libc::*;
    match (os, arch, libc) {
        (Os::Darwin, Arm64, _) => &["aarch64-apple-darwin"],
        (Os::Darwin, X64, _) => &["x86_64-apple-darwin"],
        (Os::Linux, X64, Some(Musl)) => &["x86_64-unknown-linux-musl"],
        (Os::Linux, X64, _) => &["x86_64-unknown-linux-gnu"],
        (Os::Linux, Arm64, Some(Musl)) => &["aarch64-unknown-linux-musl"],
        (Os::Linux, Arm64, _) => &["aarch64-unknown-linux-gnu"],
        (Os::Linux, Ia32, Some(Musl)) => &["i686-unknown-linux-musl"],
        (Os::Linux, Ia32, _) => &["i686-unknown-linux-gnu"],
        (Os::Linux, Arm, Some(Musl)) => &[
            "armv7-unknown-linux-musleabihf",
            "arm-unknown-linux-musleabihf",
        ],
        (Os::Linux, Arm, _) => &[
            "armv7-unknown-linux-gnueabihf",
            "arm-unknown-linux-gnueabihf",
        ],
        (Os::Windows, X64, _) => &["x86_64-pc-windows-msvc", "x86_64-pc-windows-gnu"],
        (Os::Windows, Arm64, _) => &["aarch64-pc-windows-msvc"],
        (Os::Windows, Ia32, _) => &["i686-pc-windows-msvc", "i686-pc-windows-gnu"],
        (Os::FreeBsd, X64, _) => &["x86_64-unknown-freebsd"],
        _ => &[],
    }
}

/// Informal labels seen in release asset names, with their rank.
pub fn aliases(os: Os, arch: Arch, libc: Option<Libc>) -> &'static [(&'static str, u32)] {
    use Arch::*;
    use Libc::*;
    match (os, arch, libc) {
        (Os::Darwin, Arm64, _) => &[
            ("darwin-aarch64", 10),
            ("darwin-arm64", 10),
            ("macos-aarch64", 10),
            ("macos-arm64", 10),
            ("mac64arm", 10),
            ("macos-universal", 10),
            ("universal", 5),
            ("macos", 1),
            ("darwin", 1),
            ("mac", 1),
        ],
        (Os::Darwin, X64, _) => &[
            ("darwin-amd64", 10),
            ("darwin-x64", 10),
            ("darwin-x86_64", 10),
            ("macos-amd64", 10),
            ("macos-x64", 10),
            ("macos-x86_64", 10),
            ("macos-legacy", 10),
            ("mac64", 10),
            ("macos-universal", 10),
            ("universal", 5),
            ("macos", 1),
            ("darwin", 1),
            ("mac", 1),
        ],
        (Os::Linux, X64, Some(Gnu)) => &[
            ("linux-amd64", 10),
            ("linux-x64", 10),
            ("linux-x86_64", 10),
            ("lin64", 10),
            ("linux64", 10),
            ("linux", 1),
        ],
        (Os::Linux, X64, Some(Musl)) => &[
            ("linux-amd64-musl", 10),
            ("linux-x64-musl", 10),
            ("linux-x86_64-musl", 10),
            ("linux-musl-x64", 10),
        ],
        (Os::Linux, Arm64, Some(Gnu)) => &[
            ("linux-arm64", 10),
            ("linux-aarch64", 10),
            ("linux", 1),
        ],
        (Os::Linux, Arm64, Some(Musl)) => &[
            ("linux-arm64-musl", 10),
            ("linux-aarch64-musl", 10),
            ("linux-musl-arm64", 10),
        ],
        (Os::Linux, Ia32, Some(Gnu)) => &[
            ("linux-386", 10),
            ("linux-i386", 10),
            ("linux-i686", 10),
            ("linux-x86", 10),
            ("linux32", 10),
        ],
        (Os::Linux, Arm, Some(Gnu)) => &[
            ("linux-armv7", 10),
            ("linux-armhf", 10),
            ("linux-arm", 5),
        ],
        (Os::Windows, X64, _) => &[
            ("win32-x64", 10),
            ("win-x64", 10),
            ("win64", 10),
            ("windows-amd64", 10),
            ("windows-x64", 10),
            ("windows-x86_64", 10),
            ("win", 10),
            ("x86_64", 5),
            ("windows", 1),
        ],
        (Os::Windows, Arm64, _) => &[
            ("windows-arm64", 10),
            ("windows-aarch64", 10),
            ("win32-arm64", 10),
            ("win-arm64", 10),
        ],
        (Os::Windows, Ia32, _) => &[
            ("windows-386", 10),
            ("windows-i686", 10),
            ("windows-x86", 10),
            ("win32-ia32", 10),
            ("win32", 5),
        ],
        (Os::FreeBsd, X64, _) => &[
            ("freebsd-amd64", 10),
            ("freebsd-x64", 10),
            ("freebsd-x86_64", 10),
            ("freebsd", 1),
        ],
        _ => &[],
    }
}

/// Every label of every platform, canonical triples first.
pub fn catalog() -> Vec<Target> {
    let mut v = Vec::new();
    for (os, arch, libc) in platforms() {
        for triple in canonical_triples(os, arch, libc) {
            v.push(Target::new(*triple, os, arch, libc, CANONICAL_RANK));
        }
        for (label, rank) in aliases(os, arch, libc) {
            v.push(Target::new(*label, os, arch, libc, *rank));
        }
    }
    v
}

/// Canonical targets the machine `(os, arch, libc)` can run, most preferred
/// first. `rank` encodes the preference, highest first.
///
/// Linux always offers both C libraries; musl leads only when `libc` says the
/// host is musl. An unsupported pair yields an empty list.
pub fn local_targets(os: Os, arch: Arch, libc: Option<Libc>) -> Vec<Target> {
    let libc_order = match (os, libc) {
        (Os::Linux, Some(Libc::Musl)) => vec![Some(Libc::Musl), Some(Libc::Gnu)],
        (Os::Linux, _) => vec![Some(Libc::Gnu), Some(Libc::Musl)],
        _ => vec![None],
    };

    let mut v: Vec<Target> = Vec::new();
    for libc in libc_order {
        for triple in canonical_triples(os, arch, libc) {
            v.push(Target::new(*triple, os, arch, libc, 0));
        }
    }

    let n = v.len() as u32;
    for (i, t) in v.iter_mut().enumerate() {
        t.rank = n - i as u32;
    }
    v
}

/// What a machine looks like to the resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Description {
    pub os: Os,
    pub arch: Arch,
    pub libc: Option<Libc>,
}

pub trait Platform {
    /// `None` when the machine is not one the catalog can describe.
    fn describe(&self) -> Option<Description>;

    fn local_targets(&self) -> Vec<Target> {
        self.describe()
            .map(|d| local_targets(d.os, d.arch, d.libc))
            .unwrap_or_default()
    }
}

/// The machine this process runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostPlatform;

impl Platform for HostPlatform {
    fn describe(&self) -> Option<Description> {
        let os = Os::from_host(std::env::consts::OS)?;
        let arch = Arch::from_host(std::env::consts::ARCH)?;
        let libc = if os == Os::Linux { detect_libc() } else { None };
        Some(Description { os, arch, libc })
    }
}

/// A machine given up front, from `--target` or from a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPlatform(pub Description);

impl FixedPlatform {
    pub fn new(os: Os, arch: Arch, libc: Option<Libc>) -> Self {
        Self(Description { os, arch, libc })
    }

    pub fn from_triple(triple: &str) -> Option<Self> {
        Target::from_triple(triple).map(|t| Self::new(t.os, t.arch, t.libc))
    }
}

impl Platform for FixedPlatform {
    fn describe(&self) -> Option<Description> {
        Some(self.0)
    }
}

/// Best-effort C library detection for Linux hosts.
///
/// Tries, in order: the text of `/usr/bin/ldd`, the objects mapped into this
/// process, and the output of `ldd --version`. Returns `None` when every
/// probe is inconclusive, which callers treat as glibc-first.
pub fn detect_libc() -> Option<Libc> {
    let musl = musl_from_filesystem()
        .or_else(musl_from_process)
        .or_else(musl_from_subprocess)?;
    tracing::debug!("libc detection: musl={}", musl);
    Some(if musl { Libc::Musl } else { Libc::Gnu })
}

fn musl_from_filesystem() -> Option<bool> {
    let bytes = std::fs::read("/usr/bin/ldd").ok()?;
    Some(String::from_utf8_lossy(&bytes).contains("musl"))
}

fn musl_from_process() -> Option<bool> {
    let maps = std::fs::read_to_string("/proc/self/maps").ok()?;
    if is_musl_object(&maps) {
        return Some(true);
    }
    if maps.contains("libc.so.6") || maps.contains("ld-linux") {
        return Some(false);
    }
    None
}

fn musl_from_subprocess() -> Option<bool> {
    // musl's ldd prints its banner to stderr and exits non-zero
    let output = Command::new("ldd").arg("--version").output().ok()?;
    let text = [output.stdout, output.stderr].concat();
    Some(String::from_utf8_lossy(&text).contains("musl"))
}

fn is_musl_object(s: &str) -> bool {
    s.contains("libc.musl-") || s.contains("ld-musl-")
}
