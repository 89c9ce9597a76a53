use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("GitHub API error: {0}")]
    GitHubApi(Box<octocrab::Error>),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Release not found: {tag} in {owner}/{repo}")]
    ReleaseNotFound {
        tag: String,
        owner: String,
        repo: String,
    },

    #[error("No asset found for {input} matching targets: {targets}")]
    NoMatchFound { input: String, targets: String },

    #[error("Failed to parse dist-manifest at {location}: {reason}")]
    ManifestParse { location: String, reason: String },

    #[error("Archive extraction failed for {file}: {reason}")]
    Extraction { file: String, reason: String },

    #[error("Unsupported archive format: {file}. Supported formats: .tar, .tar.gz, .tgz, .tar.xz, .txz, .tar.bz2, .tbz2, .tar.zst, .tzst, .zip")]
    UnsupportedArchive { file: String },

    #[error("Archive entry escapes the destination directory: {path}")]
    PathTraversal { path: String },

    #[error("Cannot install over {path}: existing file could not be replaced")]
    InstallConflict { path: String },

    #[error("Invalid install source '{input}'. Expected owner/repo[@tag], a GitHub URL, an asset URL, a local file or a dist-manifest .json")]
    InvalidSource { input: String },

    #[error("Failed to download {url}: {message}")]
    DownloadFailed {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid asset pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Configuration error at {path}: {message}")]
    Config { path: String, message: String },

    #[error("Not enough space in {path}: {required} bytes needed, {available} available")]
    InsufficientSpace {
        path: String,
        required: u64,
        available: u64,
    },
}

pub type Result<T> = std::result::Result<T, InstallError>;

impl From<octocrab::Error> for InstallError {
    fn from(err: octocrab::Error) -> Self {
        InstallError::GitHubApi(Box::new(err))
    }
}
