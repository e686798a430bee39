use std::path::PathBuf;

/// Failure to load a package index document. Nothing from the document is merged.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Corrupted index {source_path}: {reason}")]
    Corrupted { source_path: String, reason: String },

    #[error("Failed to fetch index {url}: {reason}")]
    Fetch { url: String, reason: String },
}

/// Structural failure while scanning hardware directories.
/// Aborts the whole scan call; the catalog is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("{0} is not a folder")]
    NotADirectory(PathBuf),

    #[error("Reading {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Following possible symlink {path}: {source}")]
    SymlinkResolution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Symlink cycle: {path} resolves to {target}, which is already being scanned")]
    SymlinkCycle { path: PathBuf, target: PathBuf },

    #[error("Scan task did not complete: {0}")]
    Interrupted(String),

    #[error("Unversioned platform {path}: {reason}")]
    InvalidPlatformVersion { path: PathBuf, reason: String },

    #[error("Reading {path}: line {line}: {reason}")]
    MalformedProperties {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Per-request resolution failure. `Display` is the label shown to users.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Package not found")]
    PackageNotFound,

    #[error("Platform not found")]
    PlatformNotFound,

    #[error("Version not found")]
    VersionNotFound,

    #[error("Tool {packager}:{tool} not found")]
    ToolNotFound { packager: String, tool: String },

    #[error("Tool version {packager}:{tool}@{version} not found")]
    ToolVersionNotFound {
        packager: String,
        tool: String,
        version: String,
    },

    #[error("Cannot get tool dependencies of platform {platform}: {cause}")]
    Dependencies {
        platform: String,
        cause: Box<ResolveError>,
    },
}
