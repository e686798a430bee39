use crate::utils::version::VersionRequest;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A downloadable archive as described by a package index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub url: String,
    /// `ALGO:hex`, e.g. `SHA-256:4f3c...`. May be empty when the index omits it.
    #[serde(default)]
    pub checksum: String,
    pub archive_file_name: String,
    /// Declared archive size in bytes; 0 when unknown.
    #[serde(default)]
    pub size: u64,
}

impl Resource {
    /// Location of this archive inside the download cache.
    pub fn archive_path(&self, downloads_dir: &Path) -> Result<PathBuf> {
        let name = self.archive_file_name.as_str();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            anyhow::bail!("invalid archive file name '{}'", name);
        }
        Ok(downloads_dir.join(name))
    }
}

/// A board shipped with a platform release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub name: String,
    /// Board id from `boards.txt`; index documents only carry names.
    #[serde(default)]
    pub id: Option<String>,
}

/// `packager:tool@version` as declared by a platform release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolDependency {
    pub packager: String,
    pub name: String,
    pub version: VersionRequest,
}

impl fmt::Display for ToolDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.packager, self.name, self.version)
    }
}

/// What a caller wants resolved: never stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformReference {
    pub package: String,
    pub architecture: String,
    pub version: VersionRequest,
}

impl PlatformReference {
    pub fn new(
        package: impl Into<String>,
        architecture: impl Into<String>,
        version: impl Into<VersionRequest>,
    ) -> Self {
        Self {
            package: package.into(),
            architecture: architecture.into(),
            version: version.into(),
        }
    }

    /// Key used for this request in failure maps: `package:architecture@version`.
    pub fn code(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PlatformReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.package, self.architecture, self.version)
    }
}

impl FromStr for PlatformReference {
    type Err = anyhow::Error;

    /// Accepts `PACKAGER:ARCH` and `PACKAGER:ARCH@VERSION`.
    fn from_str(s: &str) -> Result<Self> {
        let (id, version) = match s.split_once('@') {
            Some((id, version)) => (id, VersionRequest::parse(version)),
            None => (s, VersionRequest::Latest),
        };
        let (package, architecture) = id
            .split_once(':')
            .filter(|(p, a)| !p.is_empty() && !a.is_empty() && !a.contains(':'))
            .ok_or_else(|| {
                anyhow::anyhow!("invalid item '{}' (not PACKAGER:ARCH[@VERSION])", s)
            })?;
        Ok(Self::new(package, architecture, version))
    }
}
