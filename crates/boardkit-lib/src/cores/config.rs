//! Manager settings.
//! Every folder defaults to a fixed place under `data_dir`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RETRIES: u32 = 0;

pub const HARDWARE_FOLDER: &str = "hardware";
pub const TOOLS_FOLDER: &str = "tools";
pub const DOWNLOADS_FOLDER: &str = "staging/packages";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub hardware_dir: Option<PathBuf>,
    #[serde(default)]
    pub tools_dir: Option<PathBuf>,
    #[serde(default)]
    pub downloads_dir: Option<PathBuf>,
    /// Local index documents loaded by `reload()`.
    #[serde(default)]
    pub index_files: Vec<PathBuf>,
    /// Sketchbook or user hardware roots; releases found there are unmanaged.
    #[serde(default)]
    pub extra_hardware_dirs: Vec<PathBuf>,
    /// Cap on simultaneous fetches; `None` fetches every archive at once.
    #[serde(default)]
    pub download_concurrency: Option<usize>,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retries: u32,
}

fn default_timeout() -> u64 {
    REQUEST_TIMEOUT_SECS
}

impl ManagerConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            hardware_dir: None,
            tools_dir: None,
            downloads_dir: None,
            index_files: Vec::new(),
            extra_hardware_dirs: Vec::new(),
            download_concurrency: None,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Read a JSON config file. Relative paths are taken relative to the file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let mut config: ManagerConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.data_dir);
        for dir in [&mut self.hardware_dir, &mut self.tools_dir, &mut self.downloads_dir]
            .into_iter()
            .flatten()
        {
            fix(dir);
        }
        self.index_files.iter_mut().for_each(fix);
        self.extra_hardware_dirs.iter_mut().for_each(fix);
    }

    /// Managed cores folder: `<hardware_dir>/<packager>/<arch>/<version>`.
    pub fn hardware_dir(&self) -> PathBuf {
        self.hardware_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(HARDWARE_FOLDER))
    }

    /// Managed tools folder: `<tools_dir>/<packager>/<tool>/<version>`.
    pub fn tools_dir(&self) -> PathBuf {
        self.tools_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(TOOLS_FOLDER))
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.downloads_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DOWNLOADS_FOLDER))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}
