use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// StagedInstall extracts beside the final target and renames it into place.
///
/// The final `<root>/<name>/<version>` folder only ever appears complete, so
/// its presence alone means "installed".
pub struct StagedInstall {
    item: String,
    staging_dir: PathBuf,
    target_dir: PathBuf,
}

/// Outcome of moving the staged content into place.
#[derive(Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Installed,
    /// Another installer put the target in place first.
    AlreadyPresent,
}

impl StagedInstall {
    pub fn new(item: impl Into<String>, target_dir: PathBuf) -> Result<Self> {
        let parent = target_dir
            .parent()
            .with_context(|| format!("Install target {:?} has no parent", target_dir))?;
        let staging_dir = parent.join(format!(".staging-{}", uuid::Uuid::new_v4()));
        Ok(Self {
            item: item.into(),
            staging_dir,
            target_dir,
        })
    }

    pub fn begin(&self) -> Result<()> {
        fs::create_dir_all(&self.staging_dir)
            .with_context(|| format!("Create staging dir {:?}", self.staging_dir))?;
        log::info!("[install:{}] begin", self.item);
        Ok(())
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Move `content` (a folder inside the staging dir) to the target.
    pub fn commit(&self, content: &Path) -> Result<CommitOutcome> {
        // Staging and target share a parent folder.
        let outcome = match fs::rename(content, &self.target_dir) {
            Ok(()) => CommitOutcome::Installed,
            Err(_) if self.target_dir.exists() => {
                log::info!("[install:{}] target appeared concurrently", self.item);
                CommitOutcome::AlreadyPresent
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Move dir {:?} -> {:?}", content, self.target_dir)
                })
            }
        };
        self.cleanup()?;
        log::info!("[install:{}] commit", self.item);
        Ok(outcome)
    }

    pub fn rollback(&self, reason: &str) -> Result<()> {
        log::warn!("[install:{}] rollback: {}", self.item, reason);
        self.cleanup()
    }

    fn cleanup(&self) -> Result<()> {
        match fs::remove_dir_all(&self.staging_dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("Remove staging dir {:?}", self.staging_dir))
            }
        }
    }
}
