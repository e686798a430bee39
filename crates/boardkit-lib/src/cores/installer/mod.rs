pub mod extract;
pub mod transaction;

use crate::cores::catalog::Resource;
use crate::cores::download::checksum::verify_file;
use crate::cores::download::{NOT_AVAILABLE_FOR_HOST, NO_ARCHIVE_FOR_RELEASE};
use crate::cores::types::{
    ProcessResult, ProcessResults, ProgressReporter, STATUS_ALREADY_INSTALLED, STATUS_INSTALLED,
};
use anyhow::{Context, Result};
use extract::{extract_archive, find_root_dir};
use std::path::{Path, PathBuf};
use transaction::{CommitOutcome, StagedInstall};

/// What an install item is; decides how a missing archive is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Platform,
    Tool,
}

impl ItemKind {
    fn missing_resource(self) -> &'static str {
        match self {
            ItemKind::Platform => NO_ARCHIVE_FOR_RELEASE,
            ItemKind::Tool => NOT_AVAILABLE_FOR_HOST,
        }
    }
}

/// One release to put on disk at `<target_root>/<name>/<version>`.
#[derive(Debug, Clone)]
pub struct InstallItem {
    /// Key of the result, e.g. `arduino:avrdude@6.3.0`.
    pub code: String,
    pub kind: ItemKind,
    pub name: String,
    pub version: String,
    pub resource: Option<Resource>,
    pub target_root: PathBuf,
}

impl InstallItem {
    pub fn target_dir(&self) -> PathBuf {
        self.target_root.join(&self.name).join(&self.version)
    }
}

/// Install every item in order; one result per item code.
pub fn install_all(
    items: &[InstallItem],
    downloads_dir: &Path,
    reporter: &dyn ProgressReporter,
) -> ProcessResults {
    let mut results = ProcessResults::new();
    for (i, item) in items.iter().enumerate() {
        reporter.set_message(&format!("Installing {} ({}/{})", item.code, i + 1, items.len()));
        let result = install(item, downloads_dir);
        reporter.item_done(&item.code, &result);
        results.insert(item.code.clone(), result);
    }
    results
}

/// Install one release from its downloaded archive.
///
/// Idempotent: an existing target folder is reported as already installed
/// and left untouched.
pub fn install(item: &InstallItem, downloads_dir: &Path) -> ProcessResult {
    match try_install(item, downloads_dir) {
        Ok((status, path)) => {
            log::info!("{} {}: {:?}", status, item.code, path);
            ProcessResult::success(&item.code, status, path)
        }
        Err(e) => {
            log::warn!("Failed to install {}: {:#}", item.code, e);
            ProcessResult::failure(&item.code, format!("{:#}", e))
        }
    }
}

fn try_install(item: &InstallItem, downloads_dir: &Path) -> Result<(&'static str, PathBuf)> {
    check_path_component(&item.name)?;
    check_path_component(&item.version)?;

    let target = item.target_dir();
    if target.exists() {
        return Ok((STATUS_ALREADY_INSTALLED, target));
    }

    let resource = item
        .resource
        .as_ref()
        .context(item.kind.missing_resource())?;
    let archive = resource.archive_path(downloads_dir)?;
    if !archive.exists() {
        anyhow::bail!("archive {:?} has not been downloaded", archive);
    }
    verify_file(&archive, resource).context("Checking archive integrity")?;

    let parent = target
        .parent()
        .with_context(|| format!("Install target {:?} has no parent", target))?;
    std::fs::create_dir_all(parent).with_context(|| format!("Create {:?}", parent))?;

    let txn = StagedInstall::new(&item.code, target.clone())?;
    txn.begin()?;
    let staged = extract_archive(&archive, txn.staging_dir())
        .and_then(|()| find_root_dir(txn.staging_dir()))
        .and_then(|root| txn.commit(&root));
    match staged {
        Ok(CommitOutcome::Installed) => Ok((STATUS_INSTALLED, target)),
        Ok(CommitOutcome::AlreadyPresent) => Ok((STATUS_ALREADY_INSTALLED, target)),
        Err(e) => {
            if let Err(cleanup) = txn.rollback(&format!("{:#}", e)) {
                log::warn!("Rollback of {} failed: {:#}", item.code, cleanup);
            }
            Err(e)
        }
    }
}

fn check_path_component(part: &str) -> Result<()> {
    if part.is_empty() || part == "." || part == ".." || part.contains(['/', '\\']) {
        anyhow::bail!("invalid install path component '{}'", part);
    }
    Ok(())
}
