use crate::cores::catalog::{Catalog, PlatformRelease, PlatformReference, Resource, ToolRelease};
use crate::cores::config::ManagerConfig;
use crate::cores::download::{Downloader, NO_ARCHIVE_FOR_RELEASE};
use crate::cores::error::{IndexError, ScanError};
use crate::cores::index;
use crate::cores::installer::{self, InstallItem, ItemKind};
use crate::cores::resolver::{self, Resolution};
use crate::cores::scanner::HardwareScanner;
use crate::cores::types::{
    CancelToken, ProcessResult, ProcessResults, ProgressReporter, SilentProgressReporter,
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Entry point for resolving, downloading and installing platforms and tools.
///
/// Owns its catalog. Readers work on an immutable snapshot; index and
/// hardware loads build a new catalog off to the side and swap it in only
/// once the whole call succeeded.
pub struct PackageManager {
    config: ManagerConfig,
    catalog: RwLock<Arc<Catalog>>,
    /// Held for a whole load so concurrent loads never drop each other's work.
    loading: Mutex<()>,
    downloader: Downloader,
    client: reqwest::Client,
    reporter: Arc<dyn ProgressReporter>,
}

impl PackageManager {
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;
        let downloader = Downloader::new(
            client.clone(),
            config.downloads_dir(),
            config.download_concurrency,
            config.retries,
        );
        Ok(Self {
            config,
            catalog: RwLock::new(Arc::new(Catalog::new())),
            loading: Mutex::new(()),
            downloader,
            client,
            reporter: Arc::new(SilentProgressReporter),
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The catalog as of now. Later loads never mutate a snapshot in place.
    pub async fn snapshot(&self) -> Arc<Catalog> {
        self.catalog.read().await.clone()
    }

    /// Replace every index-derived entry with the content of `paths`.
    /// Releases discovered on disk are kept.
    pub async fn load_package_indexes(&self, paths: &[PathBuf]) -> Result<(), IndexError> {
        let _loading = self.loading.lock().await;
        let fresh = index::load_indexes(paths).await?;
        let mut next = Catalog::clone(&*self.snapshot().await);
        next.replace_index_entries(fresh);
        *self.catalog.write().await = Arc::new(next);
        log::info!("Loaded {} package index(es)", paths.len());
        Ok(())
    }

    /// Download an index document into the data folder and return its path.
    pub async fn fetch_package_index(&self, url: &str) -> Result<PathBuf, IndexError> {
        index::fetch_index(&self.client, url, &self.config.data_dir, self.config.retries).await
    }

    /// Merge platforms found under `paths` into the catalog.
    pub async fn load_hardware_directories(&self, paths: &[PathBuf]) -> Result<(), ScanError> {
        let managed = self.config.hardware_dir();
        let paths = paths.to_vec();
        self.scan(move |catalog| {
            HardwareScanner::new(catalog, Some(&managed)).scan_hardware_dirs(&paths)
        })
        .await
    }

    /// Merge tools found under `<path>/<packager>/<tool>/<version>` into the catalog.
    pub async fn load_tools_directories(&self, paths: &[PathBuf]) -> Result<(), ScanError> {
        let managed = self.config.hardware_dir();
        let paths = paths.to_vec();
        self.scan(move |catalog| {
            HardwareScanner::new(catalog, Some(&managed)).scan_tools_dirs(&paths)
        })
        .await
    }

    /// Walk a copy of the current catalog on the blocking pool, then swap it in.
    async fn scan<F>(&self, walk: F) -> Result<(), ScanError>
    where
        F: FnOnce(&mut Catalog) -> Result<(), ScanError> + Send + 'static,
    {
        let _loading = self.loading.lock().await;
        let current = Catalog::clone(&*self.snapshot().await);
        let next = scan_blocking(current, walk).await?;
        *self.catalog.write().await = Arc::new(next);
        Ok(())
    }

    /// Merge whatever is installed in the managed folders and the extra
    /// hardware roots into the current catalog.
    pub async fn rescan_installed(&self) -> Result<(), ScanError> {
        let managed = self.config.hardware_dir();
        let (hardware_roots, tools_roots) = self.installed_roots();
        self.scan(move |catalog| scan_installed(catalog, &managed, &hardware_roots, &tools_roots))
            .await
    }

    /// Rebuild the catalog from scratch: configured index files, the managed
    /// hardware and tools folders, then the extra hardware roots.
    pub async fn reload(&self) -> Result<()> {
        let _loading = self.loading.lock().await;
        let fresh = index::load_indexes(&self.config.index_files).await?;
        let managed = self.config.hardware_dir();
        let (hardware_roots, tools_roots) = self.installed_roots();
        let next = scan_blocking(fresh, move |catalog| {
            scan_installed(catalog, &managed, &hardware_roots, &tools_roots)
        })
        .await?;

        *self.catalog.write().await = Arc::new(next);
        log::info!("Catalog reloaded");
        Ok(())
    }

    /// Managed folders are skipped until something has been installed there.
    fn installed_roots(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut hardware_roots = Vec::new();
        let managed_hw = self.config.hardware_dir();
        if managed_hw.is_dir() {
            hardware_roots.push(managed_hw);
        }
        hardware_roots.extend(self.config.extra_hardware_dirs.iter().cloned());

        let tools_dir = self.config.tools_dir();
        let tools_roots = if tools_dir.is_dir() { vec![tools_dir] } else { Vec::new() };
        (hardware_roots, tools_roots)
    }

    pub async fn resolve(&self, requests: &[PlatformReference]) -> Resolution {
        let catalog = self.snapshot().await;
        resolver::resolve(&catalog, requests)
    }

    /// Fetch a batch of archives keyed by item code; `None` means no archive
    /// exists for this host.
    pub async fn download(&self, resources: BTreeMap<String, Option<Resource>>) -> ProcessResults {
        self.download_with(resources, &CancelToken::never(), None).await
    }

    pub async fn download_with(
        &self,
        resources: BTreeMap<String, Option<Resource>>,
        cancel: &CancelToken,
        deadline: Option<tokio::time::Instant>,
    ) -> ProcessResults {
        self.downloader
            .download_all(resources, self.reporter.clone(), cancel, deadline)
            .await
    }

    /// Platforms known only from disk carry no archive and fail without a fetch.
    pub async fn download_platforms(&self, platforms: &[Arc<PlatformRelease>]) -> ProcessResults {
        let mut unpublished = ProcessResults::new();
        let mut batch = BTreeMap::new();
        for platform in platforms {
            let code = platform.code();
            match &platform.resource {
                Some(resource) => {
                    batch.insert(code, Some(resource.clone()));
                }
                None => {
                    log::warn!("{}: {}", code, NO_ARCHIVE_FOR_RELEASE);
                    let result = ProcessResult::failure(&code, NO_ARCHIVE_FOR_RELEASE);
                    self.reporter.item_done(&code, &result);
                    unpublished.insert(code, result);
                }
            }
        }
        let mut results = self.download(batch).await;
        results.extend(unpublished);
        results
    }

    pub async fn download_tools(&self, tools: &[Arc<ToolRelease>]) -> ProcessResults {
        let batch = tools
            .iter()
            .map(|t| (t.code(), t.compatible_flavour().cloned()))
            .collect();
        self.download(batch).await
    }

    /// Install into `<hardware_dir>/<packager>/<architecture>/<version>`.
    pub async fn install_platforms(&self, platforms: &[Arc<PlatformRelease>]) -> ProcessResults {
        let hardware_dir = self.config.hardware_dir();
        let items = platforms
            .iter()
            .map(|p| InstallItem {
                code: p.code(),
                kind: ItemKind::Platform,
                name: p.architecture.clone(),
                version: p.version.clone(),
                resource: p.resource.clone(),
                target_root: hardware_dir.join(&p.package),
            })
            .collect();
        self.install_items(items).await
    }

    /// Install into `<tools_dir>/<packager>/<tool>/<version>`.
    pub async fn install_tools(&self, tools: &[Arc<ToolRelease>]) -> ProcessResults {
        let tools_dir = self.config.tools_dir();
        let items = tools
            .iter()
            .map(|t| InstallItem {
                code: t.code(),
                kind: ItemKind::Tool,
                name: t.tool.clone(),
                version: t.version.clone(),
                resource: t.compatible_flavour().cloned(),
                target_root: tools_dir.join(&t.package),
            })
            .collect();
        self.install_items(items).await
    }

    async fn install_items(&self, items: Vec<InstallItem>) -> ProcessResults {
        let downloads_dir = self.downloader.downloads_dir().to_path_buf();
        let reporter = self.reporter.clone();
        let codes: Vec<String> = items.iter().map(|i| i.code.clone()).collect();
        let task = tokio::task::spawn_blocking(move || {
            installer::install_all(&items, &downloads_dir, &*reporter)
        });
        match task.await {
            Ok(results) => results,
            Err(e) => {
                log::error!("Install task failed: {}", e);
                codes
                    .into_iter()
                    .map(|code| {
                        let result = ProcessResult::failure(&code, format!("install task failed: {}", e));
                        (code, result)
                    })
                    .collect()
            }
        }
    }

    pub async fn installed_platforms(&self) -> Vec<Arc<PlatformRelease>> {
        self.snapshot().await.installed_platforms()
    }

    pub async fn installed_tools(&self) -> Vec<Arc<ToolRelease>> {
        self.snapshot().await.installed_tools()
    }

    pub fn downloads_dir(&self) -> &Path {
        self.downloader.downloads_dir()
    }
}

async fn scan_blocking<F>(mut catalog: Catalog, walk: F) -> Result<Catalog, ScanError>
where
    F: FnOnce(&mut Catalog) -> Result<(), ScanError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || walk(&mut catalog).map(|()| catalog))
        .await
        .map_err(|e| ScanError::Interrupted(e.to_string()))?
}

fn scan_installed(
    catalog: &mut Catalog,
    managed: &Path,
    hardware_roots: &[PathBuf],
    tools_roots: &[PathBuf],
) -> Result<(), ScanError> {
    let mut scanner = HardwareScanner::new(catalog, Some(managed));
    scanner.scan_hardware_dirs(hardware_roots)?;
    scanner.scan_tools_dirs(tools_roots)
}
