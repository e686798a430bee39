pub mod checksum;
pub mod downloader;

use crate::cores::catalog::Resource;
use crate::cores::types::{
    CancelToken, ProcessResult, ProcessResults, ProgressReporter, STATUS_ALREADY_DOWNLOADED,
    STATUS_DOWNLOADED,
};
use checksum::{verify_file, Checksum};
use downloader::{download_resource, part_path};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const NOT_AVAILABLE_FOR_HOST: &str = "A release of this tool is not available for your OS";
/// A platform known only from disk has no archive to fetch or unpack.
pub const NO_ARCHIVE_FOR_RELEASE: &str = "No archive is published for this release";
pub const CANCELLED: &str = "cancelled";
pub const TIMED_OUT: &str = "timed out";

/// Items that share one archive file: fetched once, reported under every key.
struct ArchiveGroup {
    path: PathBuf,
    resource: Resource,
    items: Vec<String>,
}

/// Concurrent archive fetcher writing into the download cache.
pub struct Downloader {
    client: Client,
    downloads_dir: PathBuf,
    concurrency: Option<usize>,
    retries: u32,
}

impl Downloader {
    pub fn new(
        client: Client,
        downloads_dir: PathBuf,
        concurrency: Option<usize>,
        retries: u32,
    ) -> Self {
        Self {
            client,
            downloads_dir,
            concurrency,
            retries,
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Fetch every resource in `batch` and report one result per key.
    ///
    /// A `None` resource means no flavour fits this host; it fails without a
    /// fetch. When `cancel` fires or `deadline` passes, fetches still in flight
    /// are dropped, their `.part` files removed and their items reported as
    /// cancelled or timed out.
    pub async fn download_all(
        &self,
        batch: BTreeMap<String, Option<Resource>>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: &CancelToken,
        deadline: Option<tokio::time::Instant>,
    ) -> ProcessResults {
        let mut results = ProcessResults::new();

        // Deduplicate by archive path to avoid concurrent writes to the same file
        let mut groups: BTreeMap<PathBuf, ArchiveGroup> = BTreeMap::new();
        for (item, resource) in batch {
            let Some(resource) = resource else {
                log::warn!("{}: {}", item, NOT_AVAILABLE_FOR_HOST);
                finish(&mut results, &*reporter, &item, ProcessResult::failure(&item, NOT_AVAILABLE_FOR_HOST));
                continue;
            };
            match resource.archive_path(&self.downloads_dir) {
                Ok(path) => groups
                    .entry(path.clone())
                    .or_insert_with(|| ArchiveGroup {
                        path,
                        resource,
                        items: Vec::new(),
                    })
                    .items
                    .push(item),
                Err(e) => {
                    let result = ProcessResult::failure(&item, format!("{:#}", e));
                    finish(&mut results, &*reporter, &item, result);
                }
            }
        }

        let total = groups.len();
        if total == 0 {
            return results;
        }
        log::info!("Downloading {} archive(s) into {:?}", total, self.downloads_dir);
        reporter.set_message(&format!("Downloading {} archive(s)", total));

        let mut pending: BTreeMap<PathBuf, Vec<String>> = groups
            .values()
            .map(|g| (g.path.clone(), g.items.clone()))
            .collect();

        let width = self.concurrency.unwrap_or(total).max(1);
        let mut fetches = stream::iter(groups.into_values())
            .map(|group| {
                let client = self.client.clone();
                let reporter = reporter.clone();
                let retries = self.retries;
                async move {
                    let outcome = fetch_group(&client, &group, retries, &*reporter).await;
                    (group, outcome)
                }
            })
            .buffer_unordered(width);

        let cancelled = cancel.cancelled();
        tokio::pin!(cancelled);
        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        let interruption = loop {
            tokio::select! {
                next = fetches.next() => match next {
                    Some((group, outcome)) => {
                        pending.remove(&group.path);
                        for item in &group.items {
                            let result = match &outcome {
                                Ok(status) => ProcessResult::success(item, status, group.path.clone()),
                                Err(e) => {
                                    log::warn!("Failed to download {}: {}", item, e);
                                    ProcessResult::failure(item, e.clone())
                                }
                            };
                            finish(&mut results, &*reporter, item, result);
                        }
                    }
                    None => break None,
                },
                _ = &mut cancelled => break Some(CANCELLED),
                _ = &mut expired => break Some(TIMED_OUT),
            }
        };
        // Dropping the stream aborts every fetch still in flight.
        drop(fetches);

        if let Some(reason) = interruption {
            log::warn!("Download batch {}: {} archive(s) unfinished", reason, pending.len());
            for (path, items) in pending {
                let _ = std::fs::remove_file(part_path(&path));
                for item in items {
                    finish(&mut results, &*reporter, &item, ProcessResult::failure(&item, reason));
                }
            }
        }
        results
    }
}

fn finish(
    results: &mut ProcessResults,
    reporter: &dyn ProgressReporter,
    item: &str,
    result: ProcessResult,
) {
    reporter.item_done(item, &result);
    results.insert(item.to_string(), result);
}

/// Reuse a cached archive only when it verifies against a declared checksum.
async fn cached_archive_is_valid(path: &Path, resource: &Resource) -> bool {
    if !matches!(Checksum::parse(&resource.checksum), Ok(Some(_))) {
        return false;
    }
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return false;
    }
    let (path_owned, resource_owned) = (path.to_path_buf(), resource.clone());
    match tokio::task::spawn_blocking(move || verify_file(&path_owned, &resource_owned)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::info!("Cached archive {:?} is invalid ({:#}), re-downloading", path, e);
            false
        }
        Err(_) => false,
    }
}

async fn fetch_group(
    client: &Client,
    group: &ArchiveGroup,
    retries: u32,
    reporter: &dyn ProgressReporter,
) -> Result<&'static str, String> {
    if cached_archive_is_valid(&group.path, &group.resource).await {
        log::debug!("Archive already downloaded and verified: {:?}", group.path);
        return Ok(STATUS_ALREADY_DOWNLOADED);
    }
    let label = group.items.first().map(String::as_str).unwrap_or_default();
    log::info!("Downloading: {} from {}", label, group.resource.url);
    download_resource(client, &group.resource, &group.path, retries, label, reporter)
        .await
        .map(|()| STATUS_DOWNLOADED)
        .map_err(|e| format!("{:#}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cores::types::SilentProgressReporter;
    use sha2::{Digest, Sha256};
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resource(server: &MockServer, name: &str, body: &[u8]) -> Resource {
        Resource {
            url: format!("{}/{}", server.uri(), name),
            checksum: format!("SHA-256:{}", hex::encode(Sha256::digest(body))),
            archive_file_name: name.to_string(),
            size: body.len() as u64,
        }
    }

    async fn serve(server: &MockServer, name: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
    }

    fn downloader(dir: &Path) -> Downloader {
        Downloader::new(Client::new(), dir.to_path_buf(), None, 0)
    }

    #[derive(Default)]
    struct Recorder {
        done: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recorder {
        fn item_done(&self, item: &str, _result: &ProcessResult) {
            self.done.lock().unwrap().push(item.to_string());
        }
    }

    #[tokio::test]
    async fn partial_batch_reports_every_item() {
        let server = MockServer::start().await;
        serve(&server, "avrdude.tar.gz", b"avrdude archive").await;
        serve(&server, "avr-gcc.tar.gz", b"avr-gcc archive").await;

        let dir = tempfile::tempdir().unwrap();
        let mut batch = BTreeMap::new();
        batch.insert(
            "arduino:avrdude@6.3.0".to_string(),
            Some(resource(&server, "avrdude.tar.gz", b"avrdude archive")),
        );
        batch.insert(
            "arduino:avr-gcc@7.3.0".to_string(),
            Some(resource(&server, "avr-gcc.tar.gz", b"avr-gcc archive")),
        );
        batch.insert("arduino:bossac@1.9.1".to_string(), None);

        let recorder = Arc::new(Recorder::default());
        let results = downloader(dir.path())
            .download_all(batch, recorder.clone(), &CancelToken::never(), None)
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results["arduino:avrdude@6.3.0"].status, STATUS_DOWNLOADED);
        assert!(results["arduino:avr-gcc@7.3.0"].is_success());
        assert!(results["arduino:bossac@1.9.1"]
            .error
            .contains("not available for your OS"));
        assert!(dir.path().join("avrdude.tar.gz").exists());
        assert_eq!(recorder.done.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn concurrency_cap_still_reports_every_item() {
        let server = MockServer::start().await;
        let delay = Duration::from_millis(100);
        let names = ["avrdude.zip", "avr-gcc.zip", "bossac.zip", "openocd.zip"];
        let mut batch = BTreeMap::new();
        for name in names {
            Mock::given(method("GET"))
                .and(path(format!("/{}", name)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_bytes(name.as_bytes().to_vec())
                        .set_delay(delay),
                )
                .mount(&server)
                .await;
            batch.insert(
                format!("arduino:{}@1.0.0", name.trim_end_matches(".zip")),
                Some(resource(&server, name, name.as_bytes())),
            );
        }

        let dir = tempfile::tempdir().unwrap();
        let capped = Downloader::new(Client::new(), dir.path().to_path_buf(), Some(1), 0);
        let started = std::time::Instant::now();
        let results = capped
            .download_all(batch, Arc::new(SilentProgressReporter), &CancelToken::never(), None)
            .await;

        assert_eq!(results.len(), names.len());
        assert!(results.values().all(|r| r.status == STATUS_DOWNLOADED));
        // one fetch at a time: the delays add up
        assert!(started.elapsed() >= delay * names.len() as u32);
        assert_eq!(server.received_requests().await.unwrap().len(), names.len());
    }

    #[tokio::test]
    async fn checksum_mismatch_is_per_item() {
        let server = MockServer::start().await;
        serve(&server, "tampered.zip", b"tampered").await;

        let dir = tempfile::tempdir().unwrap();
        let mut bad = resource(&server, "tampered.zip", b"original");
        bad.size = 0;
        let mut batch = BTreeMap::new();
        batch.insert("acme:avr@1.0.0".to_string(), Some(bad));

        let results = downloader(dir.path())
            .download_all(batch, Arc::new(SilentProgressReporter), &CancelToken::never(), None)
            .await;
        let result = &results["acme:avr@1.0.0"];
        assert!(!result.is_success());
        assert!(result.error.contains("hash differs"), "{}", result.error);
        assert!(!dir.path().join("tampered.zip").exists());
        assert!(!dir.path().join("tampered.zip.part").exists());
    }

    #[tokio::test]
    async fn verified_cache_is_reused() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cached.zip"), b"cached").unwrap();

        let mut batch = BTreeMap::new();
        batch.insert(
            "acme:avr@1.0.0".to_string(),
            Some(resource(&server, "cached.zip", b"cached")),
        );
        let results = downloader(dir.path())
            .download_all(batch, Arc::new(SilentProgressReporter), &CancelToken::never(), None)
            .await;
        assert_eq!(results["acme:avr@1.0.0"].status, STATUS_ALREADY_DOWNLOADED);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn http_error_is_per_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut batch = BTreeMap::new();
        batch.insert(
            "acme:avr@1.0.0".to_string(),
            Some(resource(&server, "missing.zip", b"x")),
        );
        let results = downloader(dir.path())
            .download_all(batch, Arc::new(SilentProgressReporter), &CancelToken::never(), None)
            .await;
        assert!(results["acme:avr@1.0.0"].error.contains("404"));
    }

    #[tokio::test]
    async fn shared_archive_is_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shared.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"shared".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let shared = resource(&server, "shared.zip", b"shared");
        let mut batch = BTreeMap::new();
        batch.insert("acme:avr@1.0.0".to_string(), Some(shared.clone()));
        batch.insert("acme:megaavr@1.0.0".to_string(), Some(shared));
        let results = downloader(dir.path())
            .download_all(batch, Arc::new(SilentProgressReporter), &CancelToken::never(), None)
            .await;
        assert!(results.values().all(ProcessResult::is_success));
    }

    #[tokio::test]
    async fn deadline_marks_pending_items_timed_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut batch = BTreeMap::new();
        batch.insert(
            "acme:avr@1.0.0".to_string(),
            Some(resource(&server, "slow.zip", b"slow")),
        );
        let deadline = tokio::time::Instant::now() + Duration::from_millis(200);
        let results = downloader(dir.path())
            .download_all(batch, Arc::new(SilentProgressReporter), &CancelToken::never(), Some(deadline))
            .await;
        assert_eq!(results["acme:avr@1.0.0"].error, TIMED_OUT);
        assert!(!dir.path().join("slow.zip").exists());
        assert!(!dir.path().join("slow.zip.part").exists());
    }

    #[tokio::test]
    async fn cancel_marks_pending_items_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut batch = BTreeMap::new();
        batch.insert(
            "acme:avr@1.0.0".to_string(),
            Some(resource(&server, "slow.zip", b"slow")),
        );
        let (tx, token) = CancelToken::pair();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });
        let results = downloader(dir.path())
            .download_all(batch, Arc::new(SilentProgressReporter), &token, None)
            .await;
        assert_eq!(results["acme:avr@1.0.0"].error, CANCELLED);
    }
}
