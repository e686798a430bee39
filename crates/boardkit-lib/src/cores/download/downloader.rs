use super::checksum::Checksum;
use crate::cores::catalog::Resource;
use crate::cores::types::ProgressReporter;
use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;

// NOTE: Retry delay is a base value; we apply a simple linear backoff (delay * attempt).
const RETRY_DELAY_MS: u64 = 1000;

/// Where an in-flight download of `path` is written before the final rename.
pub fn part_path(path: &Path) -> PathBuf {
    let tmp_name = format!(
        "{}.part",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download")
    );
    path.with_file_name(tmp_name)
}

/// Download `resource` to `path`, verifying its declared size and checksum.
///
/// `retries` extra attempts are made on failure. Nothing is left at `path`
/// unless the archive validated.
pub async fn download_resource(
    client: &Client,
    resource: &Resource,
    path: &Path,
    retries: u32,
    item: &str,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let checksum = Checksum::parse(&resource.checksum)
        .with_context(|| format!("Invalid checksum for {}", resource.archive_file_name))?;
    with_retries(&resource.url, retries, || {
        download_with_validation(
            client,
            &resource.url,
            path,
            checksum.as_ref(),
            resource.size,
            item,
            reporter,
        )
    })
    .await
}

/// Download an unverified document (e.g. a package index) to `path`.
pub async fn fetch_to_path(client: &Client, url: &str, path: &Path, retries: u32) -> Result<()> {
    let reporter = crate::cores::types::SilentProgressReporter;
    with_retries(url, retries, || {
        download_with_validation(client, url, path, None, 0, url, &reporter)
    })
    .await
}

async fn with_retries<F, Fut>(url: &str, retries: u32, mut attempt: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut failures = 0;
    loop {
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if failures >= retries {
                    if retries > 0 {
                        return Err(e).context(format!(
                            "Failed to download {} after {} retries",
                            url, retries
                        ));
                    }
                    return Err(e);
                }
                failures += 1;
                log::warn!(
                    "Download failed (attempt {}/{}) : {:#}. Retrying...",
                    failures,
                    retries + 1,
                    e
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(
                    RETRY_DELAY_MS * failures as u64,
                ))
                .await;
            }
        }
    }
}

async fn download_with_validation(
    client: &Client,
    url: &str,
    path: &Path,
    checksum: Option<&Checksum>,
    expected_size: u64,
    item: &str,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let start = Instant::now();
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create download folder {:?}", parent))?;
    }

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to request {}", url))?;
    if !response.status().is_success() {
        anyhow::bail!("HTTP error {}: {}", response.status(), url);
    }

    let total_size = response
        .content_length()
        .or((expected_size > 0).then_some(expected_size));
    log::debug!("Download size: {:?} bytes", total_size);

    // Write to a temporary file first, then atomically rename to the final path.
    let tmp_path = part_path(path);
    let result = stream_body(response, &tmp_path, checksum, item, total_size, reporter).await;
    let (downloaded, chunk_count, digest) = match result {
        Ok(done) => done,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
    };

    if expected_size > 0 && downloaded != expected_size {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        anyhow::bail!(
            "fetched archive size differs from size specified in index: expected {}, got {}",
            expected_size,
            downloaded
        );
    }
    if let (Some(checksum), Some(computed)) = (checksum, digest) {
        if let Err(e) = checksum.verify(&computed, url) {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
        log::debug!("Checksum validated: {}", computed);
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move {:?} into place", tmp_path))?;

    let secs = start.elapsed().as_secs_f64();
    let throughput = (downloaded as f64 / 1024.0 / 1024.0) / secs.max(0.001); // MB/s
    log::info!(
        "Download stats: url={}, size={} bytes, chunks={}, time={:.2}s, throughput={:.2} MB/s",
        url,
        downloaded,
        chunk_count,
        secs,
        throughput
    );
    Ok(())
}

async fn stream_body(
    response: reqwest::Response,
    tmp_path: &Path,
    checksum: Option<&Checksum>,
    item: &str,
    total_size: Option<u64>,
    reporter: &dyn ProgressReporter,
) -> Result<(u64, u64, Option<String>)> {
    let mut file = File::create(tmp_path)
        .await
        .with_context(|| format!("Failed to create {:?}", tmp_path))?;
    let mut hasher = checksum.map(Checksum::hasher);
    let mut downloaded: u64 = 0;
    let mut chunk_count: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.context("Connection interrupted")?;
        file.write_all(&chunk).await?;
        if let Some(h) = hasher.as_mut() {
            h.update(&chunk);
        }
        downloaded += chunk.len() as u64;
        chunk_count += 1;
        reporter.update_bytes(item, downloaded, total_size);
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok((downloaded, chunk_count, hasher.map(|h| h.finalize_hex())))
}
