//! Install a platform and its tools from a package index.
//!
//! cargo run -p boardkit-lib --example install_platform -- \
//!     https://downloads.arduino.cc/packages/package_index.json arduino:avr@1.8.6 [data-dir]

use std::sync::Arc;

use anyhow::{Context, Result};

use boardkit_lib::cores::{ProcessResult, ProcessResults, ProgressReporter};
use boardkit_lib::{ManagerConfig, PackageManager, PlatformReference};

struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn update_bytes(&self, item: &str, transferred: u64, total: Option<u64>) {
        if let Some(t) = total {
            println!("[BYTES] {} {}/{}", item, transferred, t);
        } else {
            println!("[BYTES] {} {}", item, transferred);
        }
    }

    fn item_done(&self, item: &str, result: &ProcessResult) {
        if result.is_success() {
            println!("[DONE] {} {}", item, result.status);
        } else {
            println!("[FAIL] {} {}", item, result.error);
        }
    }

    fn set_message(&self, message: &str) {
        println!("[MSG] {}", message);
    }
}

fn print_table(title: &str, results: &ProcessResults) {
    println!("{}:", title);
    for (code, result) in results {
        let outcome = if result.is_success() {
            &result.status
        } else {
            &result.error
        };
        println!("  {:<40} {}", code, outcome);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let index_url = args.next().context("missing index URL")?;
    let reference: PlatformReference = args.next().context("missing PACKAGER:ARCH[@VERSION]")?.parse()?;
    let data_dir: std::path::PathBuf = match args.next() {
        Some(dir) => dir.into(),
        None => std::env::temp_dir().join("boardkit-demo"),
    };

    let manager = PackageManager::new(ManagerConfig::new(&data_dir))?
        .with_reporter(Arc::new(ConsoleReporter));

    let index = manager.fetch_package_index(&index_url).await?;
    manager.load_package_indexes(&[index]).await?;
    manager.rescan_installed().await?;

    let resolution = manager.resolve(&[reference]).await;
    if !resolution.failures.is_empty() {
        print_table("Resolution failures", &resolution.failures);
    }

    print_table("Tool downloads", &manager.download_tools(&resolution.tools).await);
    print_table("Platform downloads", &manager.download_platforms(&resolution.platforms).await);
    print_table("Tool installs", &manager.install_tools(&resolution.tools).await);
    print_table("Platform installs", &manager.install_platforms(&resolution.platforms).await);

    println!("Data folder: {}", data_dir.display());
    Ok(())
}
