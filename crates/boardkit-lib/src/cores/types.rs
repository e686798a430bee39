use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

pub const STATUS_DOWNLOADED: &str = "Downloaded";
pub const STATUS_ALREADY_DOWNLOADED: &str = "Already Downloaded";
pub const STATUS_INSTALLED: &str = "Installed";
pub const STATUS_ALREADY_INSTALLED: &str = "Already Installed";

/// Outcome of a single download or install, keyed by item code in batch results.
///
/// An empty `error` means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub item_name: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: String,
}

impl ProcessResult {
    pub fn success(item_name: impl Into<String>, status: &str, path: PathBuf) -> Self {
        Self {
            item_name: item_name.into(),
            path: Some(path),
            status: status.to_string(),
            error: String::new(),
        }
    }

    pub fn failure(item_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            path: None,
            status: String::new(),
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

/// Per-item results of a batch operation.
pub type ProcessResults = BTreeMap<String, ProcessResult>;

/// Progress reporter for download and install batches.
/// Implementations forward updates to whatever renders progress.
pub trait ProgressReporter: Send + Sync {
    /// Bytes transferred so far for one item
    fn update_bytes(&self, _item: &str, _transferred: u64, _total: Option<u64>) {}

    /// Terminal event for one item
    fn item_done(&self, _item: &str, _result: &ProcessResult) {}

    /// Short status message for the batch as a whole
    fn set_message(&self, _message: &str) {}
}

/// A progress reporter that does nothing (silent).
/// Used whenever the caller does not care about progress.
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {}

/// Cancellation token wrapper
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self {
            rx,
            _keepalive: None,
        }
    }

    /// A token paired with the sender that triggers it.
    pub fn pair() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::new(rx))
    }

    /// A token that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled; pends forever if the sender is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
