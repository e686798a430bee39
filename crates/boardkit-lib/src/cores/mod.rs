pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod index;
pub mod installer;
pub mod manager;
pub mod resolver;
pub mod scanner;
pub mod types;

pub use catalog::{
    Board, Catalog, Flavour, Host, Package, Platform, PlatformReference, PlatformRelease, Resource,
    Tool, ToolDependency, ToolRelease,
};
pub use config::ManagerConfig;
pub use error::{IndexError, ResolveError, ScanError};
pub use manager::PackageManager;
pub use resolver::Resolution;
pub use types::{
    CancelToken, ProcessResult, ProcessResults, ProgressReporter, SilentProgressReporter,
    STATUS_ALREADY_DOWNLOADED, STATUS_ALREADY_INSTALLED, STATUS_DOWNLOADED, STATUS_INSTALLED,
};
