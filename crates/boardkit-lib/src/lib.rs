//! Board platform and toolchain manager.
//!
//! Resolves platform requests against package indexes, downloads the
//! required archives and installs them into a versioned directory tree.

pub mod cores;
pub mod utils;

pub use cores::{ManagerConfig, PackageManager, PlatformReference, ProcessResult};
pub use utils::version::VersionRequest;
