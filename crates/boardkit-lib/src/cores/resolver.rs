use crate::cores::catalog::{Catalog, PlatformRelease, PlatformReference, ToolRelease};
use crate::cores::error::ResolveError;
use crate::cores::types::{ProcessResult, ProcessResults};
use std::collections::HashSet;
use std::sync::Arc;

/// What a batch of platform requests resolved to.
#[derive(Debug, Default, Clone)]
pub struct Resolution {
    pub platforms: Vec<Arc<PlatformRelease>>,
    /// Tools needed by `platforms`, each tool name at most once.
    pub tools: Vec<Arc<ToolRelease>>,
    /// Keyed by `package:architecture@version` of the failed request.
    pub failures: ProcessResults,
}

/// Resolve requests in order against `catalog`.
///
/// A bad request only lands in `failures`; the rest of the batch still
/// resolves. Platforms are deduplicated by architecture and tools by name,
/// first seen wins.
pub fn resolve(catalog: &Catalog, requests: &[PlatformReference]) -> Resolution {
    let mut resolution = Resolution::default();
    let mut seen_architectures: HashSet<&str> = HashSet::new();
    let mut seen_tools: HashSet<String> = HashSet::new();

    for request in requests {
        let fail = |resolution: &mut Resolution, err: ResolveError| {
            log::warn!("Cannot resolve {}: {}", request.code(), err);
            resolution.failures.insert(
                request.code(),
                ProcessResult::failure(&request.architecture, err.to_string()),
            );
        };

        let Some(package) = catalog.package(&request.package) else {
            fail(&mut resolution, ResolveError::PackageNotFound);
            continue;
        };
        let Some(platform) = package.platforms.get(&request.architecture) else {
            fail(&mut resolution, ResolveError::PlatformNotFound);
            continue;
        };
        if seen_architectures.contains(request.architecture.as_str()) {
            log::debug!("Skipping {}: architecture already resolved", request.code());
            continue;
        }
        let Some(release) = platform.release(&request.version) else {
            fail(&mut resolution, ResolveError::VersionNotFound);
            continue;
        };
        let tools = match catalog.tool_dependencies(release) {
            Ok(tools) => tools,
            Err(cause) => {
                let err = ResolveError::Dependencies {
                    platform: release.code(),
                    cause: Box::new(cause),
                };
                fail(&mut resolution, err);
                continue;
            }
        };

        log::debug!("Resolved {} -> {}", request.code(), release.code());
        seen_architectures.insert(request.architecture.as_str());
        resolution.platforms.push(release.clone());
        for tool in tools {
            if seen_tools.insert(tool.tool.clone()) {
                resolution.tools.push(tool);
            }
        }
    }
    resolution
}
