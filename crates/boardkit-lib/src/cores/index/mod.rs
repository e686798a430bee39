//! Package index documents: parsing, merging into a catalog and fetching.

pub mod types;

use crate::cores::catalog::{
    Board, Catalog, Flavour, PlatformRelease, Resource, ToolDependency, ToolRelease,
};
use crate::cores::download::downloader::fetch_to_path;
use crate::cores::error::IndexError;
use crate::utils::version::{VersionRequest, LATEST};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use types::{IndexDocument, IndexPackage};

/// Parse one index document into a fresh catalog.
///
/// The document is validated as a whole first, so a bad entry anywhere means
/// nothing from it is returned.
pub fn parse_index(bytes: &[u8], source: &str) -> Result<Catalog, IndexError> {
    let corrupted = |reason: String| IndexError::Corrupted {
        source_path: source.to_string(),
        reason,
    };
    let document: IndexDocument =
        serde_json::from_slice(bytes).map_err(|e| corrupted(e.to_string()))?;
    validate(&document).map_err(corrupted)?;

    let mut catalog = Catalog::new();
    merge_document(&mut catalog, document);
    Ok(catalog)
}

/// Load and merge several local index files.
///
/// All-or-nothing across the whole call: the first corrupted document aborts
/// and nothing is returned.
pub async fn load_indexes(paths: &[PathBuf]) -> Result<Catalog, IndexError> {
    let mut catalog = Catalog::new();
    for path in paths {
        log::info!("Loading package index: {:?}", path);
        let source = path.display().to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IndexError::Corrupted {
                source_path: source.clone(),
                reason: format!("unreadable: {}", e),
            })?;
        let parsed = parse_index(&bytes, &source)?;
        merge_catalog(&mut catalog, parsed);
    }
    Ok(catalog)
}

/// Download an index document into `dest_dir`, named after the last URL segment.
///
/// The fetched document is parsed before returning; a corrupted download is
/// deleted so it is never picked up by a later `load_indexes`.
pub async fn fetch_index(
    client: &reqwest::Client,
    url: &str,
    dest_dir: &Path,
    retries: u32,
) -> Result<PathBuf, IndexError> {
    let fetch_error = |reason: String| IndexError::Fetch {
        url: url.to_string(),
        reason,
    };
    let parsed = url::Url::parse(url).map_err(|e| fetch_error(e.to_string()))?;
    let file_name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| fetch_error("URL has no file name".to_string()))?
        .to_string();
    let dest = dest_dir.join(&file_name);

    log::info!("Fetching package index {} -> {:?}", url, dest);
    fetch_to_path(client, url, &dest, retries)
        .await
        .map_err(|e| fetch_error(format!("{:#}", e)))?;

    let bytes = tokio::fs::read(&dest)
        .await
        .map_err(|e| fetch_error(e.to_string()))?;
    if let Err(e) = parse_index(&bytes, url) {
        log::warn!("Removing corrupted index {:?}: {}", dest, e);
        let _ = tokio::fs::remove_file(&dest).await;
        return Err(e);
    }
    Ok(dest)
}

fn validate(document: &IndexDocument) -> Result<(), String> {
    for package in &document.packages {
        if package.name.trim().is_empty() {
            return Err("package with empty name".to_string());
        }
        for platform in &package.platforms {
            let what = format!("platform {}:{}", package.name, platform.architecture);
            if platform.architecture.trim().is_empty() {
                return Err(format!("{} has no architecture", what));
            }
            check_version(&platform.version, &what)?;
        }
        for tool in &package.tools {
            let what = format!("tool {}:{}", package.name, tool.name);
            if tool.name.trim().is_empty() {
                return Err(format!("package {} has a tool without a name", package.name));
            }
            check_version(&tool.version, &what)?;
        }
    }
    Ok(())
}

fn check_version(version: &str, what: &str) -> Result<(), String> {
    if version.trim().is_empty() {
        return Err(format!("{} has no version", what));
    }
    if version.trim().eq_ignore_ascii_case(LATEST) {
        return Err(format!("{} uses reserved version '{}'", what, LATEST));
    }
    Ok(())
}

fn merge_document(catalog: &mut Catalog, document: IndexDocument) {
    for indexed in document.packages {
        merge_package(catalog, indexed);
    }
}

fn merge_package(catalog: &mut Catalog, indexed: IndexPackage) {
    let package = catalog.get_or_create_package(&indexed.name);
    package.maintainer = indexed.maintainer;
    package.website_url = indexed.website_url;
    package.email = indexed.email;

    for p in indexed.platforms {
        let mut release = PlatformRelease::new(&package.name, &p.architecture, &p.version);
        release.resource = Some(Resource {
            url: p.url,
            checksum: p.checksum,
            archive_file_name: p.archive_file_name,
            size: p.size,
        });
        release.boards = p
            .boards
            .into_iter()
            .map(|b| Board { name: b.name, id: None })
            .collect();
        release.tool_dependencies = p
            .tools_dependencies
            .into_iter()
            .map(|d| ToolDependency {
                packager: d.packager,
                name: d.name,
                version: VersionRequest::parse(&d.version),
            })
            .collect();

        let platform = package.get_or_create_platform(&p.architecture);
        if !p.name.is_empty() {
            platform.name = p.name;
        }
        if !p.category.is_empty() {
            platform.category = p.category;
        }
        platform.releases.insert(p.version, Arc::new(release));
    }

    for t in indexed.tools {
        let mut release = ToolRelease::new(&package.name, &t.name, &t.version);
        release.flavours = t
            .systems
            .into_iter()
            .map(|s| Flavour {
                host: s.host,
                resource: Resource {
                    url: s.url,
                    checksum: s.checksum,
                    archive_file_name: s.archive_file_name,
                    size: s.size,
                },
            })
            .collect();
        package
            .get_or_create_tool(&t.name)
            .releases
            .insert(t.version, Arc::new(release));
    }
}

/// Fold one parsed document into another; later documents win on conflicts.
fn merge_catalog(into: &mut Catalog, from: Catalog) {
    for incoming in from.packages() {
        let package = into.get_or_create_package(&incoming.name);
        package.maintainer = incoming.maintainer.clone();
        package.website_url = incoming.website_url.clone();
        package.email = incoming.email.clone();
        for (arch, platform) in &incoming.platforms {
            let target = package.get_or_create_platform(arch);
            target.name = platform.name.clone();
            target.category = platform.category.clone();
            target
                .releases
                .extend(platform.releases.iter().map(|(v, r)| (v.clone(), r.clone())));
        }
        for (name, tool) in &incoming.tools {
            package
                .get_or_create_tool(name)
                .releases
                .extend(tool.releases.iter().map(|(v, r)| (v.clone(), r.clone())));
        }
    }
}
