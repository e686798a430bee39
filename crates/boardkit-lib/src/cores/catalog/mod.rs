pub mod flavour;
pub mod types;

pub use flavour::{select_flavour, Flavour, Host, HostMatch};
pub use types::{Board, PlatformReference, Resource, ToolDependency};

use crate::cores::error::ResolveError;
use crate::utils::version::VersionRequest;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// One installable version of a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRelease {
    pub package: String,
    pub architecture: String,
    pub version: String,
    /// Archive to download; `None` for releases only known from disk.
    pub resource: Option<Resource>,
    pub boards: Vec<Board>,
    pub tool_dependencies: Vec<ToolDependency>,
    /// Where the release lives on disk, when installed.
    pub install_dir: Option<PathBuf>,
    /// Installed outside the managed hardware folder (sketchbook, symlinked clone).
    pub manually_installed: bool,
}

impl PlatformRelease {
    pub fn new(
        package: impl Into<String>,
        architecture: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            architecture: architecture.into(),
            version: version.into(),
            resource: None,
            boards: Vec::new(),
            tool_dependencies: Vec::new(),
            install_dir: None,
            manually_installed: false,
        }
    }

    /// `package:architecture@version`
    pub fn code(&self) -> String {
        format!("{}:{}@{}", self.package, self.architecture, self.version)
    }

    pub fn is_installed(&self) -> bool {
        self.install_dir.is_some()
    }
}

/// One installable version of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRelease {
    pub package: String,
    pub tool: String,
    pub version: String,
    pub flavours: Vec<Flavour>,
    pub install_dir: Option<PathBuf>,
}

impl ToolRelease {
    pub fn new(
        package: impl Into<String>,
        tool: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            tool: tool.into(),
            version: version.into(),
            flavours: Vec::new(),
            install_dir: None,
        }
    }

    /// `package:tool@version`
    pub fn code(&self) -> String {
        format!("{}:{}@{}", self.package, self.tool, self.version)
    }

    pub fn is_installed(&self) -> bool {
        self.install_dir.is_some()
    }

    /// The archive to use on the running machine, if this release ships one.
    pub fn compatible_flavour(&self) -> Option<&Resource> {
        self.flavour_for(&Host::current())
    }

    pub fn flavour_for(&self, host: &Host) -> Option<&Resource> {
        select_flavour(&self.flavours, host).map(|f| &f.resource)
    }
}

/// A board-support architecture inside a package (e.g. "avr").
#[derive(Debug, Clone, Default)]
pub struct Platform {
    pub architecture: String,
    pub name: String,
    pub category: String,
    pub package: String,
    pub releases: BTreeMap<String, Arc<PlatformRelease>>,
}

impl Platform {
    /// Look up a release; `Latest` picks the highest version present.
    pub fn release(&self, version: &VersionRequest) -> Option<&Arc<PlatformRelease>> {
        let key = version.select(self.releases.keys().map(String::as_str))?;
        self.releases.get(key)
    }

    pub fn latest_release(&self) -> Option<&Arc<PlatformRelease>> {
        self.release(&VersionRequest::Latest)
    }

    pub fn installed_releases(&self) -> impl Iterator<Item = &Arc<PlatformRelease>> {
        self.releases.values().filter(|r| r.is_installed())
    }

    /// Record that `version` is present on disk at `dir`, keeping any index data.
    pub fn mark_installed(
        &mut self,
        version: &str,
        dir: PathBuf,
        manually_installed: bool,
    ) -> &mut PlatformRelease {
        let (package, architecture) = (&self.package, &self.architecture);
        let entry = self
            .releases
            .entry(version.to_string())
            .or_insert_with(|| Arc::new(PlatformRelease::new(package, architecture, version)));
        // Copy-on-write: snapshots handed out earlier keep their own release.
        let release = Arc::make_mut(entry);
        release.install_dir = Some(dir);
        release.manually_installed = manually_installed;
        release
    }
}

/// A toolchain or utility inside a package.
#[derive(Debug, Clone, Default)]
pub struct Tool {
    pub name: String,
    pub package: String,
    pub releases: BTreeMap<String, Arc<ToolRelease>>,
}

impl Tool {
    pub fn release(&self, version: &VersionRequest) -> Option<&Arc<ToolRelease>> {
        let key = version.select(self.releases.keys().map(String::as_str))?;
        self.releases.get(key)
    }

    pub fn latest_release(&self) -> Option<&Arc<ToolRelease>> {
        self.release(&VersionRequest::Latest)
    }

    pub fn mark_installed(&mut self, version: &str, dir: PathBuf) -> &mut ToolRelease {
        let (package, name) = (&self.package, &self.name);
        let entry = self
            .releases
            .entry(version.to_string())
            .or_insert_with(|| Arc::new(ToolRelease::new(package, name, version)));
        let release = Arc::make_mut(entry);
        release.install_dir = Some(dir);
        release
    }
}

/// A vendor namespace grouping platforms and tools.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub name: String,
    pub maintainer: String,
    pub website_url: String,
    pub email: String,
    pub platforms: BTreeMap<String, Platform>,
    pub tools: BTreeMap<String, Tool>,
    /// Merged `platform.txt` properties found while scanning; last merge wins.
    pub properties: BTreeMap<String, String>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn get_or_create_platform(&mut self, architecture: &str) -> &mut Platform {
        let package = self.name.clone();
        self.platforms
            .entry(architecture.to_string())
            .or_insert_with(|| Platform {
                architecture: architecture.to_string(),
                name: architecture.to_string(),
                package,
                ..Default::default()
            })
    }

    pub fn get_or_create_tool(&mut self, name: &str) -> &mut Tool {
        let package = self.name.clone();
        self.tools.entry(name.to_string()).or_insert_with(|| Tool {
            name: name.to_string(),
            package,
            ..Default::default()
        })
    }

    fn is_empty(&self) -> bool {
        self.platforms.is_empty() && self.tools.is_empty() && self.properties.is_empty()
    }
}

/// The whole package/platform/tool tree.
///
/// Releases are shared behind `Arc` so every lookup of the same release hands
/// out the same allocation.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    packages: BTreeMap<String, Package>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn get_or_create_package(&mut self, name: &str) -> &mut Package {
        self.packages
            .entry(name.to_string())
            .or_insert_with(|| Package::new(name))
    }

    pub fn platform_release(
        &self,
        package: &str,
        architecture: &str,
        version: &VersionRequest,
    ) -> Result<&Arc<PlatformRelease>, ResolveError> {
        let package = self
            .packages
            .get(package)
            .ok_or(ResolveError::PackageNotFound)?;
        let platform = package
            .platforms
            .get(architecture)
            .ok_or(ResolveError::PlatformNotFound)?;
        platform.release(version).ok_or(ResolveError::VersionNotFound)
    }

    pub fn tool_release(
        &self,
        dependency: &ToolDependency,
    ) -> Result<&Arc<ToolRelease>, ResolveError> {
        let not_found = || ResolveError::ToolNotFound {
            packager: dependency.packager.clone(),
            tool: dependency.name.clone(),
        };
        let tool = self
            .packages
            .get(&dependency.packager)
            .and_then(|p| p.tools.get(&dependency.name))
            .ok_or_else(not_found)?;
        tool.release(&dependency.version)
            .ok_or_else(|| ResolveError::ToolVersionNotFound {
                packager: dependency.packager.clone(),
                tool: dependency.name.clone(),
                version: dependency.version.to_string(),
            })
    }

    /// Tool releases required by `release`, with every `latest` resolved.
    ///
    /// A dependency without a packager belongs to the platform's own package.
    pub fn tool_dependencies(
        &self,
        release: &PlatformRelease,
    ) -> Result<Vec<Arc<ToolRelease>>, ResolveError> {
        release
            .tool_dependencies
            .iter()
            .map(|dep| {
                if dep.packager.is_empty() {
                    let owned = ToolDependency {
                        packager: release.package.clone(),
                        ..dep.clone()
                    };
                    self.tool_release(&owned).cloned()
                } else {
                    self.tool_release(dep).cloned()
                }
            })
            .collect()
    }

    pub fn installed_platforms(&self) -> Vec<Arc<PlatformRelease>> {
        self.packages
            .values()
            .flat_map(|p| p.platforms.values())
            .flat_map(|p| p.installed_releases())
            .cloned()
            .collect()
    }

    pub fn installed_tools(&self) -> Vec<Arc<ToolRelease>> {
        self.packages
            .values()
            .flat_map(|p| p.tools.values())
            .flat_map(|t| t.releases.values())
            .filter(|r| r.is_installed())
            .cloned()
            .collect()
    }

    /// Replace everything earlier index loads contributed with `fresh`.
    ///
    /// Releases found on disk survive; when `fresh` describes one of them the
    /// index data is taken from `fresh` and the install location is kept.
    pub fn replace_index_entries(&mut self, fresh: Catalog) {
        for package in self.packages.values_mut() {
            for platform in package.platforms.values_mut() {
                platform.releases.retain(|_, r| r.is_installed());
            }
            package.platforms.retain(|_, p| !p.releases.is_empty());
            for tool in package.tools.values_mut() {
                tool.releases.retain(|_, r| r.is_installed());
            }
            package.tools.retain(|_, t| !t.releases.is_empty());
        }
        self.packages.retain(|_, p| !p.is_empty());

        for (name, incoming) in fresh.packages {
            let target = self.get_or_create_package(&name);
            target.maintainer = incoming.maintainer;
            target.website_url = incoming.website_url;
            target.email = incoming.email;

            for (arch, platform) in incoming.platforms {
                let existing = target.get_or_create_platform(&arch);
                existing.name = platform.name;
                existing.category = platform.category;
                for (version, release) in platform.releases {
                    let merged = match existing.releases.get(&version) {
                        Some(installed) => Arc::new(PlatformRelease {
                            install_dir: installed.install_dir.clone(),
                            manually_installed: installed.manually_installed,
                            ..PlatformRelease::clone(&release)
                        }),
                        None => release,
                    };
                    existing.releases.insert(version, merged);
                }
            }

            for (tool_name, tool) in incoming.tools {
                let existing = target.get_or_create_tool(&tool_name);
                for (version, release) in tool.releases {
                    let merged = match existing.releases.get(&version) {
                        Some(installed) => Arc::new(ToolRelease {
                            install_dir: installed.install_dir.clone(),
                            ..ToolRelease::clone(&release)
                        }),
                        None => release,
                    };
                    existing.releases.insert(version, merged);
                }
            }
        }
    }
}
