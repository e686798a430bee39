//! Discovery of platforms and tools already present on disk.
//!
//! Two packager layouts are accepted under a hardware root:
//! - `PACKAGER/ARCHITECTURE/VERSION/...`           (ex: acme/avr/2.0.0/...)
//! - `PACKAGER/hardware/ARCHITECTURE/VERSION/...`  (ex: arduino/hardware/avr/1.8.3/...)
//!
//! and `PACKAGER/tools/TOOL/VERSION/...` next to either of them. An
//! `ARCHITECTURE` folder holding `boards.txt` directly is an unversioned
//! platform whose version is read from its `platform.txt`.

pub mod properties;

use crate::cores::catalog::{Catalog, Package};
use crate::cores::error::ScanError;
use crate::utils::version::{is_semver, LATEST};
use properties::{boards_from_properties, load_optional, Properties};
use std::path::{Path, PathBuf};

const TOOLS_DIR: &str = "tools";
const HARDWARE_DIR: &str = "hardware";
const PLATFORM_TXT: &str = "platform.txt";
const BOARDS_TXT: &str = "boards.txt";

/// Walks hardware and tools roots, merging what it finds into a catalog.
///
/// Keeps the chain of canonical directories currently being descended so a
/// symlink pointing back up the tree is reported instead of followed forever.
pub struct HardwareScanner<'a> {
    catalog: &'a mut Catalog,
    managed_dir: Option<PathBuf>,
    ancestors: Vec<PathBuf>,
}

impl<'a> HardwareScanner<'a> {
    /// `managed_dir` is the folder this tool installs into; releases found
    /// anywhere else are flagged as manually installed.
    pub fn new(catalog: &'a mut Catalog, managed_dir: Option<&Path>) -> Self {
        Self {
            catalog,
            managed_dir: managed_dir.map(|d| dunce::canonicalize(d).unwrap_or_else(|_| d.to_path_buf())),
            ancestors: Vec::new(),
        }
    }

    pub fn scan_hardware_dirs(&mut self, roots: &[PathBuf]) -> Result<(), ScanError> {
        for root in roots {
            self.scan_hardware_dir(root)?;
        }
        Ok(())
    }

    pub fn scan_hardware_dir(&mut self, root: &Path) -> Result<(), ScanError> {
        log::info!("Loading hardware from: {:?}", root);
        let root = open_root(root)?;
        let manual = self
            .managed_dir
            .as_ref()
            .map_or(true, |managed| !root.starts_with(managed));

        self.ancestors.clear();
        self.ancestors.push(root.clone());
        for (packager, entry) in read_dir_sorted(&root)? {
            if packager == TOOLS_DIR {
                log::debug!("Excluding folder: {:?}", entry);
                continue;
            }
            let packager_path = self.enter(&entry)?;
            if !packager_path.is_dir() {
                self.leave();
                continue;
            }
            let result = self.load_packager(&packager, &packager_path, manual);
            self.leave();
            result?;
        }
        self.ancestors.clear();
        Ok(())
    }

    /// Scan roots laid out as `PACKAGER/TOOL/VERSION`.
    pub fn scan_tools_dirs(&mut self, roots: &[PathBuf]) -> Result<(), ScanError> {
        for root in roots {
            log::info!("Loading tools from: {:?}", root);
            let root = open_root(root)?;
            self.ancestors.clear();
            self.ancestors.push(root.clone());
            for (packager, entry) in read_dir_sorted(&root)? {
                let packager_path = self.enter(&entry)?;
                let result = if packager_path.is_dir() {
                    self.load_tools(&packager, &packager_path)
                } else {
                    Ok(())
                };
                self.leave();
                result?;
            }
            self.ancestors.clear();
        }
        Ok(())
    }

    fn load_packager(
        &mut self,
        packager: &str,
        packager_path: &Path,
        manual: bool,
    ) -> Result<(), ScanError> {
        let hardware_subdir = packager_path.join(HARDWARE_DIR);
        let legacy = hardware_subdir.is_dir();
        let architecture_parent = if legacy {
            self.enter(&hardware_subdir)?
        } else {
            packager_path.to_path_buf()
        };

        let result = self.load_platforms(packager, &architecture_parent, manual);
        if legacy {
            self.leave();
        }
        result?;

        let tools_subdir = packager_path.join(TOOLS_DIR);
        if tools_subdir.is_dir() {
            log::debug!("Checking existence of 'tools' path: {:?}", tools_subdir);
            let tools_path = self.enter(&tools_subdir)?;
            let result = self.load_tools(packager, &tools_path);
            self.leave();
            result?;
        }
        Ok(())
    }

    fn load_platforms(
        &mut self,
        packager: &str,
        architecture_parent: &Path,
        manual: bool,
    ) -> Result<(), ScanError> {
        log::info!("Loading package {} from: {:?}", packager, architecture_parent);

        let platform_txt = architecture_parent.join(PLATFORM_TXT);
        let package_props = load_optional(&platform_txt)?;
        if let Some(props) = package_props {
            log::debug!("Merging {} properties from {:?}", props.len(), platform_txt);
            self.catalog
                .get_or_create_package(packager)
                .properties
                .extend(props);
        }

        for (architecture, entry) in read_dir_sorted(architecture_parent)? {
            if architecture == TOOLS_DIR {
                continue;
            }
            let platform_path = self.enter(&entry)?;
            let result = if platform_path.is_dir() {
                self.load_platform_releases(packager, &architecture, &platform_path, manual)
            } else {
                Ok(())
            };
            self.leave();
            result?;
        }
        Ok(())
    }

    fn load_platform_releases(
        &mut self,
        packager: &str,
        architecture: &str,
        platform_path: &Path,
        manual: bool,
    ) -> Result<(), ScanError> {
        // ARCHITECTURE/boards.txt marks an unversioned platform (a cloned core)
        if let Some(props) = load_optional(&platform_path.join(BOARDS_TXT))? {
            return self.load_unversioned_platform(packager, architecture, platform_path, &props);
        }

        for (version, entry) in read_dir_sorted(platform_path)? {
            if version == LATEST {
                log::warn!("Ignoring release folder named '{}': {:?}", LATEST, entry);
                continue;
            }
            let release_dir = self.enter(&entry)?;
            self.leave();
            if !release_dir.is_dir() {
                continue;
            }

            let boards = match load_optional(&release_dir.join(BOARDS_TXT))? {
                Some(props) => boards_from_properties(&props),
                None => Vec::new(),
            };

            let package: &mut Package = self.catalog.get_or_create_package(packager);
            let release = package
                .get_or_create_platform(architecture)
                .mark_installed(&version, release_dir.clone(), manual);
            if !boards.is_empty() {
                release.boards = boards;
            }
            log::debug!("Loaded platform {} from {:?}", release.code(), release_dir);
        }
        Ok(())
    }

    /// The platform folder is the release itself; its version comes from
    /// `platform.txt`. Always flagged as manually installed.
    fn load_unversioned_platform(
        &mut self,
        packager: &str,
        architecture: &str,
        platform_path: &Path,
        boards_txt: &Properties,
    ) -> Result<(), ScanError> {
        let invalid = |reason: String| ScanError::InvalidPlatformVersion {
            path: platform_path.to_path_buf(),
            reason,
        };
        let platform_props = load_optional(&platform_path.join(PLATFORM_TXT))?
            .ok_or_else(|| invalid(format!("missing {}", PLATFORM_TXT)))?;
        let version = platform_props
            .get("version")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid(format!("no version in {}", PLATFORM_TXT)))?;
        if version == LATEST || !is_semver(version) {
            return Err(invalid(format!("invalid version '{}'", version)));
        }

        let boards = boards_from_properties(boards_txt);
        let release = self
            .catalog
            .get_or_create_package(packager)
            .get_or_create_platform(architecture)
            .mark_installed(version, platform_path.to_path_buf(), true);
        if !boards.is_empty() {
            release.boards = boards;
        }
        log::debug!("Loaded unversioned platform {} from {:?}", release.code(), platform_path);
        Ok(())
    }

    fn load_tools(&mut self, packager: &str, tools_path: &Path) -> Result<(), ScanError> {
        log::info!("Loading tools from dir: {:?}", tools_path);
        for (tool_name, entry) in read_dir_sorted(tools_path)? {
            let tool_path = self.enter(&entry)?;
            if !tool_path.is_dir() {
                self.leave();
                continue;
            }
            let versions = read_dir_sorted(&tool_path);
            let versions = match versions {
                Ok(v) => v,
                Err(e) => {
                    self.leave();
                    return Err(e);
                }
            };
            for (version, version_entry) in versions {
                if version == LATEST {
                    continue;
                }
                let release_dir = match self.enter(&version_entry) {
                    Ok(dir) => dir,
                    Err(e) => {
                        self.leave();
                        return Err(e);
                    }
                };
                self.leave();
                if !release_dir.is_dir() {
                    continue;
                }
                let release = self
                    .catalog
                    .get_or_create_package(packager)
                    .get_or_create_tool(&tool_name)
                    .mark_installed(&version, release_dir);
                log::debug!("Loaded tool {}", release.code());
            }
            self.leave();
        }
        Ok(())
    }

    /// Resolve `path` through any symlinks and push it on the ancestor chain.
    fn enter(&mut self, path: &Path) -> Result<PathBuf, ScanError> {
        let target = dunce::canonicalize(path).map_err(|source| ScanError::SymlinkResolution {
            path: path.to_path_buf(),
            source,
        })?;
        if self.ancestors.iter().any(|a| *a == target) {
            return Err(ScanError::SymlinkCycle {
                path: path.to_path_buf(),
                target,
            });
        }
        self.ancestors.push(target.clone());
        Ok(target)
    }

    fn leave(&mut self) {
        self.ancestors.pop();
    }
}

fn open_root(root: &Path) -> Result<PathBuf, ScanError> {
    let meta = std::fs::metadata(root).map_err(|source| ScanError::Unreadable {
        path: root.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    dunce::canonicalize(root).map_err(|source| ScanError::Unreadable {
        path: root.to_path_buf(),
        source,
    })
}

/// Directory entries as (file name, path), sorted by name; hidden entries skipped.
fn read_dir_sorted(dir: &Path) -> Result<Vec<(String, PathBuf)>, ScanError> {
    let unreadable = |source| ScanError::Unreadable {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::version::VersionRequest;
    use std::fs;

    fn mkdirs(path: &Path) {
        fs::create_dir_all(path).unwrap();
    }

    #[test]
    fn modern_and_legacy_layouts() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        let root2 = tmp.path().join("root2");
        mkdirs(&root.join("acme/avr/2.0.0"));
        mkdirs(&root2.join("acme2/hardware/avr/3.0.0"));

        let mut catalog = Catalog::new();
        HardwareScanner::new(&mut catalog, None)
            .scan_hardware_dirs(&[root, root2])
            .unwrap();

        let modern = catalog
            .platform_release("acme", "avr", &VersionRequest::pinned("2.0.0"))
            .unwrap();
        assert!(modern.is_installed());
        assert!(modern.manually_installed);
        let legacy = catalog
            .platform_release("acme2", "avr", &VersionRequest::pinned("3.0.0"))
            .unwrap();
        assert!(legacy.is_installed());
        assert!(catalog.package("acme2").unwrap().platforms.get("hardware").is_none());
    }

    #[test]
    fn tools_folder_is_skipped_at_root_and_loaded_under_packager() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        mkdirs(&root.join("tools/avrdude/6.3.0"));
        mkdirs(&root.join("arduino/hardware/avr/1.8.3"));
        mkdirs(&root.join("arduino/tools/avrdude/6.3.0"));

        let mut catalog = Catalog::new();
        HardwareScanner::new(&mut catalog, Some(root))
            .scan_hardware_dir(root)
            .unwrap();

        assert!(catalog.package("tools").is_none());
        let arduino = catalog.package("arduino").unwrap();
        assert!(arduino.platforms.get("tools").is_none());
        let avrdude = &arduino.tools["avrdude"].releases["6.3.0"];
        assert!(avrdude.is_installed());
        assert!(!arduino.platforms["avr"].releases["1.8.3"].manually_installed);
    }

    #[test]
    fn platform_txt_merged_into_package_properties() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        mkdirs(&root.join("acme/avr/1.0.0"));
        fs::write(root.join("acme/platform.txt"), "name=ACME\ncompiler.path=/opt\n").unwrap();
        fs::write(
            root.join("acme/avr/1.0.0/boards.txt"),
            "rocket.name=ACME Rocket\nrocket.build.mcu=atmega328p\n",
        )
        .unwrap();

        let mut catalog = Catalog::new();
        HardwareScanner::new(&mut catalog, None)
            .scan_hardware_dir(root)
            .unwrap();

        let acme = catalog.package("acme").unwrap();
        assert_eq!(acme.properties["name"], "ACME");
        // the properties file is not mistaken for an architecture
        assert_eq!(acme.platforms.len(), 1);
        let release = &acme.platforms["avr"].releases["1.0.0"];
        assert_eq!(release.boards[0].name, "ACME Rocket");
    }

    #[test]
    fn malformed_platform_txt_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        mkdirs(&root.join("acme/avr/1.0.0"));
        fs::write(root.join("acme/platform.txt"), "not a property line\n").unwrap();

        let mut catalog = Catalog::new();
        let err = HardwareScanner::new(&mut catalog, None)
            .scan_hardware_dir(root)
            .unwrap_err();
        assert!(matches!(err, ScanError::MalformedProperties { .. }));
    }

    #[test]
    fn missing_or_file_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();

        let mut catalog = Catalog::new();
        let mut scanner = HardwareScanner::new(&mut catalog, None);
        assert!(matches!(
            scanner.scan_hardware_dir(&file),
            Err(ScanError::NotADirectory(_))
        ));
        assert!(matches!(
            scanner.scan_hardware_dir(&tmp.path().join("missing")),
            Err(ScanError::Unreadable { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_packager_is_followed() {
        let tmp = tempfile::tempdir().unwrap();
        let clone = tmp.path().join("dev/my-core");
        mkdirs(&clone.join("avr/0.1.0"));
        let root = tmp.path().join("hardware");
        mkdirs(&root);
        std::os::unix::fs::symlink(&clone, root.join("mine")).unwrap();

        let mut catalog = Catalog::new();
        HardwareScanner::new(&mut catalog, None)
            .scan_hardware_dir(&root)
            .unwrap();
        let release = &catalog.package("mine").unwrap().platforms["avr"].releases["0.1.0"];
        assert_eq!(
            release.install_dir.as_deref(),
            Some(dunce::canonicalize(clone.join("avr/0.1.0")).unwrap().as_path())
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycle_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("hardware");
        mkdirs(&root.join("acme/avr"));
        // acme/avr/1.0.0 -> acme: descending into it would loop forever
        std::os::unix::fs::symlink(root.join("acme"), root.join("acme/avr/1.0.0")).unwrap();

        let mut catalog = Catalog::new();
        let err = HardwareScanner::new(&mut catalog, None)
            .scan_hardware_dir(&root)
            .unwrap_err();
        assert!(matches!(err, ScanError::SymlinkCycle { .. }), "{err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("hardware");
        mkdirs(&root);
        std::os::unix::fs::symlink(tmp.path().join("gone"), root.join("ghost")).unwrap();

        let mut catalog = Catalog::new();
        let err = HardwareScanner::new(&mut catalog, None)
            .scan_hardware_dir(&root)
            .unwrap_err();
        assert!(matches!(err, ScanError::SymlinkResolution { .. }));
    }

    #[test]
    fn unversioned_platform_reads_version_from_platform_txt() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let core = root.join("mine/avr");
        mkdirs(&core.join("cores/arduino"));
        mkdirs(&core.join("variants/standard"));
        fs::write(core.join("boards.txt"), "uno.name=Dev Uno\n").unwrap();
        fs::write(core.join("platform.txt"), "name=Dev AVR\nversion=1.2.3\n").unwrap();

        let mut catalog = Catalog::new();
        HardwareScanner::new(&mut catalog, Some(root))
            .scan_hardware_dir(root)
            .unwrap();

        let platform = &catalog.package("mine").unwrap().platforms["avr"];
        let versions: Vec<&str> = platform.releases.keys().map(String::as_str).collect();
        assert_eq!(versions, vec!["1.2.3"]);
        let release = &platform.releases["1.2.3"];
        assert!(release.manually_installed);
        assert_eq!(
            release.install_dir.as_deref(),
            Some(dunce::canonicalize(&core).unwrap().as_path())
        );
        assert_eq!(release.boards[0].name, "Dev Uno");
    }

    #[test]
    fn unversioned_platform_without_valid_version_is_fatal() {
        for platform_txt in [None, Some("name=Dev AVR\n"), Some("version=cores\n")] {
            let tmp = tempfile::tempdir().unwrap();
            let core = tmp.path().join("mine/avr");
            mkdirs(&core);
            fs::write(core.join("boards.txt"), "uno.name=Dev Uno\n").unwrap();
            if let Some(text) = platform_txt {
                fs::write(core.join("platform.txt"), text).unwrap();
            }

            let mut catalog = Catalog::new();
            let err = HardwareScanner::new(&mut catalog, None)
                .scan_hardware_dir(tmp.path())
                .unwrap_err();
            assert!(
                matches!(err, ScanError::InvalidPlatformVersion { .. }),
                "{platform_txt:?}: {err:?}"
            );
        }
    }

    #[test]
    fn tools_roots() {
        let tmp = tempfile::tempdir().unwrap();
        mkdirs(&tmp.path().join("arduino/avr-gcc/7.3.0-atmel3.6.1-arduino7"));
        mkdirs(&tmp.path().join("arduino/avrdude/6.3.0"));

        let mut catalog = Catalog::new();
        HardwareScanner::new(&mut catalog, None)
            .scan_tools_dirs(&[tmp.path().to_path_buf()])
            .unwrap();
        let tools = &catalog.package("arduino").unwrap().tools;
        assert!(tools["avr-gcc"].releases["7.3.0-atmel3.6.1-arduino7"].is_installed());
        assert!(tools["avrdude"].latest_release().unwrap().is_installed());
    }
}
