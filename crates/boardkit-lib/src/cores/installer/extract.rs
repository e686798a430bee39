use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Archive formats the installer can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveFormat {
    pub fn from_file_name(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(ArchiveFormat::TarGz)
        } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
            Ok(ArchiveFormat::TarBz2)
        } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
            Ok(ArchiveFormat::TarXz)
        } else if lower.ends_with(".tar") {
            Ok(ArchiveFormat::Tar)
        } else {
            anyhow::bail!("unsupported archive format: {}", name)
        }
    }
}

/// Unpack `archive` into `dest_dir`, picking the format from the file name.
pub fn extract_archive(archive: &Path, dest_dir: &Path) -> Result<()> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let format = ArchiveFormat::from_file_name(name)?;
    log::debug!("Extracting {:?} ({:?}) to: {:?}", archive, format, dest_dir);

    fs::create_dir_all(dest_dir).with_context(|| format!("Create {:?}", dest_dir))?;
    let file = fs::File::open(archive).with_context(|| format!("Open archive {:?}", archive))?;
    match format {
        ArchiveFormat::Zip => extract_zip(file, dest_dir),
        ArchiveFormat::Tar => extract_tar(file, dest_dir),
        ArchiveFormat::TarGz => extract_tar(flate2::read::GzDecoder::new(file), dest_dir),
        ArchiveFormat::TarBz2 => extract_tar(bzip2::read::BzDecoder::new(file), dest_dir),
        ArchiveFormat::TarXz => extract_tar(xz2::read::XzDecoder::new(file), dest_dir),
    }
    .with_context(|| format!("Extracting archive {:?}", archive))
}

fn extract_zip(file: fs::File, dest_dir: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            anyhow::bail!("archive entry escapes the destination: {}", entry.name());
        };
        let outpath = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(p) = outpath.parent() {
                if !p.exists() {
                    fs::create_dir_all(p)?;
                }
            }
            let mut outfile = fs::File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;
        }

        // Keep executable bits on tools
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

fn extract_tar<R: std::io::Read>(reader: R, dest_dir: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.unpack(dest_dir)?;
    Ok(())
}

/// The single top-level folder an archive unpacked into.
///
/// Loose files and `__MACOSX` metadata folders are ignored.
pub fn find_root_dir(extracted: &Path) -> Result<PathBuf> {
    let mut roots = Vec::new();
    for entry in fs::read_dir(extracted).with_context(|| format!("Read dir {:?}", extracted))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with("__MACOSX") {
            continue;
        }
        roots.push(entry.path());
    }
    match roots.len() {
        1 => Ok(roots.remove(0)),
        n => anyhow::bail!("no unique root dir in archive, found {}", n),
    }
}
