//! # Archive Codecs
//!
//! Per-format archive/unarchive/compress/decompress primitives behind one
//! closed dispatch layer. The format set is fixed at design time, so dispatch
//! is a match over [`ArchiveFormat`] with an explicit capability table
//! instead of interface probing.
//!
//! Codecs operate on already-resolved real paths; the permission gate has
//! run before anything here is reached.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::detect::ArchiveFormat;
use crate::error::OpError;

pub mod gzip;
pub mod tar;
pub mod zip;

/// Which operations a format supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Pack many sources into a container.
    pub archive: bool,
    /// Expand a container into a directory tree.
    pub unarchive: bool,
    /// Compress a single stream.
    pub compress: bool,
    /// Decompress a single stream.
    pub decompress: bool,
}

/// The capability table over the closed format set.
///
/// gzip has no container concept, so it never archives or unarchives; 7z is
/// recognized by detection but has no codec at all.
pub const fn capabilities(format: ArchiveFormat) -> Capabilities {
    match format {
        ArchiveFormat::Zip | ArchiveFormat::Tar | ArchiveFormat::TarGz => Capabilities {
            archive: true,
            unarchive: true,
            compress: false,
            decompress: false,
        },
        ArchiveFormat::Gzip => Capabilities {
            archive: false,
            unarchive: false,
            compress: true,
            decompress: true,
        },
        ArchiveFormat::SevenZ | ArchiveFormat::Unknown => Capabilities {
            archive: false,
            unarchive: false,
            compress: false,
            decompress: false,
        },
    }
}

/// Expands `src` into the directory `dest` with the codec for `format`.
pub fn unarchive(format: ArchiveFormat, src: &Path, dest: &Path) -> Result<(), OpError> {
    match format {
        ArchiveFormat::Zip => self::zip::unarchive(src, dest),
        ArchiveFormat::Tar => self::tar::unarchive(src, dest, false),
        ArchiveFormat::TarGz => self::tar::unarchive(src, dest, true),
        other => Err(OpError::UnsupportedFormat(format!(
            "{} does not support extraction",
            other.as_str()
        ))),
    }
}

/// Packs `sources` into a new archive at `dest` with the codec for `format`.
pub fn archive(format: ArchiveFormat, sources: &[PathBuf], dest: &Path) -> Result<(), OpError> {
    match format {
        ArchiveFormat::Zip => self::zip::archive(sources, dest),
        ArchiveFormat::Tar => self::tar::archive(sources, dest, false),
        ArchiveFormat::TarGz => self::tar::archive(sources, dest, true),
        other => Err(OpError::UnsupportedFormat(format!(
            "{} does not support archive creation",
            other.as_str()
        ))),
    }
}

/// Opens a source file, classifying absence as `NotFound`.
pub(crate) fn open_source(path: &Path) -> Result<fs::File, OpError> {
    fs::File::open(path).map_err(|e| OpError::io(e, path))
}

pub(crate) fn source_metadata(path: &Path) -> Result<fs::Metadata, OpError> {
    fs::metadata(path).map_err(|e| OpError::io(e, path))
}

/// Creates the destination file, making parent directories as needed.
pub(crate) fn create_dest(path: &Path) -> Result<fs::File, OpError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| OpError::io(e, parent))?;
    }
    fs::File::create(path).map_err(|e| OpError::io(e, path))
}

/// The in-archive name a source contributes its tree under: its base name.
pub(crate) fn entry_base_name(path: &Path) -> Result<String, OpError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            OpError::InvalidArgument(format!("'{}' has no base name", path.display()))
        })
}

#[cfg(not(target_os = "windows"))]
pub(crate) fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(target_os = "windows")]
pub(crate) fn set_unix_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_table_is_closed() {
        assert!(capabilities(ArchiveFormat::Zip).unarchive);
        assert!(capabilities(ArchiveFormat::Tar).archive);
        assert!(capabilities(ArchiveFormat::TarGz).unarchive);

        let gz = capabilities(ArchiveFormat::Gzip);
        assert!(gz.compress && gz.decompress);
        assert!(!gz.archive && !gz.unarchive);

        assert_eq!(capabilities(ArchiveFormat::SevenZ), Capabilities::default());
        assert_eq!(capabilities(ArchiveFormat::Unknown), Capabilities::default());
    }

    #[test]
    fn dispatch_refuses_compressor_only_formats() {
        let err = unarchive(ArchiveFormat::Gzip, Path::new("a.gz"), Path::new("out"));
        assert!(matches!(err, Err(OpError::UnsupportedFormat(_))));

        let err = archive(ArchiveFormat::SevenZ, &[PathBuf::from("a")], Path::new("out.7z"));
        assert!(matches!(err, Err(OpError::UnsupportedFormat(_))));
    }
}
