//! # Archive Operation Executor
//!
//! Performs one of extract / create / compress-single / decompress-single
//! against locations that have already been resolved and permission-checked
//! at the boundary. Every write-producing call triggers ownership
//! propagation over its destination before reporting success; a failed call
//! leaves the ownership index untouched.

use std::path::PathBuf;

use tracing::debug;

use crate::codec;
use crate::detect::ArchiveFormat;
use crate::error::OpError;
use crate::owner;
use crate::user::Principal;
use crate::vfs::{ResolvedLocation, Vfs, VirtualPath};

/// Parses an explicit format name from the multi-source create entry point.
///
/// gzip is rejected here with `InvalidArgument`: it has no container
/// concept, so single-file compression is a distinct operation.
pub fn parse_create_format(name: &str) -> Result<ArchiveFormat, OpError> {
    match name.to_ascii_lowercase().as_str() {
        "zip" => Ok(ArchiveFormat::Zip),
        "tar" => Ok(ArchiveFormat::Tar),
        "tar.gz" | "tgz" | "targz" => Ok(ArchiveFormat::TarGz),
        "gz" | "gzip" => Err(OpError::InvalidArgument(
            "gzip compresses a single stream; use the single-file compression operation".into(),
        )),
        other => Err(OpError::UnsupportedFormat(other.to_string())),
    }
}

/// Executes archive operations for one acting principal.
pub struct Executor<'a> {
    vfs: &'a Vfs,
    principal: &'a Principal,
}

impl<'a> Executor<'a> {
    pub fn new(vfs: &'a Vfs, principal: &'a Principal) -> Self {
        Self { vfs, principal }
    }

    /// Unarchives `src` into the directory at `dest`, then attributes every
    /// extracted file to the acting principal.
    pub fn extract(
        &self,
        format: ArchiveFormat,
        src: &ResolvedLocation,
        dest: &ResolvedLocation,
    ) -> Result<(), OpError> {
        debug!(
            format = format.as_str(),
            src = %src.rpath.display(),
            dest = %dest.rpath.display(),
            "extracting archive"
        );
        codec::unarchive(format, &src.rpath, &dest.rpath)?;
        owner::propagate_tree(self.vfs, &dest.fsh, &dest.rpath, self.principal);
        Ok(())
    }

    /// Packs `sources` into a new archive at `dest`, then attributes the
    /// archive file to the acting principal.
    pub fn create(
        &self,
        format: ArchiveFormat,
        sources: &[ResolvedLocation],
        dest: &ResolvedLocation,
        dest_vpath: &VirtualPath,
    ) -> Result<(), OpError> {
        if sources.is_empty() {
            return Err(OpError::InvalidArgument("no source paths supplied".into()));
        }
        debug!(
            format = format.as_str(),
            sources = sources.len(),
            dest = %dest.rpath.display(),
            "creating archive"
        );
        let rpaths: Vec<PathBuf> = sources.iter().map(|s| s.rpath.clone()).collect();
        codec::archive(format, &rpaths, &dest.rpath)?;
        owner::assign_single(self.vfs, dest_vpath, self.principal);
        Ok(())
    }

    /// Gzip-compresses the single file at `src` into `dest`.
    pub fn compress_gzip(
        &self,
        src: &ResolvedLocation,
        dest: &ResolvedLocation,
        dest_vpath: &VirtualPath,
    ) -> Result<(), OpError> {
        debug!(src = %src.rpath.display(), dest = %dest.rpath.display(), "gzip compress");
        let mut reader = src
            .fsh
            .filesystem
            .read_stream(&src.rpath)
            .map_err(|e| OpError::io(e, &src.rpath))?;
        let mut writer = dest
            .fsh
            .filesystem
            .create(&dest.rpath)
            .map_err(|e| OpError::io(e, &dest.rpath))?;
        codec::gzip::compress(reader.as_mut(), writer.as_mut())?;
        owner::assign_single(self.vfs, dest_vpath, self.principal);
        Ok(())
    }

    /// Decompresses the single gzip stream at `src` into `dest`.
    pub fn decompress_gzip(
        &self,
        src: &ResolvedLocation,
        dest: &ResolvedLocation,
        dest_vpath: &VirtualPath,
    ) -> Result<(), OpError> {
        debug!(src = %src.rpath.display(), dest = %dest.rpath.display(), "gzip decompress");
        let mut reader = src
            .fsh
            .filesystem
            .read_stream(&src.rpath)
            .map_err(|e| OpError::io(e, &src.rpath))?;
        let mut writer = dest
            .fsh
            .filesystem
            .create(&dest.rpath)
            .map_err(|e| OpError::io(e, &dest.rpath))?;
        codec::gzip::decompress(reader.as_mut(), writer.as_mut())?;
        owner::assign_single(self.vfs, dest_vpath, self.principal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_for_create() {
        assert_eq!(parse_create_format("zip").unwrap(), ArchiveFormat::Zip);
        assert_eq!(parse_create_format("TAR").unwrap(), ArchiveFormat::Tar);
        assert_eq!(parse_create_format("tar.gz").unwrap(), ArchiveFormat::TarGz);
        assert_eq!(parse_create_format("tgz").unwrap(), ArchiveFormat::TarGz);
        assert_eq!(parse_create_format("targz").unwrap(), ArchiveFormat::TarGz);

        assert!(matches!(
            parse_create_format("gz"),
            Err(OpError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_create_format("gzip"),
            Err(OpError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_create_format("rar"),
            Err(OpError::UnsupportedFormat(_))
        ));
    }
}
