//! Tar and tar.gz codec.
//!
//! Both chains share one appender; the gzip layer is added or stripped at
//! the file boundary. Unpacking delegates to the `tar` crate, which already
//! refuses entries that would land outside the destination.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::OpError;

use super::{create_dest, entry_base_name, open_source, source_metadata};

/// Expands the archive at `src` into the directory `dest`.
pub fn unarchive(src: &Path, dest: &Path, gzipped: bool) -> Result<(), OpError> {
    let file = open_source(src)?;
    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut archive = tar::Archive::new(reader);
    fs::create_dir_all(dest).map_err(|e| OpError::io(e, dest))?;
    archive.unpack(dest).map_err(|e| OpError::io(e, src))?;
    Ok(())
}

/// Packs `sources` into a new tar (or tar.gz) archive at `dest`.
pub fn archive(sources: &[PathBuf], dest: &Path, gzipped: bool) -> Result<(), OpError> {
    let out = create_dest(dest)?;
    if gzipped {
        let encoder = GzEncoder::new(out, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        append_sources(&mut builder, sources)?;
        let encoder = builder.into_inner().map_err(|e| OpError::io(e, dest))?;
        encoder.finish().map_err(|e| OpError::io(e, dest))?;
    } else {
        let mut builder = tar::Builder::new(out);
        append_sources(&mut builder, sources)?;
        builder.into_inner().map_err(|e| OpError::io(e, dest))?;
    }
    Ok(())
}

fn append_sources<W: io::Write>(
    builder: &mut tar::Builder<W>,
    sources: &[PathBuf],
) -> Result<(), OpError> {
    for src in sources {
        let meta = source_metadata(src)?;
        let base = entry_base_name(src)?;
        if meta.is_dir() {
            builder
                .append_dir_all(&base, src)
                .map_err(|e| OpError::io(e, src))?;
        } else {
            builder
                .append_path_with_name(src, &base)
                .map_err(|e| OpError::io(e, src))?;
        }
    }
    Ok(())
}
