//! Zip archive codec.
//!
//! Entry names inside an archive are always `/`-separated; directory sources
//! contribute their tree under the source's own base name. Extraction
//! validates every entry path against the destination; an entry that would
//! land outside it fails the whole operation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::FileOptions;

use crate::error::OpError;

use super::{create_dest, entry_base_name, open_source, set_unix_permissions, source_metadata};

/// Expands the archive at `src` into the directory `dest`.
pub fn unarchive(src: &Path, dest: &Path) -> Result<(), OpError> {
    let file = open_source(src)?;
    let mut archive = zip::ZipArchive::new(file)?;
    fs::create_dir_all(dest).map_err(|e| OpError::io(e, dest))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let rel: PathBuf = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                return Err(OpError::io(
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("entry '{}' escapes the destination", entry.name()),
                    ),
                    src,
                ))
            }
        };
        let target = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| OpError::io(e, &target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| OpError::io(e, parent))?;
        }
        let mut out = fs::File::create(&target).map_err(|e| OpError::io(e, &target))?;
        io::copy(&mut entry, &mut out).map_err(|e| OpError::io(e, &target))?;
        if let Some(mode) = entry.unix_mode() {
            set_unix_permissions(&target, mode).map_err(|e| OpError::io(e, &target))?;
        }
    }
    Ok(())
}

/// Packs `sources` into a new zip archive at `dest`. Directories recurse.
pub fn archive(sources: &[PathBuf], dest: &Path) -> Result<(), OpError> {
    let out = create_dest(dest)?;
    let mut writer = zip::ZipWriter::new(out);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for src in sources {
        let meta = source_metadata(src)?;
        let base = entry_base_name(src)?;
        if meta.is_dir() {
            append_dir(&mut writer, src, &base, options)?;
        } else {
            append_file(&mut writer, src, &base, options)?;
        }
    }

    writer.finish()?;
    Ok(())
}

fn append_file(
    writer: &mut zip::ZipWriter<fs::File>,
    src: &Path,
    name: &str,
    options: FileOptions,
) -> Result<(), OpError> {
    writer.start_file(name, options)?;
    let mut file = open_source(src)?;
    io::copy(&mut file, writer).map_err(|e| OpError::io(e, src))?;
    Ok(())
}

fn append_dir(
    writer: &mut zip::ZipWriter<fs::File>,
    root: &Path,
    base: &str,
    options: FileOptions,
) -> Result<(), OpError> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            OpError::io(e.into(), root)
        })?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir yields paths under its root");
        let name = if rel.as_os_str().is_empty() {
            base.to_string()
        } else {
            let joined = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            format!("{base}/{joined}")
        };

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
        } else {
            append_file(writer, entry.path(), &name, options)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn packs_and_expands_a_directory_tree() -> Result<(), Box<dyn std::error::Error>> {
        let source_dir = tempfile::tempdir()?;
        let data = source_dir.path().join("data");
        fs::create_dir_all(data.join("sub"))?;
        fs::write(data.join("a.txt"), b"first")?;
        fs::write(data.join("sub/b.txt"), b"second")?;

        let work = tempfile::tempdir()?;
        let archive_path = work.path().join("data.zip");
        archive(&[data.clone()], &archive_path)?;

        let out = work.path().join("out");
        unarchive(&archive_path, &out)?;

        assert_eq!(fs::read(out.join("data/a.txt"))?, b"first");
        assert_eq!(fs::read(out.join("data/sub/b.txt"))?, b"second");
        Ok(())
    }

    #[test]
    fn single_file_lands_under_its_base_name() -> Result<(), Box<dyn std::error::Error>> {
        let work = tempfile::tempdir()?;
        let src = work.path().join("report.txt");
        fs::write(&src, b"contents")?;

        let archive_path = work.path().join("report.zip");
        archive(&[src], &archive_path)?;

        let out = work.path().join("out");
        unarchive(&archive_path, &out)?;
        assert_eq!(fs::read(out.join("report.txt"))?, b"contents");
        Ok(())
    }

    #[test]
    fn traversal_entries_fail_extraction() -> Result<(), Box<dyn std::error::Error>> {
        let work = tempfile::tempdir()?;
        let archive_path = work.path().join("evil.zip");
        let mut writer = zip::ZipWriter::new(fs::File::create(&archive_path)?);
        let options = FileOptions::default();
        writer.start_file("../escape.txt", options)?;
        writer.write_all(b"nope")?;
        writer.finish()?;

        let out = work.path().join("out");
        let result = unarchive(&archive_path, &out);
        assert!(result.is_err());
        assert!(!work.path().join("escape.txt").exists());
        Ok(())
    }

    #[test]
    fn missing_source_is_not_found() {
        let work = tempfile::tempdir().unwrap();
        let result = archive(
            &[work.path().join("ghost.txt")],
            &work.path().join("out.zip"),
        );
        assert!(matches!(result, Err(OpError::NotFound(_))));
    }
}
