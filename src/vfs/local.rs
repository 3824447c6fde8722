//! Disk-backed filesystem handler.
//!
//! Maps `ns:/rel` onto `root/rel` beneath a fixed root directory. The mapping
//! is lexical; `..` segments that would climb above the root fail resolution
//! instead of escaping it.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::OpError;
use crate::vfs::{FileSystemAbstraction, VirtualPath};

/// A handler that stores a namespace's contents under one root directory.
///
/// User scoping is a deployment concern: a multi-user mount embeds the
/// per-user segment in its root, so the username passed through the
/// abstraction is not consulted here.
pub struct LocalHandler {
    namespace: String,
    root: PathBuf,
}

impl LocalHandler {
    pub fn new(namespace: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self { namespace: namespace.into(), root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSystemAbstraction for LocalHandler {
    fn virtual_path_to_real_path(
        &self,
        vpath: &VirtualPath,
        _username: &str,
    ) -> Result<PathBuf, OpError> {
        match vpath.namespace() {
            Some(ns) if ns == self.namespace => {}
            _ => {
                return Err(OpError::Resolve(format!(
                    "'{vpath}' is outside namespace '{}:/'",
                    self.namespace
                )))
            }
        }

        let mut real = self.root.clone();
        let mut depth = 0usize;
        for part in vpath.relative_part().split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    if depth == 0 {
                        return Err(OpError::Resolve(format!(
                            "'{vpath}' escapes its namespace root"
                        )));
                    }
                    real.pop();
                    depth -= 1;
                }
                p => {
                    real.push(p);
                    depth += 1;
                }
            }
        }
        Ok(real)
    }

    fn real_path_to_virtual_path(
        &self,
        rpath: &Path,
        _username: &str,
    ) -> Result<VirtualPath, OpError> {
        let rel = rpath.strip_prefix(&self.root).map_err(|_| {
            OpError::Resolve(format!(
                "'{}' is not under the '{}:/' mount",
                rpath.display(),
                self.namespace
            ))
        })?;
        let joined = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Ok(VirtualPath::new(format!("{}:/{}", self.namespace, joined)))
    }

    fn read_stream(&self, rpath: &Path) -> io::Result<Box<dyn io::Read + Send>> {
        Ok(Box::new(File::open(rpath)?))
    }

    fn create(&self, rpath: &Path) -> io::Result<Box<dyn io::Write + Send>> {
        if let Some(parent) = rpath.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(File::create(rpath)?))
    }

    fn write_stream(&self, rpath: &Path, source: &mut dyn io::Read, mode: u32) -> io::Result<u64> {
        if let Some(parent) = rpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(rpath)?;
        let written = io::copy(source, &mut file)?;
        set_unix_permissions(rpath, mode)?;
        Ok(written)
    }

    fn walk(&self, root: &Path, visit: &mut dyn FnMut(&Path, bool)) -> io::Result<()> {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            visit(entry.path(), entry.file_type().is_dir());
        }
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(target_os = "windows")]
fn set_unix_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> LocalHandler {
        LocalHandler::new("user", "/srv/storage/alice")
    }

    #[test]
    fn maps_inside_root() {
        let h = handler();
        let real = h
            .virtual_path_to_real_path(&VirtualPath::new("user:/docs/a.txt"), "alice")
            .unwrap();
        assert_eq!(real, PathBuf::from("/srv/storage/alice/docs/a.txt"));
    }

    #[test]
    fn rejects_escape_and_foreign_namespace() {
        let h = handler();
        let escape = h.virtual_path_to_real_path(&VirtualPath::new("user:/../etc/passwd"), "alice");
        assert!(matches!(escape, Err(OpError::Resolve(_))));

        let foreign = h.virtual_path_to_real_path(&VirtualPath::new("tmp:/x"), "alice");
        assert!(matches!(foreign, Err(OpError::Resolve(_))));
    }

    #[test]
    fn round_trips_real_to_virtual() {
        let h = handler();
        let vpath = h
            .real_path_to_virtual_path(Path::new("/srv/storage/alice/docs/a.txt"), "alice")
            .unwrap();
        assert_eq!(vpath.as_str(), "user:/docs/a.txt");

        let outside = h.real_path_to_virtual_path(Path::new("/tmp/elsewhere"), "alice");
        assert!(matches!(outside, Err(OpError::Resolve(_))));
    }
}
