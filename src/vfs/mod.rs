//! # Virtual Filesystem Layer
//!
//! This module defines the namespace-prefixed path values used at the script
//! boundary (`user:/docs/report.pdf`), the abstraction the archive subsystem
//! reads and writes through, and the mount router that turns a virtual path
//! into a `(handler, real path)` pair for a specific acting principal.
//!
//! Resolution is purely lexical: mapping a virtual path to a real path never
//! touches the underlying storage. The router also hosts the ownership store,
//! the only piece of state that outlives a single call.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::OpError;

pub mod local;

pub use local::LocalHandler;

/// A namespace-prefixed logical path, e.g. `user:/docs/report.pdf`.
///
/// A path without a `ns:/` prefix is relative to the invoking script's own
/// location and must be rewritten with [`VirtualPath::resolve_against`]
/// before any other operation touches it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualPath(String);

impl VirtualPath {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        VirtualPath(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace tag of an absolute path (`user` for `user:/x`), or
    /// `None` for a relative path.
    pub fn namespace(&self) -> Option<&str> {
        let idx = self.0.find(":/")?;
        let ns = &self.0[..idx];
        if ns.is_empty() || ns.contains('/') {
            return None;
        }
        Some(ns)
    }

    pub fn is_absolute(&self) -> bool {
        self.namespace().is_some()
    }

    /// The slash-separated remainder after the `ns:/` prefix, without a
    /// leading slash. Empty for the namespace root.
    pub fn relative_part(&self) -> &str {
        match self.0.find(":/") {
            Some(idx) => self.0[idx + 2..].trim_start_matches('/'),
            None => self.0.as_str(),
        }
    }

    /// The final path segment, with any trailing slash removed.
    pub fn base_name(&self) -> &str {
        let trimmed = self.relative_part().trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or("")
    }

    /// Appends one segment, normalizing the separator.
    pub fn join(&self, name: &str) -> VirtualPath {
        let trimmed = self.0.trim_end_matches('/');
        VirtualPath(format!("{}/{}", trimmed, name.trim_start_matches('/')))
    }

    /// Rewrites a possibly-relative raw path to absolute form against the
    /// directory containing `base` (the invoking script's own location).
    ///
    /// `.` and `..` segments resolve lexically and clamp at the namespace
    /// root. An already-absolute path is returned unchanged.
    pub fn resolve_against(raw: &str, base: &VirtualPath) -> VirtualPath {
        let candidate = VirtualPath::new(raw);
        if candidate.is_absolute() {
            return candidate;
        }
        let Some(ns) = base.namespace() else {
            return candidate;
        };

        let mut segments: Vec<&str> = base
            .relative_part()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        // drop the script file itself, keeping its directory
        segments.pop();

        for part in raw.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                p => segments.push(p),
            }
        }
        VirtualPath(format!("{}:/{}", ns, segments.join("/")))
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VirtualPath {
    fn from(raw: &str) -> Self {
        VirtualPath::new(raw)
    }
}

/// The storage primitives a mounted filesystem exposes to the archive
/// subsystem. Implementations own all real I/O; the subsystem itself never
/// touches the disk except through a handler.
pub trait FileSystemAbstraction: Send + Sync {
    /// Maps a virtual path inside this handler's namespace to a real path.
    /// Must not perform any I/O.
    fn virtual_path_to_real_path(
        &self,
        vpath: &VirtualPath,
        username: &str,
    ) -> Result<PathBuf, OpError>;

    /// The inverse mapping, used when attributing ownership after a walk.
    fn real_path_to_virtual_path(
        &self,
        rpath: &Path,
        username: &str,
    ) -> Result<VirtualPath, OpError>;

    /// Opens a real path for sequential reading.
    fn read_stream(&self, rpath: &Path) -> io::Result<Box<dyn io::Read + Send>>;

    /// Creates (or truncates) a real path for sequential writing, creating
    /// missing parent directories.
    fn create(&self, rpath: &Path) -> io::Result<Box<dyn io::Write + Send>>;

    /// Writes everything from `source` into a new file at `rpath` with the
    /// given permission bits, returning the number of bytes written.
    fn write_stream(&self, rpath: &Path, source: &mut dyn io::Read, mode: u32) -> io::Result<u64>;

    /// Visits every entry under `root` (including `root` itself), reporting
    /// whether each is a directory. Unreadable entries are skipped.
    fn walk(&self, root: &Path, visit: &mut dyn FnMut(&Path, bool)) -> io::Result<()>;
}

/// A mounted filesystem: a namespace tag plus the backing implementation.
pub struct FileSystemHandler {
    uuid: String,
    name: String,
    pub filesystem: Box<dyn FileSystemAbstraction>,
}

impl FileSystemHandler {
    pub fn new(
        uuid: impl Into<String>,
        name: impl Into<String>,
        filesystem: Box<dyn FileSystemAbstraction>,
    ) -> Self {
        Self { uuid: uuid.into(), name: name.into(), filesystem }
    }

    /// The namespace tag this handler serves, e.g. `user` for `user:/`.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A resolved `(handler, real path)` pair for one virtual path.
///
/// The handler reference is shared with the filesystem layer; this subsystem
/// never owns a mount.
pub struct ResolvedLocation {
    pub fsh: Arc<FileSystemHandler>,
    pub rpath: PathBuf,
}

/// Association of virtual paths to their owning principals, persisted by the
/// filesystem layer. The archive subsystem only triggers record creation.
#[derive(Default)]
pub struct OwnershipStore {
    records: Mutex<HashMap<String, String>>,
}

impl OwnershipStore {
    /// Records `owner` as the owning principal of `vpath`, replacing any
    /// previous record for the same path.
    pub fn assign(&self, vpath: &VirtualPath, owner: &str) {
        self.records
            .lock()
            .expect("ownership store poisoned")
            .insert(vpath.as_str().to_string(), owner.to_string());
    }

    pub fn owner_of(&self, vpath: &VirtualPath) -> Option<String> {
        self.records
            .lock()
            .expect("ownership store poisoned")
            .get(vpath.as_str())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("ownership store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The mount router: maps namespace tags to handlers and hosts the ownership
/// store. Shared across calls; all archive operations borrow it.
#[derive(Default)]
pub struct Vfs {
    handlers: RwLock<HashMap<String, Arc<FileSystemHandler>>>,
    ownership: OwnershipStore,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts a handler under its namespace tag, replacing any previous
    /// mount for the same tag.
    pub fn register(&self, handler: FileSystemHandler) {
        let mut handlers = self.handlers.write().expect("mount table poisoned");
        handlers.insert(handler.uuid().to_string(), Arc::new(handler));
    }

    pub fn handler(&self, namespace: &str) -> Option<Arc<FileSystemHandler>> {
        self.handlers
            .read()
            .expect("mount table poisoned")
            .get(namespace)
            .cloned()
    }

    /// Resolves an absolute virtual path to a `(handler, real path)` pair.
    ///
    /// Fails with [`OpError::Resolve`] for a relative path, an unknown
    /// namespace, or a path that escapes its namespace root. Performs no I/O
    /// and no permission checks.
    pub fn resolve(&self, vpath: &VirtualPath, username: &str) -> Result<ResolvedLocation, OpError> {
        let ns = vpath
            .namespace()
            .ok_or_else(|| OpError::Resolve(format!("'{vpath}' has no namespace prefix")))?;
        let fsh = self
            .handler(ns)
            .ok_or_else(|| OpError::Resolve(format!("unknown namespace '{ns}:/'")))?;
        let rpath = fsh.filesystem.virtual_path_to_real_path(vpath, username)?;
        Ok(ResolvedLocation { fsh, rpath })
    }

    pub fn ownership(&self) -> &OwnershipStore {
        &self.ownership
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_parsing() {
        assert_eq!(VirtualPath::new("user:/docs/a.txt").namespace(), Some("user"));
        assert_eq!(VirtualPath::new("tmp:/").namespace(), Some("tmp"));
        assert_eq!(VirtualPath::new("docs/a.txt").namespace(), None);
        assert_eq!(VirtualPath::new("a/b:/c").namespace(), None);
    }

    #[test]
    fn relative_part_and_base_name() {
        let p = VirtualPath::new("user:/docs/sub/a.txt");
        assert_eq!(p.relative_part(), "docs/sub/a.txt");
        assert_eq!(p.base_name(), "a.txt");
        assert_eq!(VirtualPath::new("user:/").relative_part(), "");
        assert_eq!(VirtualPath::new("user:/docs/").base_name(), "docs");
    }

    #[test]
    fn relative_rewrite_against_script_location() {
        let script = VirtualPath::new("user:/scripts/tool.js");
        assert_eq!(
            VirtualPath::resolve_against("data/in.zip", &script).as_str(),
            "user:/scripts/data/in.zip"
        );
        assert_eq!(
            VirtualPath::resolve_against("../backup.zip", &script).as_str(),
            "user:/backup.zip"
        );
        assert_eq!(
            VirtualPath::resolve_against("./a.txt", &script).as_str(),
            "user:/scripts/a.txt"
        );
        // clamps at the namespace root instead of escaping
        assert_eq!(
            VirtualPath::resolve_against("../../../x", &script).as_str(),
            "user:/x"
        );
        // absolute input is untouched
        assert_eq!(
            VirtualPath::resolve_against("tmp:/x", &script).as_str(),
            "tmp:/x"
        );
    }

    #[test]
    fn join_handles_namespace_root() {
        assert_eq!(VirtualPath::new("tmp:/").join("a.txt").as_str(), "tmp:/a.txt");
        assert_eq!(
            VirtualPath::new("user:/docs").join("a.txt").as_str(),
            "user:/docs/a.txt"
        );
    }

    #[test]
    fn ownership_assignment_replaces() {
        let store = OwnershipStore::default();
        let p = VirtualPath::new("user:/a.txt");
        store.assign(&p, "alice");
        store.assign(&p, "bob");
        assert_eq!(store.owner_of(&p).as_deref(), Some("bob"));
        assert_eq!(store.len(), 1);
    }
}
