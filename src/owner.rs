//! Ownership propagation.
//!
//! Runs once, after a producing operation has fully succeeded; a failed
//! operation never reaches this module, so ownership is all-or-nothing
//! relative to operation success. Recording failures are logged and
//! swallowed; the archive content on disk is authoritative and is never
//! rolled back over bookkeeping.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::user::Principal;
use crate::vfs::{FileSystemHandler, Vfs, VirtualPath};

/// Walks the subtree a directory-producing operation just wrote and assigns
/// the acting principal as owner of every regular file in it. Directories
/// themselves carry no ownership records.
pub fn propagate_tree(vfs: &Vfs, fsh: &Arc<FileSystemHandler>, root: &Path, principal: &Principal) {
    let walked = fsh.filesystem.walk(root, &mut |path, is_dir| {
        if is_dir {
            return;
        }
        match fsh.filesystem.real_path_to_virtual_path(path, principal.username()) {
            Ok(vpath) => vfs.ownership().assign(&vpath, principal.username()),
            Err(err) => warn!(
                path = %path.display(),
                %err,
                "skipping ownership record for unmappable path"
            ),
        }
    });
    if let Err(err) = walked {
        warn!(root = %root.display(), %err, "ownership walk aborted");
    }
}

/// Assigns the acting principal as owner of the one file a single-file
/// operation produced.
pub fn assign_single(vfs: &Vfs, vpath: &VirtualPath, principal: &Principal) {
    vfs.ownership().assign(vpath, principal.username());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Access;
    use crate::vfs::LocalHandler;
    use std::fs;

    #[test]
    fn walk_attributes_files_but_not_directories() {
        let mount = tempfile::tempdir().unwrap();
        fs::create_dir_all(mount.path().join("out/sub")).unwrap();
        fs::write(mount.path().join("out/a.txt"), b"a").unwrap();
        fs::write(mount.path().join("out/sub/b.txt"), b"b").unwrap();

        let vfs = Vfs::new();
        vfs.register(FileSystemHandler::new(
            "user",
            "User Storage",
            Box::new(LocalHandler::new("user", mount.path())),
        ));
        let alice = Principal::new("alice").grant("user", Access::ReadWrite);
        let fsh = vfs.handler("user").unwrap();

        propagate_tree(&vfs, &fsh, &mount.path().join("out"), &alice);

        let owned = |v: &str| vfs.ownership().owner_of(&VirtualPath::new(v));
        assert_eq!(owned("user:/out/a.txt").as_deref(), Some("alice"));
        assert_eq!(owned("user:/out/sub/b.txt").as_deref(), Some("alice"));
        assert_eq!(owned("user:/out"), None);
        assert_eq!(owned("user:/out/sub"), None);
        assert_eq!(vfs.ownership().len(), 2);
    }
}
