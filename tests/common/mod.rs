//! Shared test world: two disk-backed mounts (`user:/` and `tmp:/`), a
//! recording error reporter, and canned principals.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use archgate::gateway::{ArchiveGateway, ErrorReporter, ScriptContext};
use archgate::user::{Access, Principal};
use archgate::vfs::{FileSystemHandler, LocalHandler, Vfs, VirtualPath};
use archgate::OpError;

/// Captures every out-of-band error report so tests can assert on the
/// recoverable failure channel.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().unwrap().is_empty()
    }

    pub fn last_contains(&self, needle: &str) -> bool {
        self.reports
            .lock()
            .unwrap()
            .last()
            .map(|r| r.contains(needle))
            .unwrap_or(false)
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, err: &OpError) {
        self.reports.lock().unwrap().push(err.to_string());
    }
}

pub struct World {
    pub vfs: Arc<Vfs>,
    pub gateway: ArchiveGateway,
    pub reporter: Arc<RecordingReporter>,
    pub user_root: TempDir,
    pub tmp_root: TempDir,
}

impl World {
    pub fn new() -> World {
        let user_root = tempfile::tempdir().unwrap();
        let tmp_root = tempfile::tempdir().unwrap();

        let vfs = Arc::new(Vfs::new());
        vfs.register(FileSystemHandler::new(
            "user",
            "User Storage",
            Box::new(LocalHandler::new("user", user_root.path())),
        ));
        vfs.register(FileSystemHandler::new(
            "tmp",
            "Scratch Space",
            Box::new(LocalHandler::new("tmp", tmp_root.path())),
        ));

        let reporter = Arc::new(RecordingReporter::default());
        let gateway = ArchiveGateway::with_reporter(vfs.clone(), reporter.clone());
        World { vfs, gateway, reporter, user_root, tmp_root }
    }

    /// A context whose script lives at `user:/scripts/job.js`.
    pub fn ctx(&self, principal: Principal) -> ScriptContext {
        ScriptContext::new(Arc::new(principal), VirtualPath::new("user:/scripts/job.js"))
    }

    pub fn user_path(&self, rel: &str) -> PathBuf {
        self.user_root.path().join(rel)
    }

    pub fn tmp_path(&self, rel: &str) -> PathBuf {
        self.tmp_root.path().join(rel)
    }

    /// Seeds a file under the `user:/` mount.
    pub fn seed_user_file(&self, rel: &str, contents: &[u8]) {
        let path = self.user_path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn owner_of(&self, vpath: &str) -> Option<String> {
        self.vfs.ownership().owner_of(&VirtualPath::new(vpath))
    }
}

/// Read/write on both mounts.
pub fn full_access(username: &str) -> Principal {
    Principal::new(username)
        .grant("user", Access::ReadWrite)
        .grant("tmp", Access::ReadWrite)
}

/// Read-only on `user:/`, no `tmp:/` grant at all.
pub fn read_only(username: &str) -> Principal {
    Principal::new(username).grant("user", Access::ReadOnly)
}

/// Collects the relative paths of every file below `root`.
pub fn file_names_under(root: &Path) -> Vec<String> {
    let mut names = Vec::new();
    collect_files(root, root, &mut names);
    names.sort();
    names
}

fn collect_files(root: &Path, current: &Path, out: &mut Vec<String>) {
    if !current.exists() {
        return;
    }
    for entry in fs::read_dir(current).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else {
            let rel = path.strip_prefix(root).unwrap();
            out.push(
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            );
        }
    }
}
