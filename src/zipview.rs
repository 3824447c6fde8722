//! # Zip Content Indexer
//!
//! Enumerates a zip's entries without expanding them to disk: a full
//! hierarchical tree, the immediate children of one in-archive directory,
//! or the bytes of a single entry streamed to a caller-supplied writer.
//!
//! Entry names are normalized to `/` separators before any comparison.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::codec::open_source;
use crate::error::OpError;

/// One node of the entry tree. The root is a directory named `/`; children
/// are keyed by name, and `size` is meaningful only for files.
#[derive(Debug, Serialize)]
pub struct EntryNode {
    pub name: String,
    #[serde(rename = "isDir")]
    pub is_dir: bool,
    pub size: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, EntryNode>,
}

impl EntryNode {
    fn directory(name: &str) -> Self {
        EntryNode {
            name: name.to_string(),
            is_dir: true,
            size: 0,
            children: BTreeMap::new(),
        }
    }

    fn file(name: &str, size: u64) -> Self {
        EntryNode {
            name: name.to_string(),
            is_dir: false,
            size,
            children: BTreeMap::new(),
        }
    }
}

fn normalize_entry_name(name: &str) -> String {
    name.replace('\\', "/")
}

/// Inserting an already-present segment sequence updates nothing; the first
/// sighting of a segment decides whether it is a file or a directory.
fn insert_entry(root: &mut EntryNode, name: &str, entry_is_dir: bool, size: u64) {
    let parts: Vec<&str> = name.split('/').collect();
    let last = parts.len() - 1;
    let mut current = root;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        let is_last = i == last;
        let is_dir = !is_last || entry_is_dir;
        current = current
            .children
            .entry((*part).to_string())
            .or_insert_with(|| {
                if is_dir {
                    EntryNode::directory(part)
                } else {
                    EntryNode::file(part, size)
                }
            });
    }
}

/// Builds the full entry tree of the zip at `rpath`.
pub fn build_tree(rpath: &Path) -> Result<EntryNode, OpError> {
    let file = open_source(rpath)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut root = EntryNode::directory("/");
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = normalize_entry_name(entry.name());
        insert_entry(&mut root, &name, entry.is_dir(), entry.size());
    }
    Ok(root)
}

/// Lists the immediate children of `dir` inside the zip at `rpath`, in
/// archive order, each name appearing once. Directories get a trailing `/`.
///
/// The root (empty `dir`) always exists, even for an empty archive; any
/// other directory that matches no entry is `NotFound`.
pub fn list_dir(rpath: &Path, dir: &str) -> Result<Vec<String>, OpError> {
    let file = open_source(rpath)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut target = normalize_entry_name(dir.trim_start_matches('/'));
    if !target.is_empty() && !target.ends_with('/') {
        target.push('/');
    }

    let mut listing: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut dir_exists = target.is_empty();

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = normalize_entry_name(entry.name());

        if target.is_empty() {
            let parts: Vec<&str> = name.split('/').collect();
            let item = parts[0];
            if !item.is_empty() && seen.insert(item.to_string()) {
                if parts.len() > 1 || entry.is_dir() {
                    listing.push(format!("{item}/"));
                } else {
                    listing.push(item.to_string());
                }
            }
        } else if let Some(rel) = name.strip_prefix(target.as_str()) {
            dir_exists = true;
            if rel.is_empty() {
                continue;
            }
            let parts: Vec<&str> = rel.split('/').collect();
            let item = parts[0];
            if !item.is_empty() && seen.insert(item.to_string()) {
                if parts.len() > 1 || rel.ends_with('/') {
                    listing.push(format!("{item}/"));
                } else {
                    listing.push(item.to_string());
                }
            }
        }
    }

    if !target.is_empty() && !dir_exists {
        return Err(OpError::NotFound(format!(
            "directory '{dir}' not present in archive"
        )));
    }
    Ok(listing)
}

/// Streams the bytes of the entry whose normalized name equals `entry_name`
/// into `out`, returning the byte count. The first matching entry wins;
/// absence is `NotFound`.
pub fn extract_entry(rpath: &Path, entry_name: &str, out: &mut dyn Write) -> Result<u64, OpError> {
    let file = open_source(rpath)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let wanted = normalize_entry_name(entry_name);
    let mut found = None;
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if normalize_entry_name(entry.name()) == wanted {
            found = Some(i);
            break;
        }
    }
    let Some(index) = found else {
        return Err(OpError::NotFound(format!(
            "entry '{entry_name}' not present in archive"
        )));
    };

    let mut entry = archive.by_index(index)?;
    let copied = io::copy(&mut entry, out).map_err(|e| OpError::io(e, rpath))?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::PathBuf;
    use zip::write::FileOptions;

    /// Writes a zip with entries `docs/a.txt` (10 bytes) and
    /// `docs/sub/b.txt` (5 bytes).
    fn sample_zip(dir: &Path) -> PathBuf {
        let path = dir.join("a.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = FileOptions::default();
        writer.start_file("docs/a.txt", options).unwrap();
        writer.write_all(b"0123456789").unwrap();
        writer.start_file("docs/sub/b.txt", options).unwrap();
        writer.write_all(b"01234").unwrap();
        writer.finish().unwrap();
        path
    }

    fn empty_zip(dir: &Path) -> PathBuf {
        let path = dir.join("empty.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer.finish().unwrap();
        path
    }

    #[test]
    fn tree_mirrors_entry_paths() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = sample_zip(dir.path());

        let root = build_tree(&zip_path).unwrap();
        assert_eq!(root.name, "/");
        assert!(root.is_dir);

        let docs = &root.children["docs"];
        assert!(docs.is_dir);
        let a = &docs.children["a.txt"];
        assert!(!a.is_dir);
        assert_eq!(a.size, 10);
        let sub = &docs.children["sub"];
        assert!(sub.is_dir);
        let b = &sub.children["b.txt"];
        assert!(!b.is_dir);
        assert_eq!(b.size, 5);
    }

    #[test]
    fn tree_serializes_with_wire_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = sample_zip(dir.path());

        let root = build_tree(&zip_path).unwrap();
        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json["isDir"], true);
        assert_eq!(json["children"]["docs"]["children"]["a.txt"]["size"], 10);
        // leaf files carry no children key at all
        assert!(json["children"]["docs"]["children"]["a.txt"]
            .get("children")
            .is_none());
    }

    #[test]
    fn listing_walks_one_level_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = sample_zip(dir.path());

        assert_eq!(list_dir(&zip_path, "").unwrap(), vec!["docs/"]);
        assert_eq!(
            list_dir(&zip_path, "docs").unwrap(),
            vec!["a.txt", "sub/"]
        );
        assert_eq!(list_dir(&zip_path, "docs/sub").unwrap(), vec!["b.txt"]);
        // trailing slash and leading slash are both tolerated
        assert_eq!(list_dir(&zip_path, "/docs/").unwrap(), vec!["a.txt", "sub/"]);
    }

    #[test]
    fn listing_missing_directory_fails_but_root_always_exists() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = sample_zip(dir.path());
        assert!(matches!(
            list_dir(&zip_path, "missing"),
            Err(OpError::NotFound(_))
        ));

        let empty = empty_zip(dir.path());
        assert_eq!(list_dir(&empty, "").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn extracts_one_entry_by_normalized_name() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = sample_zip(dir.path());

        let mut bytes = Vec::new();
        let n = extract_entry(&zip_path, "docs/sub/b.txt", &mut bytes).unwrap();
        assert_eq!(n, 5);
        assert_eq!(bytes, b"01234");

        // backslash input normalizes to the same entry
        let mut again = Vec::new();
        extract_entry(&zip_path, "docs\\sub\\b.txt", &mut again).unwrap();
        assert_eq!(again, b"01234");

        let mut sink = Vec::new();
        assert!(matches!(
            extract_entry(&zip_path, "docs/ghost.txt", &mut sink),
            Err(OpError::NotFound(_))
        ));
    }
}
