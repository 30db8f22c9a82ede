#![allow(dead_code)]

//! Small helpers for laying out and inspecting file trees in tests.

use std::fs;
use std::path::Path;

/// Write `contents` to `root/rel`, creating parent directories as needed.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("creating parent dirs");
    }
    fs::write(&path, contents).expect("writing test file");
}

/// Lay out a whole tree of `(relative path, contents)` pairs under `root`.
pub fn tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        write_file(root, rel, contents);
    }
}

pub fn read_file(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).expect("reading test file")
}

/// All regular files under `root`, as sorted slash-separated relative paths.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    collect_files(root, root, &mut out);
    out.sort();
    out
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
}
