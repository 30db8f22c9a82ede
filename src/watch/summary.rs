// src/watch/summary.rs

//! Human-readable one-line summaries of change bursts for the info log.

use crate::node::{Change, ChangeKind};

/// Summarize a burst, e.g. `"2 files added, 1 file changed"`.
pub fn summarise_changes(changes: &[Change]) -> String {
    let mut added = 0usize;
    let mut modified = 0usize;
    let mut removed = 0usize;

    for change in changes {
        match change.kind {
            ChangeKind::Add => added += 1,
            ChangeKind::Modify => modified += 1,
            ChangeKind::Remove => removed += 1,
        }
    }

    let mut report = Vec::new();
    if added > 0 {
        report.push(format!("{added} {} added", files(added)));
    }
    if modified > 0 {
        report.push(format!("{modified} {} changed", files(modified)));
    }
    if removed > 0 {
        report.push(format!("{removed} {} removed", files(removed)));
    }

    if report.is_empty() {
        "no changes".to_string()
    } else {
        report.join(", ")
    }
}

fn files(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn change(kind: ChangeKind, path: &str) -> Change {
        Change {
            kind,
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn mixed_burst_reports_each_kind_once() {
        let changes = vec![
            change(ChangeKind::Add, "a.txt"),
            change(ChangeKind::Add, "b.txt"),
            change(ChangeKind::Modify, "c.txt"),
            change(ChangeKind::Remove, "d.txt"),
        ];

        assert_eq!(
            summarise_changes(&changes),
            "2 files added, 1 file changed, 1 file removed"
        );
    }

    #[test]
    fn singular_and_empty_forms() {
        assert_eq!(
            summarise_changes(&[change(ChangeKind::Add, "a.txt")]),
            "1 file added"
        );
        assert_eq!(summarise_changes(&[]), "no changes");
    }
}
