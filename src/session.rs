// src/session.rs

//! Build session: the scratch-space root under which every merger allocates
//! its per-generation output directories, plus node id allocation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Globally unique, human-readable node identity: a caller-supplied prefix
/// plus a process-wide sequential suffix, e.g. `merge-3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh [`NodeId`] with the given prefix.
pub fn uid(prefix: &str) -> NodeId {
    NodeId(format!("{prefix}-{}", NEXT_UID.fetch_add(1, Ordering::Relaxed)))
}

/// Shared configuration for one build graph. Mergers key their private
/// scratch areas under `scratch_root` by node id; a node's scratch dir holds
/// numbered generation directories plus the long-lived `.cache` entry
/// reserved for the merge operation.
#[derive(Debug)]
pub struct Session {
    scratch_root: PathBuf,
}

impl Session {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Arc<Self> {
        let scratch_root = scratch_root.into();
        let scratch_root = std::path::absolute(&scratch_root).unwrap_or(scratch_root);
        Arc::new(Self { scratch_root })
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Private scratch area for one node.
    pub fn scratch_dir(&self, id: &NodeId) -> PathBuf {
        self.scratch_root.join(id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uids_are_unique_and_keep_their_prefix() {
        let a = uid("merge");
        let b = uid("merge");

        assert_ne!(a, b);
        assert!(a.as_str().starts_with("merge-"));
    }

    #[test]
    fn scratch_dirs_are_keyed_by_node_id() {
        let session = Session::new("/tmp/treedag-scratch");
        let id = uid("merge");

        assert_eq!(
            session.scratch_dir(&id),
            Path::new("/tmp/treedag-scratch").join(id.as_str())
        );
    }
}
