// src/node/mod.rs

//! The shared node contract.
//!
//! Every participant in the build graph implements [`Node`]: run-or-return
//! the memoized build (`ready`), register/cancel watch callbacks
//! (`watch`/`unwatch`), attribute a file to the leaf source that owns it
//! (`find_creator`), and retire stale generation directories (`cleanup`).
//!
//! Nodes are shared: one node may be an input to several mergers, so graph
//! edges are `NodeRef = Arc<dyn Node>` and always point input -> output.

pub mod callbacks;
pub mod merger;
pub mod source;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::BuildError;
use crate::session::NodeId;

pub use callbacks::{CallbackId, CallbackSet, WatchCallback};
pub use merger::MergerNode;
pub use source::SourceNode;

/// Shared reference to any node in the graph.
pub type NodeRef = Arc<dyn Node>;

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Modify,
    Remove,
}

/// One raw filesystem change, as summarized into an invalidation notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// One delivery on the watch channel. Exactly one meaning per invocation:
/// upstream files changed, a (re)build produced a directory, or a build
/// failed.
#[derive(Debug, Clone)]
pub enum WatchNotice {
    /// Files under a source directory changed; `dir` is the (unchanged)
    /// directory the changes belong to.
    Invalidated { changes: Vec<Change>, dir: PathBuf },
    /// A successful (re)build's output directory.
    Ready(PathBuf),
    /// A build failure.
    Failed(BuildError),
}

#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> &NodeId;

    /// Run (or return the memoized) build, resolving to this node's output
    /// directory for the current generation. Once resolved, the directory's
    /// contents are complete and self-consistent for that generation.
    ///
    /// A second call while a build is pending does not start a second build;
    /// it observes the first's outcome.
    async fn ready(self: Arc<Self>) -> Result<PathBuf, BuildError>;

    /// Register a callback for every subsequent invalidation, successful
    /// rebuild, or failure. Watching is demand-driven: the first registration
    /// acquires the underlying resources (filesystem watcher, subscriptions
    /// to inputs).
    fn watch(self: Arc<Self>, callback: WatchCallback) -> WatchHandle;

    /// Idempotent callback removal. Removing the last callback tears the
    /// underlying watch resources down.
    fn unwatch(&self, id: CallbackId);

    /// Diagnostic attribution: locate the leaf source node whose tree
    /// contains `filename`. Inputs are searched most-recently-listed first.
    /// Not used for build logic.
    fn find_creator(self: Arc<Self>, filename: &Path) -> Option<NodeRef>;

    /// Recursively remove stale per-generation output directories for this
    /// node and all of its inputs. The current generation and the reserved
    /// `.cache` entry are preserved.
    async fn cleanup(&self) -> Result<(), BuildError>;
}

/// Cancellation handle returned by [`Node::watch`]. `cancel()` removes
/// exactly the callback that produced it.
pub struct WatchHandle {
    node: NodeRef,
    id: CallbackId,
}

impl WatchHandle {
    pub fn new(node: NodeRef, id: CallbackId) -> Self {
        Self { node, id }
    }

    pub fn cancel(self) {
        self.node.unwatch(self.id);
    }
}
