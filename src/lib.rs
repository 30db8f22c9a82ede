// src/lib.rs

//! `treedag` — an incremental file-tree build graph.
//!
//! The graph is a DAG of nodes, each producing a directory of files:
//!
//! - [`SourceNode`] is a leaf wrapping a source directory. In watch mode it
//!   debounces raw filesystem events into one invalidation notice per burst.
//! - [`MergerNode`] is an interior node holding an ordered list of inputs.
//!   Its build resolves every input's output directory (in declaration
//!   order), then applies a [`MergeOperation`] per input into a freshly
//!   allocated per-generation output directory. Later inputs win on
//!   conflicting paths.
//!
//! `ready()` runs one build to completion and memoizes the result;
//! `watch(callback)` delivers a stream of invalidation/ready/failure notices
//! and rebuilds incrementally as upstream directories change. In-flight
//! builds are aborted as soon as any input is known to be stale.
//!
//! ```no_run
//! use std::sync::Arc;
//! use treedag::{DirMerge, MergerNode, Node, NodeRef, Session, SourceNode};
//!
//! # async fn demo() -> Result<(), treedag::BuildError> {
//! let session = Session::new(".treedag");
//! let inputs: Vec<NodeRef> = vec![SourceNode::new("assets"), SourceNode::new("overrides")];
//!
//! let site = MergerNode::new(inputs, Arc::new(DirMerge), session);
//!
//! // `overrides` wins on conflicting paths.
//! let outdir = site.ready().await?;
//! println!("built into {}", outdir.display());
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod logging;
pub mod merge;
pub mod node;
pub mod session;
pub mod watch;

pub use errors::BuildError;
pub use merge::{DirMerge, MergeOperation};
pub use node::{
    Change, ChangeKind, MergerNode, Node, NodeRef, SourceNode, WatchHandle, WatchNotice,
};
pub use session::{NodeId, Session};
