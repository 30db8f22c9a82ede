// src/merge/mod.rs

//! The merge-operation collaborator.
//!
//! A merger treats the per-file algorithm as a black box: given an input
//! directory, merge its contents into an accumulating output directory,
//! resolving on completion or rejecting with a structured error. The crate
//! ships [`DirMerge`] as the default; transform-style operations plug in the
//! same way.

pub mod dir_merge;

use std::path::Path;

use async_trait::async_trait;

use crate::errors::BuildError;

pub use dir_merge::DirMerge;

/// Name of the entry inside a node's scratch directory reserved for the
/// merge operation's own incremental state. Never removed by cleanup; it
/// must survive across generations.
pub const CACHE_DIR: &str = ".cache";

#[async_trait]
pub trait MergeOperation: Send + Sync {
    /// Merge the contents of `input` into `output`. Called once per input,
    /// in declaration order, against the same accumulating `output`; a later
    /// call may overwrite files an earlier call produced.
    async fn merge(&self, input: &Path, output: &Path) -> Result<(), BuildError>;
}
