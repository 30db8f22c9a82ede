// src/errors.rs

//! Structured build errors shared across the node graph.
//!
//! Every variant is `Clone`: a build result fans out to all registered watch
//! callbacks as well as every concurrent `ready()` caller, so I/O errors are
//! captured as `{path, message}` rather than wrapping `std::io::Error`.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::node::Change;
use crate::session::NodeId;

#[derive(Error, Debug, Clone)]
pub enum BuildError {
    /// Synthetic signal carried on the error channel to force abort of
    /// in-flight work when an upstream directory changes. Not a genuine
    /// failure; consumers can tell it apart via [`BuildError::code`] or
    /// [`BuildError::is_invalidation`].
    #[error("build invalidated by upstream change ({} raw changes)", changes.len())]
    Invalidated { changes: Vec<Change> },

    #[error("I/O error at {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("merge failed at {}: {message}", path.display())]
    Merge { path: PathBuf, message: String },

    /// An input node's `ready()` rejection, wrapped so the failing node is
    /// attributed in the chain above it.
    #[error("input {node} failed: {source}")]
    Input {
        node: NodeId,
        #[source]
        source: Box<BuildError>,
    },

    /// The build's result channel was torn down before a result was
    /// produced (the owning graph was discarded mid-build).
    #[error("build of {node} was aborted")]
    Aborted { node: NodeId },
}

impl BuildError {
    pub fn io(path: impl AsRef<Path>, err: &std::io::Error) -> Self {
        BuildError::Io {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn merge(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        BuildError::Merge {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// An invalidation signal with no change detail (used when aborting a
    /// build because an input produced a whole new output directory).
    pub fn invalidated() -> Self {
        BuildError::Invalidated {
            changes: Vec::new(),
        }
    }

    /// Stable machine-readable code for downstream filtering.
    pub fn code(&self) -> &'static str {
        match self {
            BuildError::Invalidated { .. } => "BUILD_INVALIDATED",
            BuildError::Io { .. } => "EIO",
            BuildError::Merge { .. } => "EMERGE",
            BuildError::Input { .. } => "EINPUT",
            BuildError::Aborted { .. } => "EABORTED",
        }
    }

    pub fn is_invalidation(&self) -> bool {
        matches!(self, BuildError::Invalidated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_distinguish_invalidation_from_failure() {
        let inv = BuildError::invalidated();
        let merge = BuildError::merge("/tmp/out", "conflicting file kinds");

        assert_eq!(inv.code(), "BUILD_INVALIDATED");
        assert!(inv.is_invalidation());
        assert_eq!(merge.code(), "EMERGE");
        assert!(!merge.is_invalidation());
    }

    #[test]
    fn input_errors_keep_the_underlying_code_reachable() {
        let inner = BuildError::merge("/tmp/out/a.txt", "permission denied");
        let wrapped = BuildError::Input {
            node: crate::session::uid("merge"),
            source: Box::new(inner),
        };

        assert_eq!(wrapped.code(), "EINPUT");
        match wrapped {
            BuildError::Input { source, .. } => assert_eq!(source.code(), "EMERGE"),
            _ => unreachable!(),
        }
    }
}
