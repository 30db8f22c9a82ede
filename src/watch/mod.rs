// src/watch/mod.rs

//! Debounced filesystem watching for source nodes.
//!
//! Raw `notify` events arrive in bursts (a bulk copy emits one event per
//! file); each burst should trigger exactly one downstream rebuild. The
//! watcher forwards mapped changes into [`debounce::run`], which flushes one
//! batched invalidation per quiescent window.
//!
//! This module knows nothing about the graph; it only turns filesystem
//! events into change batches.

pub mod debounce;
pub mod summary;
pub mod watcher;

pub use debounce::DEBOUNCE_WINDOW;
pub use summary::summarise_changes;
pub use watcher::{DirWatcher, FlushSink};
