// src/node/source.rs

//! Leaf node wrapping a source directory.
//!
//! A source's "build" is trivial: its directory is its output. The
//! interesting part is watch mode, where raw filesystem events are debounced
//! into one invalidation notice per burst.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::BuildError;
use crate::node::callbacks::{CallbackId, CallbackSet, WatchCallback};
use crate::node::{Node, NodeRef, WatchHandle, WatchNotice};
use crate::session::{NodeId, uid};
use crate::watch::summary::summarise_changes;
use crate::watch::watcher::{DirWatcher, log_watcher_error};
use crate::watch::DEBOUNCE_WINDOW;

pub struct SourceNode {
    id: NodeId,
    dir: PathBuf,
    is_static: bool,
    debounce: Duration,
    callbacks: Arc<CallbackSet>,
    watcher: Mutex<Option<DirWatcher>>,
}

impl SourceNode {
    pub fn new(dir: impl Into<PathBuf>) -> Arc<Self> {
        Self::build(dir, false, DEBOUNCE_WINDOW)
    }

    /// A static source never watches its directory, even in watch mode.
    pub fn new_static(dir: impl Into<PathBuf>) -> Arc<Self> {
        Self::build(dir, true, DEBOUNCE_WINDOW)
    }

    /// Override the debounce window (useful for tests driving real bursts).
    pub fn with_debounce(dir: impl Into<PathBuf>, window: Duration) -> Arc<Self> {
        Self::build(dir, false, window)
    }

    fn build(dir: impl Into<PathBuf>, is_static: bool, debounce: Duration) -> Arc<Self> {
        let dir = dir.into();
        let dir = std::path::absolute(&dir).unwrap_or(dir);

        // Advisory existence check, a single synchronous stat so it runs
        // with or without a runtime: the directory may legitimately be
        // created after the node, so a missing dir warns instead of failing.
        if std::fs::metadata(&dir).is_err() {
            warn!(dir = %dir.display(), "source directory does not exist");
        }

        Arc::new(Self {
            id: uid("source"),
            dir,
            is_static,
            debounce,
            callbacks: Arc::new(CallbackSet::new()),
            watcher: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a live watch session is currently open.
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().unwrap().is_some()
    }

    fn start_watcher(&self) {
        let mut guard = self.watcher.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let callbacks = Arc::clone(&self.callbacks);
        let dir = self.dir.clone();
        let flush = Arc::new(move |changes: Vec<crate::node::Change>| {
            info!(dir = %dir.display(), "{}", summarise_changes(&changes));
            callbacks.relay(&WatchNotice::Invalidated {
                changes,
                dir: dir.clone(),
            });
        });

        match DirWatcher::spawn(self.dir.clone(), self.debounce, flush) {
            Ok(watcher) => *guard = Some(watcher),
            // A broken watcher is not a build failure; watching stalls until
            // resources free up.
            Err(err) => log_watcher_error(&self.dir, &err),
        }
    }
}

#[async_trait]
impl Node for SourceNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    async fn ready(self: Arc<Self>) -> Result<PathBuf, BuildError> {
        Ok(self.dir.clone())
    }

    fn watch(self: Arc<Self>, callback: WatchCallback) -> WatchHandle {
        let id = self.callbacks.add(callback);

        if !self.is_static {
            self.start_watcher();
        }

        WatchHandle::new(self.clone(), id)
    }

    fn unwatch(&self, id: CallbackId) {
        if self.callbacks.remove(id) {
            if let Some(watcher) = self.watcher.lock().unwrap().take() {
                watcher.close();
            }
        }
    }

    fn find_creator(self: Arc<Self>, filename: &Path) -> Option<NodeRef> {
        // Disk existence, not directory membership: the original contract is
        // a stat check, tolerating files that live in another source's tree.
        if filename.exists() {
            Some(self)
        } else {
            None
        }
    }

    async fn cleanup(&self) -> Result<(), BuildError> {
        // Sources own no generated artifacts.
        Ok(())
    }
}
