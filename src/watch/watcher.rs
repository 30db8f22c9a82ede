// src/watch/watcher.rs

//! `notify` wiring: a recursive watcher over one source directory.
//!
//! The notify callback runs on the watcher's own thread; it maps events to
//! [`Change`]s and forwards them over an unbounded channel into the async
//! debouncer. Watcher errors never reach the build/callback error channel;
//! a broken watcher is not a build failure, so they are only logged.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::node::{Change, ChangeKind};
use crate::watch::debounce;

/// Sink invoked with each flushed (debounced) batch of changes.
pub type FlushSink = Arc<dyn Fn(Vec<Change>) + Send + Sync>;

/// A live watch session over one directory. Keeps the underlying
/// `RecommendedWatcher` alive; [`DirWatcher::close`] (or drop) releases it
/// and cancels any pending debounce flush.
pub struct DirWatcher {
    _inner: RecommendedWatcher,
    debouncer: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for DirWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirWatcher").finish()
    }
}

impl DirWatcher {
    /// Start watching `dir` recursively, delivering one debounced batch per
    /// quiescent burst to `on_flush`.
    pub fn spawn(dir: PathBuf, window: Duration, on_flush: FlushSink) -> notify::Result<Self> {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel::<Vec<Change>>();

        let mut inner = RecommendedWatcher::new(
            {
                let dir = dir.clone();
                move |res: notify::Result<Event>| match res {
                    Ok(event) => {
                        let changes = changes_from_event(&event);
                        if !changes.is_empty() {
                            let _ = changes_tx.send(changes);
                        }
                    }
                    Err(err) => log_watcher_error(&dir, &err),
                }
            },
            Config::default(),
        )?;
        inner.watch(&dir, RecursiveMode::Recursive)?;
        debug!(dir = %dir.display(), "file watcher started");

        let debouncer = tokio::spawn(debounce::run(changes_rx, window, on_flush));

        Ok(Self {
            _inner: inner,
            debouncer,
        })
    }

    /// Stop watching. Pending (unflushed) changes are discarded; a fresh
    /// watch session starts clean.
    pub fn close(self) {
        self.debouncer.abort();
        // RecommendedWatcher releases its handles on drop.
    }
}

impl Drop for DirWatcher {
    fn drop(&mut self) {
        self.debouncer.abort();
    }
}

/// Map one notify event to the changes it describes. Access-only and
/// unclassified events carry no tree mutation and are dropped.
pub(crate) fn changes_from_event(event: &Event) -> Vec<Change> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Add,
        EventKind::Modify(_) => ChangeKind::Modify,
        EventKind::Remove(_) => ChangeKind::Remove,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| Change {
            kind,
            path: path.clone(),
        })
        .collect()
}

/// Watcher failure policy: handle exhaustion gets an actionable hint,
/// everything else is reported with path and message.
pub(crate) fn log_watcher_error(dir: &Path, err: &notify::Error) {
    // EMFILE: errno 24 on the platforms notify supports.
    let handle_exhaustion = match &err.kind {
        notify::ErrorKind::MaxFilesWatch => true,
        notify::ErrorKind::Io(io) => io.raw_os_error() == Some(24),
        _ => false,
    };

    if handle_exhaustion {
        error!(
            dir = %dir.display(),
            "too many open file handles (EMFILE); consider raising the limit, e.g. `ulimit -n 1024`"
        );
    } else {
        error!(dir = %dir.display(), error = %err, "error while watching directory");
    }
}
