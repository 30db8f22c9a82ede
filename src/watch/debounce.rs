// src/watch/debounce.rs

//! Burst batching for raw change events.
//!
//! Buffers incoming changes and flushes them as one batch once the stream
//! has been quiet for the configured window. The window resets on every new
//! event, so a bulk copy of N files yields one flush covering all N.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::trace;

use crate::node::Change;
use crate::watch::watcher::FlushSink;

/// Quiescence window after which a buffered burst is flushed.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Consume change batches from `rx` and flush them to `on_flush` once the
/// stream has been quiet for `window`. Runs until the sender side closes; a
/// still-buffered burst is flushed on shutdown so no change is dropped.
pub async fn run(mut rx: UnboundedReceiver<Vec<Change>>, window: Duration, on_flush: FlushSink) {
    let mut buffered: Vec<Change> = Vec::new();

    loop {
        if buffered.is_empty() {
            match rx.recv().await {
                Some(changes) => buffered.extend(changes),
                None => return,
            }
        } else {
            // Re-armed on every iteration, so the deadline moves with each
            // new event.
            tokio::select! {
                more = rx.recv() => match more {
                    Some(changes) => {
                        trace!(buffered = buffered.len(), "debounce window reset");
                        buffered.extend(changes);
                    }
                    None => {
                        on_flush(std::mem::take(&mut buffered));
                        return;
                    }
                },
                _ = tokio::time::sleep(window) => {
                    on_flush(std::mem::take(&mut buffered));
                }
            }
        }
    }
}
