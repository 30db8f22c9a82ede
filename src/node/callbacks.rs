// src/node/callbacks.rs

//! Watch-callback bookkeeping shared by all node types.
//!
//! Callbacks are identified by a [`CallbackId`] handed out at registration;
//! ids stand in for function identity, which closures do not have.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::WatchNotice;

/// A registered watch callback. Invoked synchronously on the task that
/// produced the notice; long-running consumers should hand the notice off to
/// their own channel.
pub type WatchCallback = Arc<dyn Fn(WatchNotice) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackId(u64);

/// Id-keyed callback list. The callback-list length doubles as the reference
/// count for the node's underlying watch resources.
#[derive(Default)]
pub struct CallbackSet {
    entries: Mutex<Vec<(CallbackId, WatchCallback)>>,
    next_id: AtomicU64,
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: WatchCallback) -> CallbackId {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().unwrap().push((id, callback));
        id
    }

    /// Idempotent removal. Returns true when an entry was removed and the
    /// set is now empty, i.e. when the caller should release the node's
    /// watch resources.
    pub fn remove(&self, id: CallbackId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before && entries.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Deliver `notice` to every registered callback. The list is snapshot
    /// first so a callback may register or cancel without deadlocking.
    pub fn relay(&self, notice: &WatchNotice) {
        let snapshot: Vec<WatchCallback> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in snapshot {
            callback(notice.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_callback(hits: Arc<AtomicUsize>) -> WatchCallback {
        Arc::new(move |_notice| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn relay_reaches_every_registered_callback() {
        let set = CallbackSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        set.add(counting_callback(Arc::clone(&hits)));
        set.add(counting_callback(Arc::clone(&hits)));

        set.relay(&WatchNotice::Ready(PathBuf::from("/tmp/out/1")));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_is_idempotent_and_reports_emptiness_once() {
        let set = CallbackSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let a = set.add(counting_callback(Arc::clone(&hits)));
        let b = set.add(counting_callback(Arc::clone(&hits)));

        assert!(!set.remove(a));
        assert!(!set.remove(a)); // already gone
        assert!(set.remove(b)); // last one out
        assert!(set.is_empty());
    }

    #[test]
    fn cancelled_callbacks_stop_firing() {
        let set = CallbackSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let id = set.add(counting_callback(Arc::clone(&hits)));
        set.relay(&WatchNotice::Ready(PathBuf::from("/tmp/out/1")));
        set.remove(id);
        set.relay(&WatchNotice::Ready(PathBuf::from("/tmp/out/2")));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
