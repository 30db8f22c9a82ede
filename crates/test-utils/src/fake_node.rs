//! A scriptable graph node for driving merger watch behaviour in tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use treedag::BuildError;
use treedag::node::callbacks::{CallbackId, CallbackSet, WatchCallback};
use treedag::node::{Change, Node, NodeRef, WatchHandle, WatchNotice};
use treedag::session::{NodeId, uid};

/// A fake input node with a fixed ready directory. Tests call the `emit_*`
/// methods to push notices at whatever subscribed to it.
pub struct FakeNode {
    id: NodeId,
    dir: PathBuf,
    callbacks: Arc<CallbackSet>,
}

impl FakeNode {
    pub fn new(dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            id: uid("fake"),
            dir: dir.into(),
            callbacks: Arc::new(CallbackSet::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of currently registered watch callbacks.
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    pub fn emit_ready(&self) {
        self.callbacks.relay(&WatchNotice::Ready(self.dir.clone()));
    }

    pub fn emit_invalidated(&self, changes: Vec<Change>) {
        self.callbacks.relay(&WatchNotice::Invalidated {
            changes,
            dir: self.dir.clone(),
        });
    }

    pub fn emit_failed(&self, err: BuildError) {
        self.callbacks.relay(&WatchNotice::Failed(err));
    }
}

#[async_trait]
impl Node for FakeNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    async fn ready(self: Arc<Self>) -> Result<PathBuf, BuildError> {
        Ok(self.dir.clone())
    }

    fn watch(self: Arc<Self>, callback: WatchCallback) -> WatchHandle {
        let id = self.callbacks.add(callback);
        WatchHandle::new(self.clone(), id)
    }

    fn unwatch(&self, id: CallbackId) {
        self.callbacks.remove(id);
    }

    fn find_creator(self: Arc<Self>, _filename: &Path) -> Option<NodeRef> {
        None
    }

    async fn cleanup(&self) -> Result<(), BuildError> {
        Ok(())
    }
}
