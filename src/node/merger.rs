// src/node/merger.rs

//! Interior node: merges the output trees of an ordered list of inputs.
//!
//! Each build generation gets a fresh output directory
//! `scratch/<id>/<counter>`. The build itself is memoized as a
//! pending-or-resolved result on a `watch` channel: re-entrant `ready()`
//! calls subscribe to the same channel, so at most one build is ever in
//! flight per node. Invalidation takes the memo and signals the abort
//! channel, never mutating a resolved result in place.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::errors::BuildError;
use crate::merge::{CACHE_DIR, MergeOperation};
use crate::node::callbacks::{CallbackId, CallbackSet, WatchCallback};
use crate::node::{Node, NodeRef, WatchHandle, WatchNotice};
use crate::session::{NodeId, Session, uid};

type BuildResult = Result<PathBuf, BuildError>;

/// Memoized pending-or-resolved build for one generation.
struct BuildHandle {
    generation: u64,
    result_rx: watch::Receiver<Option<BuildResult>>,
    abort_tx: mpsc::UnboundedSender<BuildError>,
}

struct MergerState {
    /// Per-input readiness, gating rebuild-on-invalidate. All true initially.
    ready_states: Vec<bool>,
    /// Next generation to allocate; starts at 1.
    counter: u64,
    /// Most recently allocated generation; the one cleanup keeps.
    current: Option<u64>,
    build: Option<BuildHandle>,
    /// Whether input subscriptions are (being) established.
    watching: bool,
    subscriptions: Vec<WatchHandle>,
}

pub struct MergerNode {
    id: NodeId,
    inputs: Vec<NodeRef>,
    operation: Arc<dyn MergeOperation>,
    session: Arc<Session>,
    callbacks: Arc<CallbackSet>,
    state: Mutex<MergerState>,
}

impl MergerNode {
    pub fn new(
        inputs: Vec<NodeRef>,
        operation: Arc<dyn MergeOperation>,
        session: Arc<Session>,
    ) -> Arc<Self> {
        Self::with_id_prefix("merge", inputs, operation, session)
    }

    /// Like [`MergerNode::new`], with a custom human-readable id prefix.
    pub fn with_id_prefix(
        prefix: &str,
        inputs: Vec<NodeRef>,
        operation: Arc<dyn MergeOperation>,
        session: Arc<Session>,
    ) -> Arc<Self> {
        let ready_states = vec![true; inputs.len()];
        Arc::new(Self {
            id: uid(prefix),
            inputs,
            operation,
            session,
            callbacks: Arc::new(CallbackSet::new()),
            state: Mutex::new(MergerState {
                ready_states,
                counter: 1,
                current: None,
                build: None,
                watching: false,
                subscriptions: Vec::new(),
            }),
        })
    }

    pub fn inputs(&self) -> &[NodeRef] {
        &self.inputs
    }

    /// This node's private scratch area, holding numbered generation
    /// directories and the reserved `.cache` entry.
    pub fn scratch_dir(&self) -> PathBuf {
        self.session.scratch_dir(&self.id)
    }

    /// Return the memoized build's result channel, starting a new build (and
    /// generation) if the node is idle.
    fn subscribe_build(self: Arc<Self>) -> watch::Receiver<Option<BuildResult>> {
        let mut state = self.state.lock().unwrap();
        if let Some(build) = &state.build {
            return build.result_rx.clone();
        }

        let generation = state.counter;
        state.counter += 1;
        state.current = Some(generation);

        let (result_tx, result_rx) = watch::channel(None);
        let (abort_tx, abort_rx) = mpsc::unbounded_channel();
        state.build = Some(BuildHandle {
            generation,
            result_rx: result_rx.clone(),
            abort_tx,
        });
        drop(state);

        let outdir = self.scratch_dir().join(generation.to_string());
        debug!(node = %self.id, generation, outdir = %outdir.display(), "starting build");
        tokio::spawn(self.run_build(generation, outdir, result_tx, abort_rx));

        result_rx
    }

    async fn run_build(
        self: Arc<Self>,
        generation: u64,
        outdir: PathBuf,
        result_tx: watch::Sender<Option<BuildResult>>,
        mut abort_rx: mpsc::UnboundedReceiver<BuildError>,
    ) {
        // An abort always wins against the merge work: `biased` polls the
        // abort channel first, so a signalled abort is observed even when the
        // merge future completed in the same tick. The in-flight future is
        // dropped at its await point and a build never resolves from inputs
        // already known to be stale.
        let result = tokio::select! {
            biased;
            abort = abort_rx.recv() => {
                Err(abort.unwrap_or_else(|| BuildError::Aborted { node: self.id.clone() }))
            }
            res = self.build_into(&outdir) => res,
        };

        if let Err(err) = &result {
            // Clear the memo so the next ready() retries from scratch. An
            // abort already took the handle; only clear if this generation
            // still owns it.
            let mut state = self.state.lock().unwrap();
            if state
                .build
                .as_ref()
                .is_some_and(|build| build.generation == generation)
            {
                state.build = None;
            }
            drop(state);
            debug!(node = %self.id, generation, error = %err, "build did not complete");
        }

        let _ = result_tx.send(Some(result));
    }

    async fn build_into(&self, outdir: &Path) -> BuildResult {
        tokio::fs::create_dir_all(outdir)
            .await
            .map_err(|err| BuildError::io(outdir, &err))?;

        // Resolve inputs sequentially, in declaration order.
        let mut inputdirs = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let dir = input
                .clone()
                .ready()
                .await
                .map_err(|err| BuildError::Input {
                    node: input.id().clone(),
                    source: Box::new(err),
                })?;
            inputdirs.push(dir);
        }

        // Apply merges in the same order; later inputs win on conflicts.
        let start = Instant::now();
        for inputdir in &inputdirs {
            self.operation.merge(inputdir, outdir).await?;
        }

        info!(
            node = %self.id,
            inputs = self.inputs.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "build finished"
        );
        Ok(outdir.to_path_buf())
    }

    /// Force any in-flight or memoized build back to idle. In-flight work
    /// observes `err` through the abort channel; a resolved memo is simply
    /// discarded so the next `ready()` starts a new generation.
    fn abort(&self, err: BuildError) {
        let taken = self.state.lock().unwrap().build.take();
        if let Some(build) = taken {
            let _ = build.abort_tx.send(err);
        }
    }

    /// React to a notice from input `index` during watch mode.
    fn on_input_notice(self: Arc<Self>, index: usize, notice: WatchNotice) {
        match notice {
            WatchNotice::Failed(err) => {
                self.state.lock().unwrap().ready_states[index] = false;
                self.callbacks.relay(&WatchNotice::Failed(err));
                // Abort with the synthetic invalidation signal, not the
                // failure itself: the failure was just relayed, and an
                // aborted rebuild task swallows invalidation errors, so each
                // failure is announced exactly once.
                self.abort(BuildError::invalidated());
            }
            WatchNotice::Invalidated { changes, dir } => {
                // The input's directory itself is unchanged, so the input
                // stays ready; only work derived from its previous contents
                // is stale.
                self.callbacks.relay(&WatchNotice::Invalidated {
                    changes: changes.clone(),
                    dir,
                });
                self.abort(BuildError::Invalidated { changes });
                self.rebuild_if_all_ready(index);
            }
            WatchNotice::Ready(_) => {
                // The input produced a whole new generation; anything built
                // from its previous one is stale.
                self.abort(BuildError::invalidated());
                self.rebuild_if_all_ready(index);
            }
        }
    }

    /// Mark input `index` ready; once every input is ready, kick off a fresh
    /// build and relay its outcome. This gate makes a multi-input
    /// invalidation wave rebuild once, after all inputs have settled.
    fn rebuild_if_all_ready(self: Arc<Self>, index: usize) {
        let all_ready = {
            let mut state = self.state.lock().unwrap();
            state.ready_states[index] = true;
            state.ready_states.iter().all(|ready| *ready)
        };
        if !all_ready {
            return;
        }

        tokio::spawn(async move {
            match self.clone().ready().await {
                Ok(dir) => self.callbacks.relay(&WatchNotice::Ready(dir)),
                Err(err) if err.is_invalidation() => {
                    // Superseded by a newer wave, which relays its own result.
                    debug!(node = %self.id, "rebuild superseded");
                }
                Err(err) => self.callbacks.relay(&WatchNotice::Failed(err)),
            }
        });
    }
}

#[async_trait]
impl Node for MergerNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    async fn ready(self: Arc<Self>) -> BuildResult {
        let node_id = self.id.clone();
        let mut rx = self.subscribe_build();
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(BuildError::Aborted { node: node_id });
            }
        }
    }

    fn watch(self: Arc<Self>, callback: WatchCallback) -> WatchHandle {
        let id = self.callbacks.add(callback);

        // Deciding `watching` and installing the subscriptions must be one
        // critical section: a concurrent last-callback unwatch between the
        // two would tear down an empty list and leave late-stored handles
        // registered on the inputs forever.
        let mut state = self.state.lock().unwrap();
        if !state.watching {
            state.watching = true;
            // The upward capture is weak: parents own inputs via Arc, so
            // edges own only input -> output and the graph can be dropped.
            let mut subscriptions = Vec::with_capacity(self.inputs.len());
            for (index, input) in self.inputs.iter().enumerate() {
                let parent = Arc::downgrade(&self);
                let handle = input.clone().watch(Arc::new(move |notice| {
                    if let Some(node) = Weak::upgrade(&parent) {
                        node.on_input_notice(index, notice);
                    }
                }));
                subscriptions.push(handle);
            }
            state.subscriptions = subscriptions;
        }
        drop(state);

        WatchHandle::new(self.clone(), id)
    }

    fn unwatch(&self, id: CallbackId) {
        if self.callbacks.remove(id) {
            let subscriptions = {
                let mut state = self.state.lock().unwrap();
                state.watching = false;
                std::mem::take(&mut state.subscriptions)
            };
            for subscription in subscriptions {
                subscription.cancel();
            }
        }
    }

    fn find_creator(self: Arc<Self>, filename: &Path) -> Option<NodeRef> {
        // Most recently listed input wins ties.
        self.inputs
            .iter()
            .rev()
            .find_map(|input| input.clone().find_creator(filename))
    }

    async fn cleanup(&self) -> Result<(), BuildError> {
        let keep = {
            let state = self.state.lock().unwrap();
            state.current.map(|generation| generation.to_string())
        };
        let dir = self.scratch_dir();

        // Snapshot the listing synchronously so a generation allocated by a
        // concurrent build can never land in the delete set: anything newer
        // than `current` is not in the snapshot.
        let entries: Vec<std::ffi::OsString> = match std::fs::read_dir(&dir) {
            Ok(iter) => iter
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name())
                .collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(BuildError::io(&dir, &err)),
        };

        for name in entries {
            let name_str = name.to_string_lossy();
            if name_str == CACHE_DIR || Some(name_str.as_ref()) == keep.as_deref() {
                continue;
            }

            let path = dir.join(&name);
            let removal = if path.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match removal {
                Ok(()) => debug!(node = %self.id, path = %path.display(), "removed stale generation"),
                // Already gone; the listing was a snapshot.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(BuildError::io(&path, &err)),
            }
        }

        for input in &self.inputs {
            input.cleanup().await?;
        }
        Ok(())
    }
}
