use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::{mpsc, oneshot};
use treedag::node::{Change, ChangeKind};
use treedag::{BuildError, DirMerge, MergeOperation, MergerNode, Node, NodeRef, Session, WatchNotice};
use treedag_test_utils::{FakeNode, SlowMerge, init_tracing, read_file, tree, with_timeout};

#[tokio::test]
async fn input_invalidation_aborts_the_inflight_build() {
    init_tracing();
    let tmp = tempdir().expect("tempdir");
    let src = tmp.path().join("src");
    tree(&src, &[("x.txt", "v1")]);

    let session = Session::new(tmp.path().join("scratch"));
    let input = FakeNode::new(&src);
    let inputs: Vec<NodeRef> = vec![input.clone()];
    let merger = MergerNode::new(inputs, SlowMerge::new(Duration::from_millis(400)), session);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = merger.clone().watch(Arc::new(move |notice: WatchNotice| {
        let _ = tx.send(notice);
    }));

    let pending = tokio::spawn(merger.clone().ready());

    // Let the slow merge get underway, then invalidate beneath it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    tree(&src, &[("x.txt", "v2")]);
    input.emit_invalidated(vec![Change {
        kind: ChangeKind::Modify,
        path: src.join("x.txt"),
    }]);

    // The pending build must fail with the invalidation signal; it may
    // never fulfil with a directory derived from the stale input.
    let err = with_timeout(pending)
        .await
        .expect("join")
        .expect_err("aborted build must not resolve");
    assert_eq!(err.code(), "BUILD_INVALIDATED");

    // The watch channel sees the relayed invalidation, then the rebuild's
    // fresh generation; generation 1 is never announced.
    let mut ready_dirs: Vec<PathBuf> = Vec::new();
    loop {
        match with_timeout(rx.recv()).await.expect("notice stream open") {
            WatchNotice::Invalidated { .. } => continue,
            WatchNotice::Ready(dir) => {
                ready_dirs.push(dir);
                break;
            }
            WatchNotice::Failed(err) => panic!("unexpected failure: {err}"),
        }
    }

    assert_eq!(ready_dirs, vec![merger.scratch_dir().join("2")]);
    assert_eq!(read_file(&ready_dirs[0], "x.txt"), "v2");
}

/// Delegates to [`DirMerge`], then parks on a one-shot gate the first time
/// through; later merges pass straight through. Lets a test line up the
/// merge's completion and an abort in the same scheduler tick.
struct GatedMerge {
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    inner: DirMerge,
}

#[async_trait]
impl MergeOperation for GatedMerge {
    async fn merge(&self, input: &Path, output: &Path) -> Result<(), BuildError> {
        self.inner.merge(input, output).await?;
        let gate = self.gate.lock().unwrap().take();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn a_signalled_abort_beats_a_simultaneously_completed_merge() {
    init_tracing();
    let tmp = tempdir().expect("tempdir");
    let src = tmp.path().join("src");
    tree(&src, &[("x.txt", "v1")]);

    let session = Session::new(tmp.path().join("scratch"));
    let input = FakeNode::new(&src);
    let (gate_tx, gate_rx) = oneshot::channel();
    let operation = Arc::new(GatedMerge {
        gate: Mutex::new(Some(gate_rx)),
        inner: DirMerge,
    });
    let inputs: Vec<NodeRef> = vec![input.clone()];
    let merger = MergerNode::new(inputs, operation, session);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = merger.clone().watch(Arc::new(move |notice: WatchNotice| {
        let _ = tx.send(notice);
    }));

    let pending = tokio::spawn(merger.clone().ready());
    // Let the merge finish its work and park on the gate.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Queue the abort and the merge completion without yielding in between:
    // when the build task is next polled, both are ready, and the abort must
    // win. Generation 1 is never published even though it was fully written.
    input.emit_invalidated(Vec::new());
    let _ = gate_tx.send(());

    let err = with_timeout(pending)
        .await
        .expect("join")
        .expect_err("completed-but-stale build must not resolve");
    assert_eq!(err.code(), "BUILD_INVALIDATED");

    // The rebuild announces a fresh generation instead.
    loop {
        match with_timeout(rx.recv()).await.expect("notice stream open") {
            WatchNotice::Invalidated { .. } => continue,
            WatchNotice::Ready(dir) => {
                assert_eq!(dir, merger.scratch_dir().join("2"));
                break;
            }
            WatchNotice::Failed(err) => panic!("unexpected failure: {err}"),
        }
    }
}

#[tokio::test]
async fn aborted_node_recovers_on_the_next_ready_call() {
    init_tracing();
    let tmp = tempdir().expect("tempdir");
    let src = tmp.path().join("src");
    tree(&src, &[("x.txt", "v1")]);

    let session = Session::new(tmp.path().join("scratch"));
    let input = FakeNode::new(&src);
    let inputs: Vec<NodeRef> = vec![input.clone()];
    let merger = MergerNode::new(inputs, SlowMerge::new(Duration::from_millis(300)), session);

    // No watch mode here: drive the abort while a one-shot build runs.
    let pending = tokio::spawn(merger.clone().ready());
    tokio::time::sleep(Duration::from_millis(50)).await;
    input.emit_invalidated(Vec::new());

    // Without a watcher there is nothing subscribed to the input, so the
    // build keeps running; this emit reaches nobody. The build completes.
    let out = with_timeout(pending)
        .await
        .expect("join")
        .expect("unwatched build is undisturbed");
    assert_eq!(out, merger.scratch_dir().join("1"));
}
