use std::sync::Arc;

use tempfile::tempdir;
use treedag::{DirMerge, MergerNode, Node, NodeRef, Session, SourceNode};
use treedag_test_utils::{init_tracing, tree};

#[tokio::test]
async fn existing_files_are_attributed_to_a_source() {
    init_tracing();
    let tmp = tempdir().expect("tempdir");
    let a = tmp.path().join("a");
    let b = tmp.path().join("b");
    tree(&a, &[("x.txt", "a")]);
    tree(&b, &[("y.txt", "b")]);

    let session = Session::new(tmp.path().join("scratch"));
    let source_a = SourceNode::new(&a);
    let source_b = SourceNode::new(&b);
    let inputs: Vec<NodeRef> = vec![source_a.clone(), source_b.clone()];
    let merger = MergerNode::new(inputs, Arc::new(DirMerge), session);

    // The check is a disk stat, searched most-recently-listed input first,
    // so any existing file is claimed by the last input.
    let creator = merger
        .clone()
        .find_creator(&b.join("y.txt"))
        .expect("existing file has a creator");
    assert_eq!(creator.id(), source_b.id());

    assert!(
        merger
            .clone()
            .find_creator(&b.join("missing.txt"))
            .is_none()
    );
}

#[tokio::test]
async fn attribution_recurses_through_nested_mergers() {
    init_tracing();
    let tmp = tempdir().expect("tempdir");
    let a = tmp.path().join("a");
    tree(&a, &[("x.txt", "a")]);

    let session = Session::new(tmp.path().join("scratch"));
    let leaf = SourceNode::new(&a);
    let inner_inputs: Vec<NodeRef> = vec![leaf.clone()];
    let inner = MergerNode::new(inner_inputs, Arc::new(DirMerge), session.clone());
    let outer_inputs: Vec<NodeRef> = vec![inner];
    let outer = MergerNode::new(outer_inputs, Arc::new(DirMerge), session);

    let creator = outer
        .find_creator(&a.join("x.txt"))
        .expect("leaf claims the file");
    assert_eq!(creator.id(), leaf.id());
}
