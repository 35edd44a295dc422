//! Stage failures: propagation, tagging, and recovery of graph state.

use stagegraph::testing::*;
use stagegraph::*;
use std::error::Error as _;

fn reject_bad() -> impl Stage {
    from_fn(|r: FileRecord| {
        if r.text() == Some("bad") {
            anyhow::bail!("cannot process {}", r.filename);
        }
        Ok(vec![r])
    })
}

fn assert_idle(nodes: &[&PipelineNode]) {
    for node in nodes {
        assert_eq!(Some(node.pending_parents()), node.total_parents(), "{node}");
        assert_eq!(node.inbox_len(), 0, "{node}");
    }
}

#[test]
fn test_stage_error_reaches_root_caller_with_tag() -> anyhow::Result<()> {
    let root = PipelineNode::pass_through();
    let failing = root.connect(&PipelineNode::new(reject_bad()).tagged("lint")?)?;
    failing.pipe(append_stage("!"))?;
    root.freeze();

    let err = root.flow(Some(vec![record("x.js", "bad")])).unwrap_err();
    match &err {
        GraphError::Stage { tag, source } => {
            assert_eq!(tag, "lint");
            assert_eq!(source.to_string(), "cannot process x.js");
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(!err.is_mutation());
    assert!(err.source().is_some());
    assert!(err.to_string().contains("lint"));
    Ok(())
}

#[test]
fn test_failure_resets_off_path_join() -> anyhow::Result<()> {
    let root = PipelineNode::pass_through().tagged("root")?;
    let ok_branch = root.pipe(append_stage("-ok"))?;
    let failing = root.connect(&PipelineNode::new(reject_bad()).tagged("failing")?)?;
    let join = ok_branch.connect(&PipelineNode::pass_through().tagged("join")?)?;
    failing.connect(&join)?;
    root.freeze();

    // ok_branch runs first and parks its output in the join's inbox.
    assert!(root.flow(Some(vec![record("a.js", "bad")])).is_err());
    assert_idle(&[&root, &ok_branch, &failing, &join]);
    assert_eq!(join.pending_parents(), 2);

    let out = root.flow(Some(vec![record("a.js", "good")]))?;
    assert_texts(&out, &["good-ok", "good"]);
    assert_idle(&[&root, &ok_branch, &failing, &join]);
    Ok(())
}

#[test]
fn test_failure_midway_through_a_batch() -> anyhow::Result<()> {
    let stage = CountingStage::new(reject_bad());
    let calls = stage.counter();
    let root = PipelineNode::new(stage);
    let sink = root.pipe(append_stage("!"))?;
    root.freeze();

    let err = root.flow(Some(vec![record("a", "ok"), record("b", "bad"), record("c", "ok")]));
    assert!(matches!(err, Err(GraphError::Stage { .. })));
    assert_eq!(calls.applies(), 2, "records after the failure are not processed");
    assert_eq!(sink.stats().cycles, 0);

    let out = root.flow(Some(vec![record("a", "ok")]))?;
    assert_texts(&out, &["ok!"]);
    Ok(())
}

#[test]
fn test_batch_stage_error() -> anyhow::Result<()> {
    let bundle = batch_fn(|records: Vec<FileRecord>| {
        anyhow::ensure!(!records.is_empty(), "nothing to bundle");
        Ok(records)
    });
    let root = PipelineNode::pass_through();
    let bundler = root.connect(&PipelineNode::new(bundle).tagged("bundle")?)?;
    root.freeze();

    match root.flow(Some(Vec::new())) {
        Err(GraphError::Stage { tag, source }) => {
            assert_eq!(tag, "bundle");
            assert_eq!(source.to_string(), "nothing to bundle");
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_idle(&[&root, &bundler]);
    assert_eq!(bundler.stats().batch_calls, 1);

    let out = root.flow(Some(vec![record("a", "a")]))?;
    assert_texts(&out, &["a"]);
    Ok(())
}

#[test]
fn test_failed_records_are_not_cached() -> anyhow::Result<()> {
    let stage = CountingStage::new(
        from_fn(|r: FileRecord| {
            anyhow::ensure!(r.filename != "broken", "broken input");
            Ok(vec![r])
        })
        .cacheable(),
    );
    let calls = stage.counter();
    let node = PipelineNode::new(stage);
    node.freeze();

    assert!(node.flow(Some(vec![record("broken", "same")])).is_err());
    assert_eq!(node.cache_len(), 0);

    // Same content under a different name now succeeds and is cached.
    node.flow(Some(vec![record("fine", "same")]))?;
    node.flow(Some(vec![record("broken", "same")]))?;
    assert_eq!(calls.applies(), 2);
    Ok(())
}

#[test]
fn test_notify_failure_resets_from_notified_node() -> anyhow::Result<()> {
    let parent = PipelineNode::pass_through();
    let child = parent.connect(&PipelineNode::new(reject_bad()))?;
    let grandchild = child.pipe(append_stage("!"))?;
    parent.freeze();

    assert!(child.notify(vec![record("a", "bad")]).is_err());
    assert_idle(&[&child, &grandchild]);

    let out = child.notify(vec![record("a", "fine")])?;
    assert_texts(&out, &["fine!"]);
    Ok(())
}
