//! End-to-end flow scenarios: ordering, join barriers, fan-out, batch stages.

use stagegraph::testing::*;
use stagegraph::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn double_stage() -> impl Stage {
    from_fn(|mut r: FileRecord| {
        let text = r.text().unwrap_or_default().repeat(2);
        r.content = Some(Content::from(text));
        Ok(vec![r])
    })
    .cacheable()
}

fn keep_prefix(prefix: char) -> impl Stage {
    from_fn(move |r: FileRecord| {
        Ok(if r.filename.starts_with(prefix) {
            vec![r]
        } else {
            vec![]
        })
    })
}

fn concat_stage() -> impl Stage {
    batch_fn(|records: Vec<FileRecord>| {
        let text: String = records.iter().filter_map(FileRecord::text).collect();
        Ok(vec![FileRecord::with_content("bundle.js", text)])
    })
}

#[test]
fn test_single_node_doubles_content() -> anyhow::Result<()> {
    let node = PipelineNode::new(double_stage());
    node.freeze();

    let out = node.flow(Some(vec![record("a.js", "aa")]))?;
    assert_eq!(out, vec![record("a.js", "aaaa")]);
    Ok(())
}

#[test]
fn test_three_chained_doublings() -> anyhow::Result<()> {
    let root = PipelineNode::new(double_stage());
    root.pipe(double_stage())?.pipe(double_stage())?;
    root.freeze();

    let out = root.flow(Some(vec![record("a.js", "a")]))?;
    assert_texts(&out, &["aaaaaaaa"]);
    assert_eq!(out[0].text().map(str::len), Some(8));
    Ok(())
}

#[test]
fn test_shared_upstream_runs_once_for_both_branches() -> anyhow::Result<()> {
    let upstream = CountingStage::new(append_stage("2").cacheable());
    let upstream_calls = upstream.counter();

    let root = PipelineNode::new(upstream);
    root.pipe(append_stage("3"))?;
    root.pipe(append_stage("4"))?;
    root.freeze();

    for _ in 0..3 {
        let out = root.flow(Some(vec![record("n.txt", "1")]))?;
        assert_texts(&out, &["123", "124"]);
    }
    assert_eq!(upstream_calls.applies(), 1);
    Ok(())
}

#[test]
fn test_diamond_into_batch_concat() -> anyhow::Result<()> {
    let concat = CountingStage::new(concat_stage());
    let concat_calls = concat.counter();

    let root = PipelineNode::pass_through();
    let left = root.pipe(keep_prefix('a'))?;
    let right = root.pipe(keep_prefix('b'))?;
    let join = left.connect(&PipelineNode::new(concat))?;
    right.connect(&join)?;
    root.freeze();

    let out = root.flow(Some(vec![record("a.js", "a"), record("b.js", "b")]))?;
    assert_eq!(out, vec![record("bundle.js", "ab")]);

    let out = root.flow(Some(vec![record("a.js", "a")]))?;
    assert_eq!(out, vec![record("bundle.js", "a")]);

    assert_eq!(concat_calls.batches(), 2);
    assert_eq!(concat_calls.applies(), 0);
    Ok(())
}

#[test]
fn test_thirteen_node_dag_order() -> anyhow::Result<()> {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let flag_node = |flag: &'static str| {
        let log = Arc::clone(&log);
        PipelineNode::new(from_fn(move |mut r: FileRecord| {
            log.lock().unwrap().push(flag.to_string());
            let text = format!("{}{flag}", r.text().unwrap_or_default());
            r.content = Some(Content::from(text));
            Ok(vec![r])
        }))
        .tagged(flag)
        .unwrap()
    };

    let flags = [
        "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M",
    ];
    let nodes: HashMap<&str, PipelineNode> = flags.iter().map(|&f| (f, flag_node(f))).collect();
    let edges = [
        ("A", "B"),
        ("A", "C"),
        ("B", "D"),
        ("B", "E"),
        ("C", "E"),
        ("C", "F"),
        ("D", "G"),
        ("E", "G"),
        ("E", "H"),
        ("F", "H"),
        ("F", "I"),
        ("G", "J"),
        ("H", "K"),
        ("I", "M"),
        ("M", "L"),
    ];
    for (from, to) in edges {
        nodes[from].connect(&nodes[to])?;
    }
    let root = &nodes["A"];
    root.freeze();

    let expected_out = [
        "ABDGJ", "ABEGJ", "ACEGJ", "ABEHK", "ACEHK", "ACFHK", "ACFIML",
    ];
    let expected_log = [
        "A", "B", "D", "C", "E", "E", "G", "G", "G", "J", "J", "J", "F", "H", "H", "H", "K", "K",
        "K", "I", "M", "L",
    ];

    for _ in 0..2 {
        log.lock().unwrap().clear();
        let out = root.flow(Some(vec![record("seed.txt", "")]))?;
        assert_texts(&out, &expected_out);
        assert_eq!(*log.lock().unwrap(), expected_log);

        for node in nodes.values() {
            assert_eq!(Some(node.pending_parents()), node.total_parents(), "{node}");
            assert_eq!(node.inbox_len(), 0, "{node}");
        }
    }
    Ok(())
}

#[test]
fn test_drop_and_fan_out() -> anyhow::Result<()> {
    let split = from_fn(|r: FileRecord| {
        let text = r.text().unwrap_or_default().to_string();
        Ok(text
            .split(',')
            .filter(|part| !part.is_empty())
            .map(|part| FileRecord::with_content(r.filename.clone(), part))
            .collect())
    });
    let root = PipelineNode::new(split);
    let sink = root.pipe(append_stage("!"))?;
    root.freeze();

    let out = root.flow(Some(vec![
        record("a.txt", "x,y,z"),
        record("empty.txt", ""),
        record("b.txt", "w"),
    ]))?;
    assert_texts(&out, &["x!", "y!", "z!", "w!"]);
    assert!(out[..3].iter().all(|r| r.filename == "a.txt"));
    assert_eq!(sink.stats().stage_calls, 4);
    Ok(())
}

#[test]
fn test_join_waits_for_every_parent() -> anyhow::Result<()> {
    let first = PipelineNode::pass_through();
    let second = PipelineNode::pass_through();
    let join = first.connect(&PipelineNode::new(concat_stage()))?;
    second.connect(&join)?;
    first.freeze();
    second.freeze();

    let out = first.flow(Some(vec![record("a.js", "a")]))?;
    assert!(out.is_empty(), "join must wait for its second parent");
    assert_eq!(join.pending_parents(), 1);
    assert_eq!(join.inbox_len(), 1);
    assert_eq!(join.stats().barrier_waits, 1);

    let out = second.flow(Some(vec![record("b.js", "b")]))?;
    assert_eq!(out, vec![record("bundle.js", "ab")]);
    assert_eq!(join.pending_parents(), 2);
    assert_eq!(join.inbox_len(), 0);
    Ok(())
}

#[test]
fn test_flow_without_records_uses_inbox() -> anyhow::Result<()> {
    let parent = PipelineNode::pass_through();
    let child = parent.pipe(append_stage("+"))?;
    parent.freeze();

    // An internal node driven by hand: notify fills the inbox and flows.
    let out = child.notify(vec![record("a", "x")])?;
    assert_texts(&out, &["x+"]);
    assert_eq!(child.pending_parents(), 1);

    // A root flowed without records works on its (empty) inbox.
    let out = parent.flow(None)?;
    assert!(out.is_empty());
    Ok(())
}

#[test]
fn test_excess_notifications_clamp_join_counter() -> anyhow::Result<()> {
    let root = PipelineNode::pass_through();
    let child = root.pipe(append_stage("+"))?;
    root.freeze();

    for i in 0..4 {
        let out = child.notify(vec![record("a", &i.to_string())])?;
        assert_texts(&out, &[format!("{i}+").as_str()]);
        assert_eq!(child.pending_parents(), 1);
        assert_eq!(child.total_parents(), Some(1));
    }

    // A root has no parents; notifying it still flows and leaves it at zero.
    for _ in 0..3 {
        let out = root.notify(vec![record("r", "r")])?;
        assert_texts(&out, &["r+"]);
        assert_eq!(root.pending_parents(), 0);
        assert_eq!(root.total_parents(), Some(0));
    }
    assert_eq!(child.stats().cycles, 7);
    assert_eq!(child.stats().barrier_waits, 0);
    Ok(())
}

#[test]
fn test_non_merging_child_receives_nothing() -> anyhow::Result<()> {
    let seen: Arc<Mutex<Vec<usize>>> = Arc::default();
    let seen_in_stage = Arc::clone(&seen);
    let counter = batch_fn(move |records: Vec<FileRecord>| {
        seen_in_stage.lock().unwrap().push(records.len());
        Ok(vec![FileRecord::with_content("count", records.len().to_string())])
    });

    let root = PipelineNode::new(append_stage("!"));
    root.pipe_with(counter, false)?;
    root.freeze();

    let out = root.flow(Some(vec![record("a", "a"), record("b", "b")]))?;
    assert_texts(&out, &["0"]);
    assert_eq!(*seen.lock().unwrap(), vec![0]);
    Ok(())
}

#[test]
fn test_mixed_merge_edges_keep_order() -> anyhow::Result<()> {
    let root = PipelineNode::pass_through();
    root.pipe(append_stage("-1"))?;
    root.pipe_with(append_stage("-2"), false)?;
    root.pipe(append_stage("-3"))?;
    root.freeze();

    let out = root.flow(Some(vec![record("a", "a")]))?;
    assert_texts(&out, &["a-1", "a-3"]);
    Ok(())
}

#[test]
fn test_pass_through_preserves_records() -> anyhow::Result<()> {
    let root = PipelineNode::pass_through();
    let sink = root.connect(&PipelineNode::pass_through())?;
    root.freeze();

    let input = vec![
        record("a.js", "a").field("lang", "js"),
        FileRecord::new("empty"),
        FileRecord::with_content("bin", vec![0u8, 1, 2]),
    ];
    let out = root.flow(Some(input.clone()))?;
    assert_eq!(out, input);
    assert_eq!(sink.stats().cycles, 1);
    Ok(())
}

#[test]
fn test_leaf_output_for_multiple_sinks_follows_discovery_order() -> anyhow::Result<()> {
    let root = PipelineNode::pass_through();
    let mid = root.pipe(append_stage("m"))?;
    mid.pipe(append_stage("1"))?;
    root.pipe(append_stage("2"))?;
    mid.pipe(append_stage("3"))?;
    root.freeze();

    let out = root.flow(Some(vec![record("a", "")]))?;
    assert_texts(&out, &["m1", "m3", "2"]);
    Ok(())
}

#[test]
fn test_stage_fields_flow_downstream() -> anyhow::Result<()> {
    let tagger = from_fn(|r: FileRecord| Ok(vec![r.field("seen", true)]));
    let checker = from_fn(|r: FileRecord| {
        anyhow::ensure!(r.get_field("seen").is_some(), "field missing on {}", r.filename);
        Ok(vec![r])
    });
    let root = PipelineNode::new(tagger);
    root.pipe(checker)?;
    root.freeze();

    let out = root.flow(Some(vec![record("a", "a")]))?;
    assert_eq!(out[0].get_field("seen"), Some(&serde_json::json!(true)));
    Ok(())
}
