//! Graph vertices and the flow scheduler.
//!
//! A [`PipelineNode`] owns an optional [`Stage`], its outgoing edges, a join
//! counter, an inbox, and a private [`NodeCache`]. Nodes are cheap handles
//! (`Arc` inside); cloning one yields another handle to the same vertex.
//!
//! # Lifecycle
//!
//! 1. **Build** - wire nodes with [`connect`](PipelineNode::connect) /
//!    [`pipe`](PipelineNode::pipe) while they are unfrozen.
//! 2. **Freeze** - [`freeze`](PipelineNode::freeze) a root; every reachable node
//!    snapshots its parent count and its topology becomes immutable.
//! 3. **Flow** - call [`flow`](PipelineNode::flow) on a root with a record batch.
//!    Outputs propagate depth-first in edge-insertion order. A node with several
//!    parents waits (returns nothing) until every parent has notified it in the
//!    current cycle, then runs once over everything it received.
//!
//! Every cycle ends by resetting the node's inbox and join counter, whether the
//! cycle succeeded or failed, so the graph can be flowed again indefinitely.
//!
//! # Example
//!
//! ```
//! use stagegraph::*;
//! use stagegraph::testing::append_stage;
//!
//! # fn main() -> anyhow::Result<()> {
//! let root = PipelineNode::pass_through();
//! let left = root.pipe(append_stage("-left"))?;
//! let right = root.pipe(append_stage("-right"))?;
//! let join = left.connect(&PipelineNode::pass_through())?;
//! right.connect(&join)?;
//! root.freeze();
//!
//! let out = root.flow(Some(vec![FileRecord::with_content("a.js", "a")]))?;
//! let texts: Vec<_> = out.iter().filter_map(FileRecord::text).collect();
//! assert_eq!(texts, ["a-left", "a-right"]);
//! # Ok(())
//! # }
//! ```

use crate::cache::{CacheConfig, NodeCache};
use crate::error::{GraphError, GraphResult};
use crate::fingerprint::fingerprint;
use crate::metrics::{NodeCounters, NodeStats};
use crate::node_id::NodeId;
use crate::record::{Content, FileRecord};
use crate::stage::Stage;
use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter, Result as FormatResult};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

/// Node state is fully re-established by `reset`, so a poisoned lock is safe
/// to recover.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
struct Edge {
    target: PipelineNode,
    merge_files: bool,
}

#[derive(Default)]
struct NodeState {
    children: Vec<Edge>,
    pending_parents: usize,
    total_parents: Option<usize>,
    inbox: Vec<FileRecord>,
    frozen: bool,
}

struct NodeInner {
    id: NodeId,
    tag: Mutex<String>,
    stage: Option<Arc<dyn Stage>>,
    state: Mutex<NodeState>,
    cache: Mutex<NodeCache>,
    counters: NodeCounters,
}

/// A vertex in the processing DAG.
#[derive(Clone)]
pub struct PipelineNode {
    inner: Arc<NodeInner>,
}

impl PipelineNode {
    /// Node running `stage`, with a default in-memory cache.
    pub fn new(stage: impl Stage + 'static) -> Self {
        Self::with_cache(Some(Arc::new(stage)), &CacheConfig::default())
    }

    /// Node without a stage: records pass through unchanged.
    pub fn pass_through() -> Self {
        Self::with_cache(None, &CacheConfig::default())
    }

    /// Node with an optional shared stage and explicit cache settings.
    pub fn with_cache(stage: Option<Arc<dyn Stage>>, config: &CacheConfig) -> Self {
        let id = NodeId::next();
        Self {
            inner: Arc::new(NodeInner {
                id,
                tag: Mutex::new(id.default_tag()),
                stage,
                state: Mutex::new(NodeState::default()),
                cache: Mutex::new(NodeCache::with_config(config)),
                counters: NodeCounters::default(),
            }),
        }
    }

    /// Builder-style [`set_tag`](Self::set_tag).
    pub fn tagged(self, tag: impl Into<String>) -> GraphResult<Self> {
        self.set_tag(tag)?;
        Ok(self)
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn tag(&self) -> String {
        lock(&self.inner.tag).clone()
    }

    /// Rename the node. Tags are for identification only and never affect
    /// scheduling.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidTag`] if `tag` is empty or whitespace only; the
    /// current tag is kept.
    pub fn set_tag(&self, tag: impl Into<String>) -> GraphResult<()> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(GraphError::InvalidTag(tag));
        }
        *lock(&self.inner.tag) = tag;
        Ok(())
    }

    pub fn has_stage(&self) -> bool {
        self.inner.stage.is_some()
    }

    pub fn stage_name(&self) -> Option<&str> {
        self.inner.stage.as_deref().map(|s| s.name())
    }

    // ---------------------------------------------------------------------
    // Graph construction
    // ---------------------------------------------------------------------

    /// Add an edge to `child` that forwards this node's output.
    ///
    /// Returns `child` so calls can be chained.
    pub fn connect(&self, child: &PipelineNode) -> GraphResult<PipelineNode> {
        self.connect_with(child, true)
    }

    /// Add an edge to `child`. With `merge_files == false` the child is only
    /// signalled, receiving an empty record set.
    ///
    /// # Errors
    ///
    /// Fails without modifying the graph if either endpoint is frozen, the edge
    /// already exists, the reverse edge exists, or the edge would close a cycle.
    pub fn connect_with(&self, child: &PipelineNode, merge_files: bool) -> GraphResult<PipelineNode> {
        let parent_tag = self.tag();
        let child_tag = child.tag();

        for node in [self, child] {
            if node.is_frozen() {
                return Err(GraphError::FrozenEndpoint {
                    frozen: node.tag(),
                    parent: parent_tag,
                    child: child_tag,
                });
            }
        }
        if self.is_connected_with(child) {
            return Err(GraphError::DuplicateEdge {
                parent: parent_tag,
                child: child_tag,
            });
        }
        if child.is_connected_with(self) {
            return Err(GraphError::ReciprocalEdge {
                parent: parent_tag,
                child: child_tag,
            });
        }
        if child.reaches(self.id()) {
            return Err(GraphError::Cycle {
                parent: parent_tag,
                child: child_tag,
            });
        }

        lock(&self.inner.state).children.push(Edge {
            target: child.clone(),
            merge_files,
        });
        lock(&child.inner.state).pending_parents += 1;
        trace!(parent = %parent_tag, child = %child_tag, merge_files, "connected");
        Ok(child.clone())
    }

    /// Connect a new node running `stage` and return it.
    pub fn pipe(&self, stage: impl Stage + 'static) -> GraphResult<PipelineNode> {
        self.connect(&PipelineNode::new(stage))
    }

    pub fn pipe_with(&self, stage: impl Stage + 'static, merge_files: bool) -> GraphResult<PipelineNode> {
        self.connect_with(&PipelineNode::new(stage), merge_files)
    }

    /// True iff a direct edge from this node to `node` exists.
    pub fn is_connected_with(&self, node: &PipelineNode) -> bool {
        lock(&self.inner.state)
            .children
            .iter()
            .any(|e| e.target.id() == node.id())
    }

    /// Direct children in edge-insertion order.
    pub fn children(&self) -> Vec<PipelineNode> {
        lock(&self.inner.state)
            .children
            .iter()
            .map(|e| e.target.clone())
            .collect()
    }

    /// Whether `target` is this node or reachable from it.
    fn reaches(&self, target: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            if node.id() == target {
                return true;
            }
            if seen.insert(node.id()) {
                stack.extend(node.children());
            }
        }
        false
    }

    /// Lock the topology of this node and everything reachable from it.
    ///
    /// The parent count is snapshotted on the first freeze only; freezing again
    /// (directly or through another path of a diamond) changes nothing.
    pub fn freeze(&self) {
        let children = {
            let mut state = lock(&self.inner.state);
            if state.frozen {
                return;
            }
            if state.total_parents.is_none() {
                state.total_parents = Some(state.pending_parents);
            }
            state.frozen = true;
            state.children.clone()
        };
        for edge in children {
            edge.target.freeze();
        }
    }

    pub fn is_frozen(&self) -> bool {
        lock(&self.inner.state).frozen
    }

    /// Parents that have not yet notified this node in the current cycle.
    pub fn pending_parents(&self) -> usize {
        lock(&self.inner.state).pending_parents
    }

    /// Incoming edge count, fixed at the first freeze.
    pub fn total_parents(&self) -> Option<usize> {
        lock(&self.inner.state).total_parents
    }

    pub fn inbox_len(&self) -> usize {
        lock(&self.inner.state).inbox.len()
    }

    // ---------------------------------------------------------------------
    // Execution
    // ---------------------------------------------------------------------

    /// Hand `records` to this node as one parent's contribution, then try to
    /// flow.
    ///
    /// Returns an empty set while other parents are still pending.
    pub fn notify(&self, records: Vec<FileRecord>) -> GraphResult<Vec<FileRecord>> {
        let result = self.receive(records);
        self.abort_on_error(&result);
        result
    }

    /// Run one cycle from this node.
    ///
    /// With `Some(records)` the cycle works on `records` (roots); with `None`
    /// it works on the accumulated inbox. Returns the concatenated outputs of
    /// every sink reached, in depth-first edge order, or an empty set when the
    /// join barrier is not yet satisfied.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotFrozen`] before [`freeze`](Self::freeze); any stage or
    /// cache failure aborts the cycle and resets every reachable node.
    pub fn flow(&self, records: Option<Vec<FileRecord>>) -> GraphResult<Vec<FileRecord>> {
        let result = self.run(records);
        self.abort_on_error(&result);
        result
    }

    /// Clear the inbox and restore the join counter. Before the first freeze
    /// only the inbox is cleared.
    pub fn reset(&self) {
        let mut state = lock(&self.inner.state);
        state.inbox.clear();
        if let Some(total) = state.total_parents {
            state.pending_parents = total;
        }
    }

    fn abort_on_error(&self, result: &GraphResult<Vec<FileRecord>>) {
        if let Err(e) = result {
            warn!(tag = %self.tag(), error = %e, "cycle aborted");
            self.reset_reachable();
        }
    }

    fn reset_reachable(&self) {
        let mut seen = HashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            if seen.insert(node.id()) {
                node.reset();
                stack.extend(node.children());
            }
        }
    }

    fn receive(&self, records: Vec<FileRecord>) -> GraphResult<Vec<FileRecord>> {
        {
            let mut state = lock(&self.inner.state);
            if !state.frozen {
                return Err(GraphError::NotFrozen { tag: self.tag() });
            }
            state.inbox.extend(records);
            state.pending_parents = state.pending_parents.saturating_sub(1);
        }
        self.run(None)
    }

    fn run(&self, records: Option<Vec<FileRecord>>) -> GraphResult<Vec<FileRecord>> {
        let working = {
            let mut state = lock(&self.inner.state);
            if !state.frozen {
                return Err(GraphError::NotFrozen { tag: self.tag() });
            }
            if state.pending_parents != 0 {
                NodeCounters::bump(&self.inner.counters.barrier_waits);
                trace!(tag = %self.tag(), pending = state.pending_parents, "waiting on parents");
                return Ok(Vec::new());
            }
            let inbox = std::mem::take(&mut state.inbox);
            records.unwrap_or(inbox)
        };

        NodeCounters::bump(&self.inner.counters.cycles);
        let result = self.cycle(working);
        self.reset();
        result
    }

    fn cycle(&self, working: Vec<FileRecord>) -> GraphResult<Vec<FileRecord>> {
        let input_len = working.len();
        let output = self.transform(working)?;
        debug!(tag = %self.tag(), input = input_len, output = output.len(), "flowed");

        let children = lock(&self.inner.state).children.clone();
        if children.is_empty() {
            return Ok(output);
        }

        let last_merge = children.iter().rposition(|e| e.merge_files);
        let mut output = Some(output);
        let mut results = Vec::new();
        for (i, edge) in children.iter().enumerate() {
            let input = if !edge.merge_files {
                Vec::new()
            } else if Some(i) == last_merge {
                output.take().unwrap_or_default()
            } else {
                copy_on_handoff(output.as_deref().unwrap_or_default())
            };
            results.extend(edge.target.receive(input)?);
        }
        Ok(results)
    }

    fn transform(&self, working: Vec<FileRecord>) -> GraphResult<Vec<FileRecord>> {
        let Some(stage) = &self.inner.stage else {
            return Ok(working);
        };

        if stage.is_batch() {
            NodeCounters::bump(&self.inner.counters.batch_calls);
            return stage.apply_all(working).map_err(|e| self.stage_error(e));
        }

        let cacheable = stage.is_cacheable();
        let mut out = Vec::with_capacity(working.len());
        for record in working {
            let key = fingerprint(record.content.as_ref());
            if cacheable {
                if let Some(hit) = lock(&self.inner.cache).get(&key)? {
                    out.extend(hit);
                    continue;
                }
            }
            NodeCounters::bump(&self.inner.counters.stage_calls);
            let produced = stage.apply(record).map_err(|e| self.stage_error(e))?;
            if cacheable && !produced.is_empty() {
                lock(&self.inner.cache).set(key, &produced)?;
            }
            out.extend(produced);
        }
        Ok(out)
    }

    fn stage_error(&self, e: anyhow::Error) -> GraphError {
        GraphError::Stage {
            tag: self.tag(),
            source: e.into(),
        }
    }

    // ---------------------------------------------------------------------
    // Cache management and stats
    // ---------------------------------------------------------------------

    /// Number of content fingerprints cached by this node.
    pub fn cache_len(&self) -> usize {
        lock(&self.inner.cache).len()
    }

    pub fn clear_cache(&self) -> GraphResult<()> {
        Ok(lock(&self.inner.cache).clear()?)
    }

    /// Drop the cache entry for `content`, forcing the stage to run for it on
    /// the next cycle. Returns whether an entry existed.
    pub fn invalidate(&self, content: Option<&Content>) -> GraphResult<bool> {
        let key = fingerprint(content);
        Ok(lock(&self.inner.cache).delete(&key)?)
    }

    pub fn stats(&self) -> NodeStats {
        let cache = lock(&self.inner.cache).stats();
        self.inner.counters.snapshot(cache)
    }
}

/// Each merging child receives its own copy of the output set; the last one
/// takes the original.
fn copy_on_handoff(records: &[FileRecord]) -> Vec<FileRecord> {
    records.to_vec()
}

impl PartialEq for PipelineNode {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for PipelineNode {}

impl Hash for PipelineNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl Display for PipelineNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(&self.tag())
    }
}

impl Debug for PipelineNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        let state = lock(&self.inner.state);
        f.debug_struct("PipelineNode")
            .field("id", &self.inner.id)
            .field("tag", &self.tag())
            .field("stage", &self.stage_name())
            .field("frozen", &state.frozen)
            .field("children", &state.children.len())
            .field("pending_parents", &state.pending_parents)
            .field("total_parents", &state.total_parents)
            .finish()
    }
}
