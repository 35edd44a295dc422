//! Process-unique identifier for [`PipelineNode`](crate::node::PipelineNode)s.
//!
//! Every node gets a sequential `NodeId` at construction. Ids drive edge
//! identity checks and reachability walks, and seed the default node tag.
//!
//! They're small, `Copy`, and hashable, so they can be used efficiently as keys
//! in sets when traversing the graph.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Unique numeric identifier for a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate the next id for this process.
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the underlying numeric value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Default tag for a node carrying this id.
    pub(crate) fn default_tag(&self) -> String {
        format!("node-{}", self.0)
    }
}
