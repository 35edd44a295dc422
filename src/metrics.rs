//! Execution counters for nodes and their caches.
//!
//! Every [`PipelineNode`](crate::node::PipelineNode) keeps a small set of
//! counters that can be snapshotted with `stats()` and exported as JSON:
//!
//! ```
//! use stagegraph::*;
//! use stagegraph::testing::append_stage;
//!
//! # fn main() -> anyhow::Result<()> {
//! let node = PipelineNode::new(append_stage("!").cacheable());
//! node.freeze();
//! node.flow(Some(vec![FileRecord::with_content("a.txt", "hi")]))?;
//! node.flow(Some(vec![FileRecord::with_content("a.txt", "hi")]))?;
//!
//! let stats = node.stats();
//! assert_eq!(stats.stage_calls, 1);
//! assert_eq!(stats.cache.hits, 1);
//! println!("{}", stats.to_json());
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a node's cache activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    /// Fingerprints currently held.
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, or `None` before the first lookup.
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }
}

/// Snapshot of a node's scheduling activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    /// Cycles that passed the join barrier and ran.
    pub cycles: u64,
    /// `flow` calls that returned early at the join barrier.
    pub barrier_waits: u64,
    /// Single-file `apply` invocations.
    pub stage_calls: u64,
    /// Batch `apply_all` invocations.
    pub batch_calls: u64,
    pub cache: CacheStats,
}

impl NodeStats {
    pub fn to_json(&self) -> Value {
        json!({
            "cycles": self.cycles,
            "barrier_waits": self.barrier_waits,
            "stage_calls": self.stage_calls,
            "batch_calls": self.batch_calls,
            "cache": {
                "hits": self.cache.hits,
                "misses": self.cache.misses,
                "insertions": self.cache.insertions,
                "evictions": self.cache.evictions,
                "entries": self.cache.entries,
                "hit_rate": self.cache.hit_rate(),
            },
        })
    }
}

/// Live counters owned by a node.
#[derive(Debug, Default)]
pub(crate) struct NodeCounters {
    pub cycles: AtomicU64,
    pub barrier_waits: AtomicU64,
    pub stage_calls: AtomicU64,
    pub batch_calls: AtomicU64,
}

impl NodeCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, cache: CacheStats) -> NodeStats {
        NodeStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            barrier_waits: self.barrier_waits.load(Ordering::Relaxed),
            stage_calls: self.stage_calls.load(Ordering::Relaxed),
            batch_calls: self.batch_calls.load(Ordering::Relaxed),
            cache,
        }
    }
}
