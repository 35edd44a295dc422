//! # stagegraph
//!
//! The execution core of a **build-pipeline engine**: a directed acyclic graph of
//! processing stages through which batches of file-like records flow. Each stage
//! may transform records, and single-file stages may have their results cached by
//! content fingerprint so unchanged files are never processed twice.
//!
//! ## Key Features
//!
//! - **DAG topology** - nodes with any number of parents and children, wired with
//!   [`connect`](PipelineNode::connect) / [`pipe`](PipelineNode::pipe)
//! - **Join barriers** - a node with several parents runs once per cycle, after
//!   all of them have delivered their records
//! - **Deterministic order** - depth-first, edge-insertion-order traversal; one
//!   record at a time within a node
//! - **Content-addressed caching** - per-node memoization keyed by SHA-256 of the
//!   content, with payloads held in a pluggable [`ContentStore`]
//! - **Batch stages** - stages that see the whole working set at once and bypass
//!   caching
//! - **Reusable graphs** - every cycle ends with a reset, success or failure
//!
//! ## Quick Start
//!
//! ```
//! use stagegraph::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let double = from_fn(|mut r: FileRecord| {
//!     let text = r.text().unwrap_or_default().repeat(2);
//!     r.content = Some(Content::from(text));
//!     Ok(vec![r])
//! })
//! .cacheable();
//!
//! let root = PipelineNode::new(double);
//! root.freeze();
//!
//! let out = root.flow(Some(vec![FileRecord::with_content("a.js", "aa")]))?;
//! assert_eq!(out[0].text(), Some("aaaa"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`FileRecord`] is a filename, an optional [`Content`] payload, and an open
//! bag of named fields. Records are values; each child receives its own copy.
//!
//! ### Stages
//!
//! A [`Stage`] works in single-file mode ([`Stage::apply`], optionally cacheable)
//! or batch mode ([`Stage::apply_all`]). Use [`from_fn`] and [`batch_fn`] to lift
//! closures into stages.
//!
//! ### Nodes
//!
//! A [`PipelineNode`] is built unfrozen, frozen once with
//! [`freeze`](PipelineNode::freeze), then flowed any number of times. Freezing
//! snapshots each node's parent count, which the join barrier counts down from.
//!
//! ### Caching
//!
//! A [`NodeCache`] maps a [`Fingerprint`] to the records a stage produced for it.
//! Absent content shares a single bucket; text and bytes are hashed; structured
//! values never hit. Payloads live in a [`MemoryStore`] or a [`DiskStore`]
//! chosen through [`CacheConfig`].
//!
//! ## Feature Flags
//!
//! - `disk-store` (default) - enable the file-backed [`DiskStore`]
//!
//! ## Module Overview
//!
//! - [`node`] - graph construction and the flow scheduler
//! - [`stage`] - the stage capability trait and closure adapters
//! - [`cache`] - per-node content cache and its configuration
//! - [`store`] - payload stores
//! - [`fingerprint`] - content fingerprints
//! - [`record`] - records and content
//! - [`metrics`] - node and cache counters
//! - [`error`] - error types
//! - [`testing`] - helpers for testing pipelines

pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod metrics;
pub mod node;
pub mod node_id;
pub mod record;
pub mod stage;
pub mod store;
pub mod testing;

pub use cache::{CacheConfig, NodeCache, StoreKind};
pub use error::{GraphError, GraphResult, StoreError, StoreResult};
pub use fingerprint::{Fingerprint, fingerprint};
pub use metrics::{CacheStats, NodeStats};
pub use node::PipelineNode;
pub use node_id::NodeId;
pub use record::{Content, FileRecord};
pub use stage::{BatchFnStage, FnStage, Stage, batch_fn, from_fn};
pub use store::{ContentStore, MemoryStore};

#[cfg(feature = "disk-store")]
pub use store::DiskStore;
