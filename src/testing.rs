//! Testing utilities for stagegraph pipelines.
//!
//! Helpers for building records, counting stage invocations, and asserting on
//! the text content of a flow's output.
//!
//! ```
//! use stagegraph::*;
//! use stagegraph::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let stage = CountingStage::new(append_stage("!").cacheable());
//! let calls = stage.counter();
//! let node = PipelineNode::new(stage);
//! node.freeze();
//!
//! for _ in 0..3 {
//!     let out = node.flow(Some(vec![record("a.txt", "hi")]))?;
//!     assert_texts(&out, &["hi!"]);
//! }
//! assert_eq!(calls.applies(), 1);
//! # Ok(())
//! # }
//! ```

use crate::record::{Content, FileRecord};
use crate::stage::{FnStage, Stage, from_fn};
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Record with text content.
pub fn record(filename: &str, content: &str) -> FileRecord {
    FileRecord::with_content(filename, content)
}

/// Text content of each record; records without text map to `""`.
pub fn texts(records: &[FileRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.text().unwrap_or_default().to_string())
        .collect()
}

/// Assert the records' text contents equal `expected`, in order.
///
/// # Panics
///
/// Panics if the contents differ.
pub fn assert_texts(records: &[FileRecord], expected: &[&str]) {
    let actual = texts(records);
    assert_eq!(actual, expected, "record contents differ");
}

/// Single-file stage appending `suffix` to text content.
pub fn append_stage(
    suffix: &str,
) -> FnStage<impl Fn(FileRecord) -> Result<Vec<FileRecord>> + Send + Sync + use<>> {
    let name = format!("append({suffix})");
    let suffix = suffix.to_string();
    from_fn(move |mut r: FileRecord| {
        let text = format!("{}{}", r.text().unwrap_or_default(), suffix);
        r.content = Some(Content::Text(text));
        Ok(vec![r])
    })
    .named(name)
}

/// Shared view of a [`CountingStage`]'s call counts.
#[derive(Clone, Debug, Default)]
pub struct CallCounter {
    applies: Arc<AtomicUsize>,
    batches: Arc<AtomicUsize>,
}

impl CallCounter {
    /// Number of `apply` calls.
    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    /// Number of `apply_all` calls.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

/// Wraps a stage and counts its invocations, keeping its capability flags.
pub struct CountingStage<S> {
    inner: S,
    counter: CallCounter,
}

impl<S: Stage> CountingStage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            counter: CallCounter::default(),
        }
    }

    /// Handle that stays valid after the stage is moved into a node.
    pub fn counter(&self) -> CallCounter {
        self.counter.clone()
    }
}

impl<S: Stage> Stage for CountingStage<S> {
    fn apply(&self, record: FileRecord) -> Result<Vec<FileRecord>> {
        self.counter.applies.fetch_add(1, Ordering::SeqCst);
        self.inner.apply(record)
    }

    fn apply_all(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        self.counter.batches.fetch_add(1, Ordering::SeqCst);
        self.inner.apply_all(records)
    }

    fn is_batch(&self) -> bool {
        self.inner.is_batch()
    }

    fn is_cacheable(&self) -> bool {
        self.inner.is_cacheable()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
