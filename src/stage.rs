//! The [`Stage`] capability trait and closure adapters.
//!
//! A stage is the pluggable transform a node runs. It works in one of two modes:
//!
//! - **single-file** (default): [`Stage::apply`] is called once per record and
//!   may return zero (drop), one, or several (fan-out) records. Results may be
//!   memoized by the node when [`Stage::is_cacheable`] is true.
//! - **batch**: when [`Stage::is_batch`] is true, [`Stage::apply_all`] receives the
//!   whole working set at once and may combine, split, or reorder it. Caching
//!   never applies in this mode.
//!
//! Closures can be lifted into stages with [`from_fn`] and [`batch_fn`]:
//!
//! ```
//! use stagegraph::*;
//!
//! let upper = from_fn(|mut r: FileRecord| {
//!     if let Some(upper) = r.text().map(str::to_uppercase) {
//!         r.content = Some(Content::from(upper));
//!     }
//!     Ok(vec![r])
//! })
//! .cacheable();
//! assert!(upper.is_cacheable());
//!
//! let count = batch_fn(|records: Vec<FileRecord>| {
//!     Ok(vec![FileRecord::with_content("count", records.len().to_string())])
//! });
//! assert!(count.is_batch());
//! ```

use crate::record::FileRecord;
use anyhow::Result;
use std::any::type_name;

pub trait Stage: Send + Sync {
    /// Transform one record. An empty result drops the record.
    fn apply(&self, record: FileRecord) -> Result<Vec<FileRecord>>;

    /// Transform the whole working set. Used only when [`is_batch`](Self::is_batch)
    /// is true; the default applies [`apply`](Self::apply) in order.
    fn apply_all(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            out.extend(self.apply(record)?);
        }
        Ok(out)
    }

    fn is_batch(&self) -> bool {
        false
    }

    /// Whether the node may memoize [`apply`](Self::apply) results by content.
    /// Ignored in batch mode.
    fn is_cacheable(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

/// Single-file stage built from a closure.
pub struct FnStage<F> {
    f: F,
    cacheable: bool,
    name: String,
}

/// Lift `f` into a single-file [`Stage`].
pub fn from_fn<F>(f: F) -> FnStage<F>
where
    F: Fn(FileRecord) -> Result<Vec<FileRecord>> + Send + Sync,
{
    FnStage {
        f,
        cacheable: false,
        name: "fn".to_string(),
    }
}

impl<F> FnStage<F> {
    /// Let the node memoize this stage's output.
    #[must_use]
    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> Stage for FnStage<F>
where
    F: Fn(FileRecord) -> Result<Vec<FileRecord>> + Send + Sync,
{
    fn apply(&self, record: FileRecord) -> Result<Vec<FileRecord>> {
        (self.f)(record)
    }

    fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Batch stage built from a closure.
pub struct BatchFnStage<F> {
    f: F,
    name: String,
}

/// Lift `f` into a batch-mode [`Stage`].
pub fn batch_fn<F>(f: F) -> BatchFnStage<F>
where
    F: Fn(Vec<FileRecord>) -> Result<Vec<FileRecord>> + Send + Sync,
{
    BatchFnStage {
        f,
        name: "batch_fn".to_string(),
    }
}

impl<F> BatchFnStage<F> {
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> Stage for BatchFnStage<F>
where
    F: Fn(Vec<FileRecord>) -> Result<Vec<FileRecord>> + Send + Sync,
{
    fn apply(&self, record: FileRecord) -> Result<Vec<FileRecord>> {
        (self.f)(vec![record])
    }

    fn apply_all(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        (self.f)(records)
    }

    fn is_batch(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}
