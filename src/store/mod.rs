//! Key/value stores for cached payload bytes.
//!
//! [`ContentStore`] separates potentially large payload blobs from the small
//! metadata a [`NodeCache`](crate::cache::NodeCache) keeps in its lookup index.
//! Two backends are provided:
//!
//! - [`MemoryStore`] - a `HashMap` of blobs, fast and process-local
//! - [`DiskStore`] (feature `disk-store`) - one file per key in a directory,
//!   keeping resident memory flat for large or long-idle entries

pub mod memory;

#[cfg(feature = "disk-store")]
pub mod disk;

pub use memory::MemoryStore;

#[cfg(feature = "disk-store")]
pub use disk::DiskStore;

use crate::error::StoreResult;

/// String-keyed storage of opaque payload blobs.
pub trait ContentStore: Send {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    fn set(&mut self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Remove `key`, returning whether it was present.
    fn delete(&mut self, key: &str) -> StoreResult<bool>;

    fn has(&self, key: &str) -> StoreResult<bool>;

    /// Remove every blob this store has written.
    fn clear(&mut self) -> StoreResult<()>;

    /// Short backend description for logs.
    fn describe(&self) -> &'static str;
}
