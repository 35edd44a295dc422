//! Per-node memoization of stage output, keyed by content fingerprint.
//!
//! A [`NodeCache`] keeps a small lookup index in memory (filenames, field bags,
//! payload keys) and moves every payload into a [`ContentStore`]. Entries are
//! stored as copies of what the stage produced and reassembled into fresh
//! records on every read, so callers can mutate what they get back freely.
//!
//! # Eviction
//!
//! With [`CacheConfig::max_entries`] set, the oldest fingerprint is evicted
//! once the bound is exceeded. Without it the cache grows for the lifetime of
//! its node.

use crate::error::{StoreError, StoreResult};
use crate::fingerprint::Fingerprint;
use crate::metrics::CacheStats;
use crate::record::{Content, FileRecord};
use crate::store::{ContentStore, MemoryStore};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

#[cfg(feature = "disk-store")]
use crate::store::DiskStore;
#[cfg(feature = "disk-store")]
use std::path::PathBuf;

/// Which [`ContentStore`] backs a node cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Memory,
    /// Disk-backed payloads; a temporary directory when `directory` is `None`.
    #[cfg(feature = "disk-store")]
    Disk {
        #[serde(default)]
        directory: Option<PathBuf>,
    },
}

/// Cache settings for a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub store: StoreKind,
    /// Maximum number of fingerprints kept; `None` never evicts.
    pub max_entries: Option<usize>,
}

impl CacheConfig {
    fn build_store(&self) -> Box<dyn ContentStore> {
        match &self.store {
            StoreKind::Memory => Box::new(MemoryStore::new()),
            #[cfg(feature = "disk-store")]
            StoreKind::Disk { directory: Some(dir) } => Box::new(DiskStore::in_directory(dir)),
            #[cfg(feature = "disk-store")]
            StoreKind::Disk { directory: None } => Box::new(DiskStore::new()),
        }
    }
}

/// Index entry: everything about a cached record except its payload.
#[derive(Clone, Debug)]
struct CachedRecord {
    filename: String,
    fields: Map<String, serde_json::Value>,
    payload_key: Option<String>,
}

/// Encoded form of [`Content`] inside the store.
#[derive(Serialize, Deserialize)]
enum Payload {
    Text(String),
    Bytes(Vec<u8>),
    Json(String),
}

fn encode(content: &Content) -> StoreResult<Vec<u8>> {
    let payload = match content {
        Content::Text(s) => Payload::Text(s.clone()),
        Content::Bytes(b) => Payload::Bytes(b.clone()),
        Content::Value(v) => Payload::Json(serde_json::to_string(v)?),
    };
    Ok(postcard::to_allocvec(&payload)?)
}

fn decode(bytes: &[u8]) -> StoreResult<Content> {
    Ok(match postcard::from_bytes::<Payload>(bytes)? {
        Payload::Text(s) => Content::Text(s),
        Payload::Bytes(b) => Content::Bytes(b),
        Payload::Json(s) => Content::Value(serde_json::from_str(&s)?),
    })
}

static NEXT_NAMESPACE: AtomicU64 = AtomicU64::new(0);

/// Per-node memo table. Payload keys carry a process-unique namespace, so
/// caches sharing one store directory never see each other's blobs.
pub struct NodeCache {
    namespace: String,
    index: HashMap<Fingerprint, Vec<CachedRecord>>,
    order: VecDeque<Fingerprint>,
    store: Box<dyn ContentStore>,
    max_entries: Option<usize>,
    stats: CacheStats,
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::with_config(&CacheConfig::default())
    }
}

impl Debug for NodeCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.debug_struct("NodeCache")
            .field("namespace", &self.namespace)
            .field("entries", &self.index.len())
            .field("store", &self.store.describe())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        Self::with_store(config.build_store(), config.max_entries)
    }

    pub fn with_store(store: Box<dyn ContentStore>, max_entries: Option<usize>) -> Self {
        Self {
            namespace: format!("cache-{}", NEXT_NAMESPACE.fetch_add(1, Ordering::Relaxed)),
            index: HashMap::new(),
            order: VecDeque::new(),
            store,
            max_entries,
            stats: CacheStats::default(),
        }
    }

    pub fn has(&self, key: &Fingerprint) -> bool {
        self.index.contains_key(key)
    }

    /// Reassemble the records cached under `key`, counting a hit or a miss.
    pub fn get(&mut self, key: &Fingerprint) -> StoreResult<Option<Vec<FileRecord>>> {
        let Some(entry) = self.index.get(key) else {
            self.stats.misses += 1;
            trace!(%key, "cache miss");
            return Ok(None);
        };
        let mut records = Vec::with_capacity(entry.len());
        for cached in entry {
            let content = match &cached.payload_key {
                Some(k) => {
                    let bytes = self
                        .store
                        .get(k)?
                        .ok_or_else(|| StoreError::MissingPayload(k.clone()))?;
                    Some(decode(&bytes)?)
                }
                None => None,
            };
            records.push(FileRecord {
                filename: cached.filename.clone(),
                content,
                fields: cached.fields.clone(),
            });
        }
        self.stats.hits += 1;
        trace!(%key, records = records.len(), "cache hit");
        Ok(Some(records))
    }

    /// Store a copy of `records` under `key`, replacing any previous entry.
    ///
    /// Keys that can never be looked up again (`Fingerprint::Unique`) are
    /// skipped.
    pub fn set(&mut self, key: Fingerprint, records: &[FileRecord]) -> StoreResult<()> {
        if !key.is_cacheable() {
            return Ok(());
        }
        self.delete(&key)?;

        let entry = self.write_entry(&key, records)?;
        self.index.insert(key.clone(), entry);
        self.order.push_back(key);
        self.stats.insertions += 1;

        if let Some(max) = self.max_entries {
            while self.index.len() > max {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                trace!(key = %oldest, "cache eviction");
                self.remove_entry(&oldest)?;
                self.stats.evictions += 1;
            }
        }
        Ok(())
    }

    /// Write the payloads of `records`. On failure, blobs already written for
    /// this entry are removed again.
    fn write_entry(&mut self, key: &Fingerprint, records: &[FileRecord]) -> StoreResult<Vec<CachedRecord>> {
        let mut entry = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let payload_key = match &record.content {
                Some(content) => {
                    let k = self.payload_key(key, i);
                    if let Err(e) = encode(content).and_then(|bytes| self.store.set(&k, bytes)) {
                        self.discard_payloads(&entry);
                        return Err(e);
                    }
                    Some(k)
                }
                None => None,
            };
            entry.push(CachedRecord {
                filename: record.filename.clone(),
                fields: record.fields.clone(),
                payload_key,
            });
        }
        Ok(entry)
    }

    fn payload_key(&self, key: &Fingerprint, index: usize) -> String {
        format!("{}/{}#{index}", self.namespace, key.as_key())
    }

    fn discard_payloads(&mut self, entry: &[CachedRecord]) {
        for k in entry.iter().filter_map(|c| c.payload_key.as_deref()) {
            if let Err(e) = self.store.delete(k) {
                warn!(key = k, error = %e, "failed to discard partial cache entry");
            }
        }
    }

    /// Remove the entry under `key`, returning whether one existed.
    pub fn delete(&mut self, key: &Fingerprint) -> StoreResult<bool> {
        if !self.remove_entry(key)? {
            return Ok(false);
        }
        self.order.retain(|k| k != key);
        Ok(true)
    }

    fn remove_entry(&mut self, key: &Fingerprint) -> StoreResult<bool> {
        let Some(entry) = self.index.remove(key) else {
            return Ok(false);
        };
        for payload_key in entry.iter().filter_map(|c| c.payload_key.as_deref()) {
            self.store.delete(payload_key)?;
        }
        Ok(true)
    }

    pub fn clear(&mut self) -> StoreResult<()> {
        self.index.clear();
        self.order.clear();
        self.store.clear()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.index.len(),
            ..self.stats
        }
    }
}
