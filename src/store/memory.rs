use super::ContentStore;
use crate::error::StoreResult;
use std::collections::HashMap;

/// In-memory [`ContentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ContentStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.blobs.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StoreResult<bool> {
        Ok(self.blobs.remove(key).is_some())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.blobs.contains_key(key))
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.blobs.clear();
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "in-memory"
    }
}
