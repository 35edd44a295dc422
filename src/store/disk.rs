use super::ContentStore;
use crate::error::StoreResult;
use crate::fingerprint::hex_digest;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File-per-key [`ContentStore`].
///
/// Keys are hashed into file names, so any string is a valid key. The backing
/// directory is created on first write: either the configured directory or a
/// private temporary directory that is removed when the store is dropped.
#[derive(Debug, Default)]
pub struct DiskStore {
    directory: Option<PathBuf>,
    temp: Option<TempDir>,
    written: HashSet<String>,
}

impl DiskStore {
    /// Store backed by a temporary directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by `directory`. Files written by other stores in the same
    /// directory are left alone by [`clear`](ContentStore::clear).
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
            ..Self::default()
        }
    }

    /// Backing directory, if it has been decided yet.
    pub fn root(&self) -> Option<&Path> {
        self.directory
            .as_deref()
            .or_else(|| self.temp.as_ref().map(TempDir::path))
    }

    fn ensure_root(&mut self) -> StoreResult<PathBuf> {
        if let Some(dir) = &self.directory {
            fs::create_dir_all(dir)?;
            return Ok(dir.clone());
        }
        let temp = match self.temp.take() {
            Some(t) => t,
            None => tempfile::Builder::new().prefix("stagegraph-").tempdir()?,
        };
        let path = temp.path().to_path_buf();
        self.temp = Some(temp);
        Ok(path)
    }

    fn blob_path(root: &Path, key: &str) -> PathBuf {
        root.join(format!("{}.blob", hex_digest(key.as_bytes())))
    }
}

impl ContentStore for DiskStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let Some(root) = self.root() else {
            return Ok(None);
        };
        match fs::read(Self::blob_path(root, key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let root = self.ensure_root()?;
        fs::write(Self::blob_path(&root, key), value)?;
        self.written.insert(key.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StoreResult<bool> {
        self.written.remove(key);
        let Some(root) = self.root() else {
            return Ok(false);
        };
        match fs::remove_file(Self::blob_path(root, key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        match self.root() {
            Some(root) => Ok(Self::blob_path(root, key).try_exists()?),
            None => Ok(false),
        }
    }

    fn clear(&mut self) -> StoreResult<()> {
        let keys: Vec<String> = self.written.drain().collect();
        for key in keys {
            self.delete(&key)?;
        }
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "disk"
    }
}
