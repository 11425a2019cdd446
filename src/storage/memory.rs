//! In-memory backend.

use super::Storage;
use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Thread-safe in-memory blob store keyed by full path.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.blobs.read().contains_key(path))
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", dir);
        let blobs = self.blobs.read();
        // BTreeMap order is already the sorted listing order.
        Ok(blobs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, _)| {
                let name = &path[prefix.len()..];
                (!name.contains('/')).then(|| name.to_string())
            })
            .collect())
    }

    fn read(&self, path: &str) -> Result<Bytes> {
        self.blobs.read().get(path).cloned().ok_or_else(|| Error::not_found(path.to_string()))
    }

    fn write(&self, data: &[u8], path: &str) -> Result<()> {
        self.blobs.write().insert(path.to_string(), Bytes::copy_from_slice(data));
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<bool> {
        Ok(self.blobs.write().remove(path).is_some())
    }
}
