//! Storage backends for depositor documents.
//!
//! The depositor only needs a flat, listable namespace of named blobs laid out
//! as `<topic_id>/<table_id>/<document name>`. Anything offering atomic
//! single-blob writes and removes can back it.

mod local;
mod memory;

pub use local::FsStorage;
pub use memory::MemoryStorage;

use crate::error::Result;
use bytes::Bytes;
use std::fmt;

/// Byte-oriented blob store backing a depositor.
///
/// Paths are `/`-separated and relative to the backend root.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Check if a blob exists.
    fn exists(&self, path: &str) -> Result<bool>;

    /// List the blob names directly under `dir`, sorted. A missing directory
    /// lists as empty.
    fn list(&self, dir: &str) -> Result<Vec<String>>;

    /// Read a whole blob.
    fn read(&self, path: &str) -> Result<Bytes>;

    /// Write a whole blob, replacing any previous content atomically.
    fn write(&self, data: &[u8], path: &str) -> Result<()>;

    /// Remove a blob. Returns false if it did not exist.
    fn remove(&self, path: &str) -> Result<bool>;
}

/// Joins a table directory and a document name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("test/aged_data", "1.header"), "test/aged_data/1.header");
        assert_eq!(join("", "1.header"), "1.header");
    }
}
