//! # Sort-Key Index
//!
//! The index of a table is derived, never persisted: the directory listing
//! is parsed into an ordered map from [`IndexKey`] to document name. Header
//! fields that only live inside documents (levels, sizes) are cached as
//! [`DocSummary`] values the first time they are read.
//!
//! ## Design
//!
//! - Based on crossbeam-skiplist so readers never block each other
//! - Rebuilt from a listing before every public operation; cached summaries
//!   survive a rebuild for names still present
//! - The depositor keeps it in sync with its own writes and removes

mod key;
pub mod stream;

pub use key::IndexKey;
pub use stream::{DocumentStream, SortKeyQuery};

use crate::document::{DocName, DocStatus, DocSummary};
use crossbeam_skiplist::SkipMap;
use std::ops::Bound;
use std::sync::Arc;

/// One indexed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Parsed document name.
    pub name: DocName,
    /// Cached header summary, once loaded.
    pub summary: Option<Arc<DocSummary>>,
}

/// Ordered view of the documents of one table.
#[derive(Debug)]
pub struct SortKeyIndex {
    entries: SkipMap<IndexKey, IndexEntry>,
}

impl Default for SortKeyIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SortKeyIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self { entries: SkipMap::new() }
    }

    /// Replaces the indexed names with a fresh directory listing.
    ///
    /// Names that do not parse as documents are ignored. Summaries cached for
    /// names still listed are kept.
    pub fn rebuild<I>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut listed = Vec::new();
        for raw in names {
            match raw.parse::<DocName>() {
                Ok(name) => listed.push(name),
                Err(_) => log::debug!("Ignoring foreign file in table directory: {}", raw),
            }
        }

        let listed_keys: std::collections::HashSet<IndexKey> =
            listed.iter().map(IndexKey::of).collect();
        for entry in self.entries.iter() {
            if !listed_keys.contains(entry.key()) {
                entry.remove();
            }
        }
        for name in listed {
            let key = IndexKey::of(&name);
            if self.entries.get(&key).is_none() {
                self.entries.insert(key, IndexEntry { name, summary: None });
            }
        }
        self.entries.len()
    }

    /// Inserts or replaces a document.
    pub fn insert(&self, name: DocName, summary: Option<DocSummary>) {
        let key = IndexKey::of(&name);
        self.entries.insert(key, IndexEntry { name, summary: summary.map(Arc::new) });
    }

    /// Removes a document. Returns whether it was indexed.
    pub fn remove(&self, name: &DocName) -> bool {
        self.entries.remove(&IndexKey::of(name)).is_some()
    }

    /// Cached summary of a document.
    pub fn summary(&self, name: &DocName) -> Option<Arc<DocSummary>> {
        self.entries.get(&IndexKey::of(name)).and_then(|e| e.value().summary.clone())
    }

    /// Whether a document is indexed.
    pub fn contains(&self, name: &DocName) -> bool {
        self.entries.contains_key(&IndexKey::of(name))
    }

    /// The table header, if any.
    pub fn header(&self) -> Option<DocName> {
        self.entries.iter().map(|e| e.value().name.clone()).find(DocName::is_header)
    }

    /// The data document whose range starts at `merge_key`.
    ///
    /// If an interrupted status change left several copies of the key pair,
    /// the most advanced status wins.
    pub fn find_by_merge_key(&self, merge_key: &str) -> Option<DocName> {
        // A range starting at `merge_key` ends at or after it.
        self.entries
            .range(IndexKey::lowest(merge_key)..)
            .map(|e| e.value().name.clone())
            .filter(|name| !name.is_header() && name.merge_key() == merge_key)
            .max_by_key(|name| name.status())
    }

    /// Data documents strictly before `name`, newest first.
    pub fn data_before(&self, name: &DocName) -> Vec<IndexEntry> {
        self.entries
            .range((Bound::Unbounded, Bound::Excluded(IndexKey::of(name))))
            .rev()
            .map(|e| e.value().clone())
            .filter(|e| !e.name.is_header())
            .collect()
    }

    /// First entry past `bound`: the smallest key above it, or the largest
    /// key below it when `reverse` is set.
    pub fn step(&self, bound: Bound<&IndexKey>, reverse: bool) -> Option<(IndexKey, IndexEntry)> {
        let entry = if reverse { self.entries.upper_bound(bound) } else { self.entries.lower_bound(bound) };
        entry.map(|e| (e.key().clone(), e.value().clone()))
    }

    /// Ordered snapshot of every entry.
    pub fn snapshot(&self) -> Vec<IndexEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    /// Ordered snapshot of the data documents with the given status.
    pub fn with_status(&self, status: DocStatus) -> Vec<IndexEntry> {
        self.entries
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| e.name.status() == Some(status))
            .collect()
    }

    /// The newest data document.
    pub fn last_data(&self) -> Option<IndexEntry> {
        self.entries.iter().rev().map(|e| e.value().clone()).find(|e| !e.name.is_header())
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
