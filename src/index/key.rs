//! # Index Key Format
//!
//! Orders documents inside a table.
//!
//! ## Ordering
//!
//! IndexKeys are ordered by:
//! 1. sort_key (ascending)
//! 2. kind (header before data)
//! 3. merge_key (ascending)
//! 4. status (initial, merged, packaged)
//!
//! Data key ranges are non-overlapping, so ordering by `sort_key` is the
//! same total order as ordering by name. The trailing fields only break ties
//! between a header and a data document sharing a key, and between copies of
//! one key pair left behind by an interrupted status change.

use crate::document::{DocName, DocStatus};
use std::cmp::Ordering;

/// Sort position of a document inside the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    sort_key: String,
    status: Option<DocStatus>,
    merge_key: String,
}

impl IndexKey {
    /// The position of a named document.
    pub fn of(name: &DocName) -> Self {
        Self {
            sort_key: name.sort_key().to_string(),
            status: name.status(),
            merge_key: name.merge_key().to_string(),
        }
    }

    /// Smallest possible key with the given sort key.
    pub fn lowest(sort_key: &str) -> Self {
        Self { sort_key: sort_key.to_string(), status: None, merge_key: String::new() }
    }

    /// The sort key.
    pub fn sort_key(&self) -> &str {
        &self.sort_key
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key
            .cmp(&other.sort_key)
            .then_with(|| self.status.is_some().cmp(&other.status.is_some()))
            .then_with(|| self.merge_key.cmp(&other.merge_key))
            .then_with(|| self.status.cmp(&other.status))
    }
}
