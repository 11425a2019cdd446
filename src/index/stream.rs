//! Range scans over the sort-key index.
//!
//! A [`DocumentStream`] walks the index one entry at a time from a cursor,
//! so a scan never materializes the listing and can be dropped at any point
//! without side effects. Summaries are only read when a level filter needs
//! them.

use super::IndexKey;
use crate::document::{DocName, DocStatus};
use crate::error::Result;
use crate::table::TableStore;
use std::ops::Bound;

/// Filters and direction of a sort-key scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKeyQuery {
    /// Only documents with one of these statuses. The header has no status.
    pub status_list: Option<Vec<DocStatus>>,
    /// Pivot key: scan from `sort_key >= key` forwards, or `<= key` backwards.
    pub le_ge_key: Option<String>,
    /// Scan in descending order.
    /// Default: false
    pub reverse: bool,
    /// Whether the pivot key itself qualifies.
    /// Default: true
    pub equal: bool,
    /// Only data documents with at least this merge level.
    pub min_merge_level: Option<u32>,
    /// Only data documents closing a bucket of at least this level.
    pub min_close_level: Option<u32>,
}

impl Default for SortKeyQuery {
    fn default() -> Self {
        Self {
            status_list: None,
            le_ge_key: None,
            reverse: false,
            equal: true,
            min_merge_level: None,
            min_close_level: None,
        }
    }
}

impl SortKeyQuery {
    /// A query matching every document in ascending order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the scan to the given statuses.
    pub fn status(mut self, statuses: &[DocStatus]) -> Self {
        self.status_list = Some(statuses.to_vec());
        self
    }

    /// Sets the pivot key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.le_ge_key = Some(key.into());
        self
    }

    /// Sets the scan direction.
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Sets whether the pivot key itself qualifies.
    pub fn equal(mut self, equal: bool) -> Self {
        self.equal = equal;
        self
    }

    /// Sets the minimum merge level.
    pub fn min_merge_level(mut self, level: u32) -> Self {
        self.min_merge_level = Some(level);
        self
    }

    /// Sets the minimum close level.
    pub fn min_close_level(mut self, level: u32) -> Self {
        self.min_close_level = Some(level);
        self
    }

    fn has_level_filter(&self) -> bool {
        self.min_merge_level.is_some() || self.min_close_level.is_some()
    }

    /// Whether a name passes the filters that need no document read.
    pub fn matches_name(&self, name: &DocName) -> bool {
        match name.status() {
            None => self.status_list.is_none() && !self.has_level_filter(),
            Some(status) => self.status_list.as_ref().map_or(true, |list| list.contains(&status)),
        }
    }

    /// Cursor the scan starts from.
    fn start(&self) -> Bound<IndexKey> {
        let Some(key) = &self.le_ge_key else {
            return Bound::Unbounded;
        };
        // `key\0` is the immediate successor of `key`.
        let successor = IndexKey::lowest(&format!("{}\0", key));
        let at_key = IndexKey::lowest(key);
        match (self.reverse, self.equal) {
            (false, true) => Bound::Included(at_key),
            (false, false) => Bound::Included(successor),
            (true, true) => Bound::Excluded(successor),
            (true, false) => Bound::Excluded(at_key),
        }
    }
}

/// Lazy, restartable scan producing document names.
///
/// The stream holds its own table handle and a cursor into the index.
/// Cloning it yields an independent scan from the same position, and
/// [`rewind`](Self::rewind) restarts it from the beginning.
#[derive(Debug, Clone)]
pub struct DocumentStream {
    store: TableStore,
    query: SortKeyQuery,
    cursor: Bound<IndexKey>,
    done: bool,
}

impl DocumentStream {
    pub(crate) fn new(store: TableStore, query: SortKeyQuery) -> Self {
        let cursor = query.start();
        Self { store, query, cursor, done: false }
    }

    /// The query driving this stream.
    pub fn query(&self) -> &SortKeyQuery {
        &self.query
    }

    /// Restarts the scan from its first position.
    pub fn rewind(&mut self) {
        self.cursor = self.query.start();
        self.done = false;
    }

    fn matches(&self, name: &DocName) -> Result<bool> {
        if !self.query.matches_name(name) {
            return Ok(false);
        }
        if name.is_header() || !self.query.has_level_filter() {
            return Ok(true);
        }
        let summary = self.store.summary(name)?;
        Ok(self.query.min_merge_level.map_or(true, |l| summary.merge_level >= l)
            && self.query.min_close_level.map_or(true, |l| summary.close_level >= l))
    }
}

impl Iterator for DocumentStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some((key, entry)) = self.store.index().step(self.cursor.as_ref(), self.query.reverse) else {
                self.done = true;
                break;
            };
            self.cursor = Bound::Excluded(key);
            match self.matches(&entry.name) {
                Ok(true) => return Some(Ok(entry.name.to_string())),
                Ok(false) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
