//! # Table Store
//!
//! Binds a storage backend to one `<topic_id>/<table_id>` directory and
//! keeps the sort-key index of that directory in step with every write and
//! remove issued through it.
//!
//! ## Design
//!
//! - Cheap to clone: streams carry their own handle instead of borrowing
//!   the depositor
//! - Header reads cache a [`DocSummary`] in the index
//! - The table header is the only mutable aggregate; helpers here load,
//!   patch and save it

use crate::document::{DocName, Document, DocumentHeader, DocSummary};
use crate::error::{Error, Result};
use crate::index::SortKeyIndex;
use crate::logging::{depot_log, LogContext};
use crate::storage::{self, Storage};
use log::Level;
use std::sync::Arc;

/// Handle on the documents of one table.
#[derive(Debug, Clone)]
pub struct TableStore {
    storage: Arc<dyn Storage>,
    topic: String,
    table: String,
    dir: String,
    index: Arc<SortKeyIndex>,
    log: LogContext,
}

impl TableStore {
    /// Creates a store for `topic/table`. The index starts empty; call
    /// [`refresh`](Self::refresh) before use.
    pub fn new(storage: Arc<dyn Storage>, topic: &str, table: &str, log: &LogContext) -> Result<Self> {
        for part in [topic, table] {
            if part.is_empty() || part.contains('/') || part == "." || part == ".." {
                return Err(Error::invalid_argument(format!("Invalid topic or table id: {:?}", part)));
            }
        }
        Ok(Self {
            storage,
            topic: topic.to_string(),
            table: table.to_string(),
            dir: format!("{}/{}", topic, table),
            index: Arc::new(SortKeyIndex::new()),
            log: log.scoped(topic, table),
        })
    }

    /// Topic of the table.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Table identifier.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The table directory, relative to the backend root.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// The sort-key index of the table.
    pub fn index(&self) -> &SortKeyIndex {
        &self.index
    }

    /// Scoped logging context.
    pub fn log(&self) -> &LogContext {
        &self.log
    }

    /// Re-reads the directory listing into the index.
    pub fn refresh(&self) -> Result<usize> {
        let names = self.storage.list(&self.dir)?;
        Ok(self.index.rebuild(names))
    }

    fn path(&self, name: &DocName) -> String {
        storage::join(&self.dir, &name.to_string())
    }

    /// Reads and parses a stored header, refreshing its cached summary.
    pub fn read_header(&self, name: &DocName) -> Result<DocumentHeader> {
        let bytes = self.storage.read(&self.path(name))?;
        let header = DocumentHeader::from_bytes(&bytes)?;
        if header.doc_name() != *name {
            return Err(Error::corruption(format!(
                "document {} holds the header of {}",
                name,
                header.doc_name()
            )));
        }
        if self.index.contains(name) {
            self.index.insert(name.clone(), Some(header.summary()));
        }
        Ok(header)
    }

    /// Loads a document with its decoded table metadata.
    pub fn load(&self, name: &DocName) -> Result<Document> {
        let bytes = self.storage.read(&self.path(name))?;
        let document = Document::load(name.clone(), &bytes)?;
        if self.index.contains(name) {
            self.index.insert(name.clone(), Some(document.header.summary()));
        }
        Ok(document)
    }

    /// Summary of a document, read from storage on a cache miss.
    pub fn summary(&self, name: &DocName) -> Result<Arc<DocSummary>> {
        if let Some(summary) = self.index.summary(name) {
            return Ok(summary);
        }
        let summary = Arc::new(self.read_header(name)?.summary());
        Ok(summary)
    }

    /// Writes a document under the name its header implies.
    pub fn write(&self, header: &DocumentHeader) -> Result<DocName> {
        let name = header.doc_name();
        let bytes = header.to_bytes()?;
        self.storage.write(&bytes, &self.path(&name))?;
        self.index.insert(name.clone(), Some(header.summary()));
        depot_log!(Level::Trace, ctx: self.log, "write", "doc={} bytes={}", name, bytes.len());
        Ok(name)
    }

    /// Removes a document. Returns false if it was already gone.
    pub fn remove(&self, name: &DocName) -> Result<bool> {
        let removed = self.storage.remove(&self.path(name))?;
        self.index.remove(name);
        depot_log!(Level::Trace, ctx: self.log, "remove", "doc={} removed={}", name, removed);
        Ok(removed)
    }

    /// The table header, if the table has been created.
    pub fn table_header(&self) -> Result<Option<DocumentHeader>> {
        match self.index.header() {
            Some(name) => Ok(Some(self.read_header(&name)?)),
            None => Ok(None),
        }
    }

    /// The table header, failing when the table has not been created.
    pub fn require_table_header(&self) -> Result<DocumentHeader> {
        self.table_header()?
            .ok_or_else(|| Error::invalid_state(format!("Table {} has no header", self.dir)))
    }

    /// Applies a signed delta to the table header's `merged_size`.
    pub fn adjust_merged_size(&self, delta: i128) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let Some(mut header) = self.table_header()? else {
            return Ok(());
        };
        let current = header.merged_size.unwrap_or(0) as i128;
        header.merged_size = Some((current + delta).max(0) as u64);
        self.write(&header)?;
        depot_log!(
            Level::Debug,
            ctx: self.log,
            "merged_size",
            "delta={} merged_size={}",
            delta,
            header.merged_size.unwrap_or(0)
        );
        Ok(())
    }
}
