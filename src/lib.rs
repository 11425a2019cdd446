//! # Depositor - A File-Backed CDC Document Store
//!
//! Depositor stages change-data-capture payloads as size-bounded documents
//! in a flat, sorted namespace and compacts them level by level, the way an
//! LSM-tree compacts sorted runs, without a database engine underneath.
//!
//! ## Architecture
//!
//! The depositor consists of several key components:
//!
//! - **Storage**: byte-oriented blob backends (local files, memory)
//! - **Documents**: naming scheme, payload codec and size-bounded chunking
//! - **Sort-Key Index**: the ordered view derived from a table's listing
//! - **Compaction**: bucket picking, merging and crash-leftover recovery
//! - **Table Header**: the per-table singleton holding schema and aggregates
//!
//! ## On-Disk Layout
//!
//! ```text
//! <root>/<topic_id>/<table_id>/<start_seq>.header
//! <root>/<topic_id>/<table_id>/<merge_key>-<sort_key>.<initial|merged|packaged>
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use depositor::{BatchHeader, Depositor, Options, SortKeyQuery};
//! use serde_json::{json, Map};
//!
//! # fn main() -> Result<(), depositor::Error> {
//! let mut depositor = Depositor::open("./deposit", Options::default().create_if_missing(true))?;
//! depositor.set_current_topic_table("test", "aged_data")?;
//!
//! // Create the table from its field list
//! let meta = Map::new();
//! let fields = vec![json!({"field_name": "id"}).as_object().cloned().unwrap_or_default()];
//! depositor.add_document(
//!     &BatchHeader::table("test", "aged_data", "20201113222500000000", meta).with_aged(true),
//!     &fields,
//! )?;
//!
//! // Deposit the rows of age 2
//! let rows = vec![json!({"id": 1, "_AGE": 2}).as_object().cloned().unwrap_or_default()];
//! depositor.add_document(&BatchHeader::data("test", "aged_data").with_ages(2, None), &rows)?;
//!
//! // Scan documents in sort-key order
//! for name in depositor.get_stream_by_sort_key(&SortKeyQuery::new())? {
//!     println!("{}", name?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod compaction;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod logging;
pub mod patch;
pub mod storage;
pub mod table;

// Re-exports
pub use compaction::{MergeGrouping, RecoveryReport, SizeTiered};
pub use config::Options;
pub use document::{BatchHeader, DocStatus, Document, Row};
pub use error::{Error, Result};
pub use index::{DocumentStream, SortKeyQuery};
pub use logging::LogContext;
pub use patch::MetaPatch;
pub use storage::{FsStorage, MemoryStorage, Storage};

use compaction::{grouping, BucketPicker, MergeJob, MergePlan, MergeTask};
use document::chunk::{self, aged_chunks, sequence_chunks};
use document::name::{aged_key, sequence_key, validate_key};
use document::{codec, DocIdent, DocName, DocumentHeader};
use index::IndexKey;
use log::Level;
use logging::depot_log;
use serde_json::Value;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use table::TableStore;

/// Document counts and aggregates of the current table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Documents with status `initial`.
    pub initial: usize,
    /// Documents with status `merged`.
    pub merged: usize,
    /// Documents with status `packaged`.
    pub packaged: usize,
    /// `merged_size` recorded in the table header.
    pub merged_size: Option<u64>,
}

/// A chunk ready to be written as an `initial` document.
struct PlannedChunk {
    merge_key: String,
    sort_key: String,
    data: String,
    line_nb: u64,
    age: Option<u64>,
    end_age: Option<u64>,
}

/// The main depositor handle.
///
/// A depositor is bound to one storage root and, after
/// [`set_current_topic_table`](Depositor::set_current_topic_table), to one
/// table inside it.
///
/// # Thread Safety
///
/// `Depositor` is `Send + Sync` and read operations may run concurrently,
/// but mutations of one table must be serialized by the caller.
pub struct Depositor {
    /// Storage backend
    storage: Arc<dyn Storage>,

    /// Configuration options
    options: Options,

    /// Policy assigning `close_level` at add time
    grouping: Arc<dyn MergeGrouping>,

    /// Currently selected table
    table: Option<TableStore>,
}

impl Depositor {
    /// Opens a depositor on a local directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the options are invalid or the
    /// directory does not exist and `create_if_missing` is not set.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use depositor::{Depositor, Options};
    ///
    /// # fn main() -> Result<(), depositor::Error> {
    /// let depositor = Depositor::open("./deposit", Options::default().size_limit(4096))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref();
        options.validate()?;

        if !path.exists() {
            if options.create_if_missing {
                std::fs::create_dir_all(path)?;
            } else {
                return Err(Error::invalid_argument(format!(
                    "Deposit path does not exist: {:?}",
                    path
                )));
            }
        }

        let storage = FsStorage::open(path)?;
        Self::with_storage(Arc::new(storage), options)
    }

    /// Creates a depositor over any storage backend.
    pub fn with_storage(storage: Arc<dyn Storage>, options: Options) -> Result<Self> {
        options.validate()?;
        let grouping = Arc::new(SizeTiered::new(options.max_merge_level, options.level_size_multiplier));
        depot_log!(
            Level::Info,
            ctx: options.log_context,
            "open",
            "storage={:?} size_limit={}",
            storage,
            options.size_limit
        );
        Ok(Self { storage, options, grouping, table: None })
    }

    /// Replaces the merge grouping policy.
    pub fn with_grouping(mut self, grouping: Arc<dyn MergeGrouping>) -> Self {
        self.grouping = grouping;
        self
    }

    /// The options in effect.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Scopes subsequent operations to `topic/table`.
    pub fn set_current_topic_table(&mut self, topic: &str, table: &str) -> Result<()> {
        let store = TableStore::new(self.storage.clone(), topic, table, &self.options.log_context)?;
        let count = store.refresh()?;
        depot_log!(Level::Debug, ctx: store.log(), "select_table", "documents={}", count);
        self.table = Some(store);
        Ok(())
    }

    /// The current document size limit.
    pub fn size_limit(&self) -> u64 {
        self.options.size_limit
    }

    /// Changes the document size limit. Existing documents are not revisited.
    pub fn set_size_limit(&mut self, size_limit: u64) -> Result<()> {
        if size_limit == 0 {
            return Err(Error::invalid_argument("size_limit must be > 0"));
        }
        self.options.size_limit = size_limit;
        Ok(())
    }

    /// The current table, with its index refreshed from storage.
    fn current(&self) -> Result<&TableStore> {
        let store = self
            .table
            .as_ref()
            .ok_or_else(|| Error::invalid_state("No current topic and table; call set_current_topic_table"))?;
        store.refresh()?;
        Ok(store)
    }

    /// Name of the table header, or None if the table was never created.
    ///
    /// Lookup failures are logged and reported as None so callers can probe.
    pub fn get_table_header(&self) -> Option<String> {
        match self.current() {
            Ok(store) => store.index().header().map(|name| name.to_string()),
            Err(e) => {
                depot_log!(Level::Warn, ctx: self.options.log_context, "table_header_lookup", "error={}", e);
                None
            }
        }
    }

    /// Deposits one upstream batch.
    ///
    /// A batch carrying `meta-data` creates the table header, its rows being
    /// the field list. Any other batch is chunked into `initial` documents.
    /// Returns the names written, in key order.
    ///
    /// # Errors
    ///
    /// - [`Error::SizeBudget`] if one age group or row cannot fit alone
    /// - [`Error::AlreadyExists`] if the table or the key range already exists
    /// - [`Error::InvalidState`] for data batches before the table header
    pub fn add_document(&self, header: &BatchHeader, rows: &[Row]) -> Result<Vec<String>> {
        let store = self.current()?;
        for (given, current) in [(&header.topic_id, store.topic()), (&header.table_id, store.table())] {
            if !given.is_empty() && given != current {
                return Err(Error::invalid_argument(format!(
                    "Batch for {}/{} sent to table {}",
                    header.topic_id,
                    header.table_id,
                    store.dir()
                )));
            }
        }

        if header.is_table_header() {
            self.create_table(store, header, rows).map(|name| vec![name])
        } else {
            self.add_data(store, header, rows)
        }
    }

    fn create_table(&self, store: &TableStore, batch: &BatchHeader, fields: &[Row]) -> Result<String> {
        if let Some(existing) = store.index().header() {
            return Err(Error::AlreadyExists(format!("Table header {}", existing)));
        }
        let start_seq = batch
            .start_seq
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("Table header batch without start_seq"))?;
        validate_key(start_seq)?;

        let limit = self.options.size_limit;
        let meta_data = codec::encode(&batch.meta_data)?;
        if meta_data.len() as u64 > limit {
            return Err(Error::SizeBudget { size: meta_data.len() as u64, limit });
        }
        let data = chunk::encode_within(fields, limit)?;

        let mut header = DocumentHeader::new(store.topic(), store.table(), start_seq, start_seq, None);
        header.aged = batch.aged.unwrap_or(false);
        header.age = batch.age;
        header.start_seq = Some(start_seq.to_string());
        header.segment_id = batch.segment_id.clone();
        header.meta_data = Some(meta_data);
        header.merged_size = Some(0);
        header.set_data(data, fields.len() as u64);

        let name = store.write(&header)?;
        depot_log!(Level::Info, ctx: store.log(), "table_created", "header={} aged={}", name, header.aged);
        Ok(name.to_string())
    }

    fn add_data(&self, store: &TableStore, batch: &BatchHeader, rows: &[Row]) -> Result<Vec<String>> {
        let mut table_header = store.table_header()?.ok_or_else(|| {
            Error::invalid_state(format!("Table {} has no header; deposit its meta-data first", store.dir()))
        })?;
        let limit = self.options.size_limit;

        let planned = if table_header.aged {
            let age = batch.age.ok_or_else(|| Error::invalid_argument("Aged batch without age"))?;
            let start_seq = table_header.start_seq.clone().unwrap_or_else(|| table_header.sort_key.clone());
            let mut planned = Vec::new();
            for chunk in aged_chunks(age, batch.end_age, rows, limit)? {
                planned.push(PlannedChunk {
                    merge_key: aged_key(&start_seq, chunk.age)?,
                    sort_key: aged_key(&start_seq, chunk.end_age)?,
                    line_nb: chunk.rows.len() as u64,
                    data: chunk.data,
                    age: Some(chunk.age),
                    end_age: Some(chunk.end_age),
                });
            }
            planned
        } else {
            let start_seq = batch
                .start_seq
                .as_deref()
                .ok_or_else(|| Error::invalid_argument("Change-log batch without start_seq"))?;
            validate_key(start_seq)?;
            sequence_chunks(rows, limit)?
                .into_iter()
                .map(|chunk| {
                    let key = sequence_key(start_seq, chunk.index);
                    PlannedChunk {
                        merge_key: key.clone(),
                        sort_key: key,
                        line_nb: chunk.rows.len() as u64,
                        data: chunk.data,
                        age: None,
                        end_age: None,
                    }
                })
                .collect()
        };

        if let (Some(first), Some(last)) = (planned.first(), planned.last()) {
            self.check_free_range(store, &first.merge_key, &last.sort_key)?;
        }

        let mut pending = table_header.merge_pending.clone();
        let mut names = Vec::with_capacity(planned.len());
        for chunk in planned {
            let mut header = DocumentHeader::new(
                store.topic(),
                store.table(),
                chunk.merge_key,
                chunk.sort_key,
                Some(DocStatus::Initial),
            );
            header.aged = table_header.aged;
            header.age = chunk.age;
            header.end_age = chunk.end_age;
            header.start_seq = batch.start_seq.clone();
            header.segment_id = batch.segment_id.clone();
            header.set_data(chunk.data, chunk.line_nb);
            header.close_level = self.grouping.close_level(&mut pending, header.data_size, limit);

            let name = store.write(&header)?;
            depot_log!(
                Level::Debug,
                ctx: store.log(),
                "document_added",
                "doc={} rows={} data_size={} close_level={}",
                name,
                header.line_nb,
                header.data_size,
                header.close_level
            );
            names.push(name.to_string());
        }

        if pending != table_header.merge_pending {
            table_header.merge_pending = pending;
            store.write(&table_header)?;
        }
        Ok(names)
    }

    /// Fails if a stored data document intersects `[low, high]`.
    fn check_free_range(&self, store: &TableStore, low: &str, high: &str) -> Result<()> {
        let index = store.index();
        let mut cursor = Bound::Included(IndexKey::lowest(low));
        while let Some((key, entry)) = index.step(cursor.as_ref(), false) {
            if entry.name.is_header() {
                cursor = Bound::Excluded(key);
                continue;
            }
            let overlaps = entry.name.merge_key() <= high || store.summary(&entry.name)?.first_key.as_str() <= high;
            if overlaps {
                return Err(Error::AlreadyExists(format!(
                    "Key range {}-{} overlaps {}",
                    low, high, entry.name
                )));
            }
            break;
        }
        Ok(())
    }

    /// Merges the bucket anchored at `merge_key` from level `level - 1` to
    /// `level`.
    ///
    /// Returns false, with nothing changed, when the bucket is not ready:
    /// no table, a missing or inconsistent input, or a merged payload over
    /// the size limit. A ready merge first sweeps leftovers of interrupted
    /// merges, then picks its bucket again if the sweep removed anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for level 0.
    pub fn merge_documents(&self, merge_key: &str, level: u32) -> Result<bool> {
        if level == 0 {
            return Err(Error::invalid_argument("Merge level must be >= 1"));
        }
        let store = self.current()?;
        let prepare = |store: &TableStore| -> Result<Option<(MergeTask, MergePlan)>> {
            let Some(task) = BucketPicker::new(store).pick(merge_key, level)? else {
                return Ok(None);
            };
            let plan = MergeJob::new(store, task.clone(), self.options.size_limit).plan()?;
            Ok(plan.map(|plan| (task, plan)))
        };

        let Some(mut planned) = prepare(store)? else {
            return Ok(false);
        };
        if !compaction::recover(store)?.removed.is_empty() {
            let Some(replanned) = prepare(store)? else {
                return Ok(false);
            };
            planned = replanned;
        }
        let (task, plan) = planned;
        MergeJob::new(store, task, self.options.size_limit).commit(plan)?;
        Ok(true)
    }

    /// Patches a document's metadata and optionally replaces its rows.
    ///
    /// A `merge_status` patch moves a data document forward in its lifecycle
    /// and renames it. Returns the document's name after the update.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for protected fields, backward status
    ///   changes or values of the wrong type
    /// - [`Error::SizeBudget`] if the new rows do not fit; nothing is written
    pub fn update_document(&self, name: &str, patches: &[MetaPatch], data: Option<&[Row]>) -> Result<String> {
        let store = self.current()?;
        let old_name: DocName = name.parse()?;
        if !store.index().contains(&old_name) {
            return Err(Error::not_found(name.to_string()));
        }
        let old = store.read_header(&old_name)?;

        let fields = match serde_json::to_value(&old)? {
            Value::Object(fields) => fields,
            _ => return Err(Error::corruption(format!("Header of {} is not an object", name))),
        };
        let fields = patch::apply(fields, patches)?;
        let mut new: DocumentHeader = serde_json::from_value(Value::Object(fields))
            .map_err(|e| Error::invalid_argument(format!("Invalid patch for {}: {}", name, e)))?;

        match (old.merge_status, new.merge_status) {
            (None, None) => {}
            (Some(before), Some(after)) if after >= before => {}
            (before, after) => {
                return Err(Error::invalid_argument(format!(
                    "Status of {} cannot change from {:?} to {:?}",
                    name, before, after
                )));
            }
        }

        if let Some(rows) = data {
            let encoded = chunk::encode_within(rows, self.options.size_limit)?;
            new.set_data(encoded, rows.len() as u64);
        }

        let new_name = store.write(&new)?;
        if new_name != old_name {
            store.remove(&old_name)?;
        }

        let contribution = |h: &DocumentHeader| -> i128 {
            if h.merge_status == Some(DocStatus::Merged) {
                h.data_size as i128
            } else {
                0
            }
        };
        store.adjust_merged_size(contribution(&new) - contribution(&old))?;

        depot_log!(Level::Debug, ctx: store.log(), "document_updated", "from={} to={}", old_name, new_name);
        Ok(new_name.to_string())
    }

    /// Removes documents by identifier.
    ///
    /// Data identifiers (`<merge_key>-<sort_key>`, with or without a status
    /// suffix) match the key pair under any status; header identifiers must
    /// match exactly. Returns true if anything was removed.
    pub fn delete_documents(&self, names: &[&str]) -> Result<bool> {
        let store = self.current()?;
        let idents = names.iter().map(|id| DocIdent::parse(id)).collect::<Result<Vec<_>>>()?;

        let mut removed_any = false;
        let mut released = 0u64;
        for entry in store.index().snapshot() {
            if !idents.iter().any(|ident| ident.matches(&entry.name)) {
                continue;
            }
            if entry.name.status() == Some(DocStatus::Merged) {
                released += store.summary(&entry.name)?.data_size;
            }
            if store.remove(&entry.name)? {
                depot_log!(Level::Info, ctx: store.log(), "document_deleted", "doc={}", entry.name);
                removed_any = true;
            }
        }
        store.adjust_merged_size(-(released as i128))?;
        Ok(removed_any)
    }

    /// Scans document names in sort-key order.
    ///
    /// The stream is lazy and owns its own table handle; it can be dropped
    /// early, cloned, or rewound.
    pub fn get_stream_by_sort_key(&self, query: &SortKeyQuery) -> Result<DocumentStream> {
        let store = self.current()?;
        Ok(DocumentStream::new(store.clone(), query.clone()))
    }

    /// Name of the data document whose range starts at `merge_key`.
    pub fn get_ref_by_merge_key(&self, merge_key: &str) -> Result<Option<String>> {
        let store = self.current()?;
        Ok(store.index().find_by_merge_key(merge_key).map(|name| name.to_string()))
    }

    /// Loads a document by name, with its table metadata decoded.
    pub fn get_header_from_ref(&self, name: &str) -> Result<Document> {
        let store = self.current()?;
        let name: DocName = name.parse()?;
        store.load(&name)
    }

    /// Decodes the rows of a loaded document, verifying its checksum.
    pub fn get_data_from_header(&self, document: &Document) -> Result<Vec<Row>> {
        document.header.decode_data()
    }

    /// Marks the newest data document as closing `level`, so that a
    /// trailing bucket which will receive no more documents can be merged.
    ///
    /// Returns false if there is nothing to seal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for level 0 or a level above the
    /// grouping policy's highest level.
    pub fn seal_tail(&self, level: u32) -> Result<bool> {
        if level == 0 {
            return Err(Error::invalid_argument("Seal level must be >= 1"));
        }
        let max_level = self.grouping.max_level();
        if level > max_level {
            return Err(Error::invalid_argument(format!(
                "Seal level {} above the highest merge level {}",
                level, max_level
            )));
        }
        let store = self.current()?;
        let Some(mut table_header) = store.table_header()? else {
            return Ok(false);
        };
        let Some(last) = store.index().last_data() else {
            return Ok(false);
        };
        if last.name.status() == Some(DocStatus::Packaged) {
            return Ok(false);
        }

        let mut header = store.read_header(&last.name)?;
        if header.close_level >= level {
            return Ok(false);
        }
        header.close_level = level;
        store.write(&header)?;

        grouping::reset_pending(&mut table_header.merge_pending, level);
        store.write(&table_header)?;
        depot_log!(Level::Info, ctx: store.log(), "tail_sealed", "doc={} level={}", last.name, level);
        Ok(true)
    }

    /// Removes leftovers of interrupted merges and status changes and
    /// repairs `merged_size`.
    pub fn recover(&self) -> Result<RecoveryReport> {
        compaction::recover(self.current()?)
    }

    /// Document counts per status and the recorded `merged_size`.
    pub fn table_stats(&self) -> Result<TableStats> {
        let store = self.current()?;
        let mut stats = TableStats::default();
        for entry in store.index().snapshot() {
            match entry.name.status() {
                Some(DocStatus::Initial) => stats.initial += 1,
                Some(DocStatus::Merged) => stats.merged += 1,
                Some(DocStatus::Packaged) => stats.packaged += 1,
                None => {}
            }
        }
        stats.merged_size = store.table_header()?.and_then(|h| h.merged_size);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    fn row(value: Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    fn memory_depositor(size_limit: u64) -> Depositor {
        let storage = Arc::new(MemoryStorage::new());
        let mut depositor = Depositor::with_storage(storage, Options::default().size_limit(size_limit)).unwrap();
        depositor.set_current_topic_table("test", "aged_data").unwrap();
        depositor
    }

    fn create_aged_table(depositor: &Depositor) {
        let meta = json!({"description": "people"}).as_object().cloned().unwrap();
        let header = BatchHeader::table("test", "aged_data", "20201113222500000000", meta).with_aged(true);
        depositor.add_document(&header, &[row(json!({"field_name": "id"}))]).unwrap();
    }

    #[test]
    fn test_depositor_open() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Depositor::open(temp_dir.path(), Options::default()).is_ok());
        assert!(matches!(
            Depositor::open(temp_dir.path().join("wrong_path"), Options::default()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Depositor::open(temp_dir.path().join("new"), Options::default().create_if_missing(true)).is_ok());
    }

    #[test]
    fn test_operations_need_a_table() {
        let depositor = Depositor::with_storage(Arc::new(MemoryStorage::new()), Options::default()).unwrap();
        assert!(depositor.get_table_header().is_none());
        assert!(matches!(depositor.merge_documents("1", 1), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_create_table_once() {
        let depositor = memory_depositor(4096);
        assert!(depositor.get_table_header().is_none());
        create_aged_table(&depositor);
        assert_eq!(depositor.get_table_header().unwrap(), "20201113222500000000.header");

        let doc = depositor.get_header_from_ref("20201113222500000000.header").unwrap();
        assert_eq!(doc.merged_size(), Some(0));
        assert_eq!(doc.meta_data.as_ref().unwrap().get("description"), Some(&json!("people")));
        assert_eq!(depositor.get_data_from_header(&doc).unwrap().len(), 1);

        let again = BatchHeader::table("test", "aged_data", "20201113222500000000", Map::new());
        assert!(matches!(depositor.add_document(&again, &[]), Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_data_before_table_is_invalid_state() {
        let depositor = memory_depositor(4096);
        let batch = BatchHeader::data("test", "aged_data").with_ages(2, None);
        assert!(matches!(depositor.add_document(&batch, &[]), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_batch_for_other_table_rejected() {
        let depositor = memory_depositor(4096);
        create_aged_table(&depositor);
        let batch = BatchHeader::data("test", "other").with_ages(2, None);
        assert!(matches!(depositor.add_document(&batch, &[]), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_aged_names_and_overlap() {
        let depositor = memory_depositor(4096);
        create_aged_table(&depositor);

        let rows = vec![row(json!({"id": 1, "_AGE": 2})), row(json!({"id": 2, "_AGE": 3}))];
        let batch = BatchHeader::data("test", "aged_data").with_ages(2, Some(5)).with_segment("s1");
        let names = depositor.add_document(&batch, &rows).unwrap();
        assert_eq!(names, vec!["20201113222500000002-20201113222500000005.initial"]);

        let doc = depositor.get_header_from_ref(&names[0]).unwrap();
        assert_eq!(doc.header.segment_id.as_deref(), Some("s1"));
        assert_eq!((doc.header.age, doc.header.end_age), (Some(2), Some(5)));

        let overlapping = BatchHeader::data("test", "aged_data").with_ages(4, Some(6));
        assert!(matches!(depositor.add_document(&overlapping, &[]), Err(Error::AlreadyExists(_))));
        let inside = BatchHeader::data("test", "aged_data").with_ages(1, Some(9));
        assert!(matches!(depositor.add_document(&inside, &[]), Err(Error::AlreadyExists(_))));

        let after = BatchHeader::data("test", "aged_data").with_ages(6, None);
        assert!(depositor.add_document(&after, &[]).is_ok());
    }

    #[test]
    fn test_size_budget_leaves_nothing_behind() {
        let depositor = memory_depositor(4096);
        create_aged_table(&depositor);
        let before = depositor.table_stats().unwrap();

        let mut depositor = depositor;
        depositor.set_size_limit(16).unwrap();
        let rows = vec![row(json!({"id": 1, "_AGE": 2, "name": "a row that cannot fit"}))];
        let err = depositor
            .add_document(&BatchHeader::data("test", "aged_data").with_ages(2, None), &rows)
            .unwrap_err();
        assert!(err.is_size_budget());
        assert_eq!(depositor.table_stats().unwrap(), before);
        assert!(depositor.set_size_limit(0).is_err());
    }

    #[test]
    fn test_merge_level_zero_is_an_error() {
        let depositor = memory_depositor(4096);
        assert!(matches!(depositor.merge_documents("1", 0), Err(Error::InvalidArgument(_))));
        assert!(!depositor.merge_documents("1", 1).unwrap());
    }

    #[test]
    fn test_update_status_moves_forward_only() {
        let depositor = memory_depositor(4096);
        create_aged_table(&depositor);
        let batch = BatchHeader::data("test", "aged_data").with_ages(2, None);
        let name = depositor.add_document(&batch, &[row(json!({"id": 1}))]).unwrap().remove(0);

        let packaged = depositor
            .update_document(&name, &[MetaPatch::set("merge_status", "packaged")], None)
            .unwrap();
        assert_eq!(packaged, "20201113222500000002-20201113222500000002.packaged");
        assert!(depositor.get_header_from_ref(&name).is_err());

        let err = depositor.update_document(&packaged, &[MetaPatch::set("merge_status", "initial")], None);
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
        let err = depositor.update_document(&packaged, &[MetaPatch::set("merge_status", "bogus")], None);
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
        let err = depositor.update_document(&packaged, &[MetaPatch::delete("merge_status")], None);
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_seal_tail() {
        let depositor = memory_depositor(1 << 20);
        assert!(!depositor.seal_tail(1).unwrap());
        create_aged_table(&depositor);
        assert!(!depositor.seal_tail(1).unwrap());

        let batch = BatchHeader::data("test", "aged_data").with_ages(2, None);
        let name = depositor.add_document(&batch, &[row(json!({"id": 1}))]).unwrap().remove(0);
        assert!(!depositor.merge_documents("20201113222500000002", 1).unwrap());

        assert!(depositor.seal_tail(2).unwrap());
        assert!(!depositor.seal_tail(2).unwrap());
        assert_eq!(depositor.get_header_from_ref(&name).unwrap().header.close_level, 2);
        assert!(depositor.merge_documents("20201113222500000002", 1).unwrap());
        assert!(matches!(depositor.seal_tail(0), Err(Error::InvalidArgument(_))));
        assert!(matches!(depositor.seal_tail(4), Err(Error::InvalidArgument(_))));
    }
}
