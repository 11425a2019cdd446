//! Compaction module for merging table documents.
//!
//! This module implements the merge process that combines the documents of
//! one bucket into a single larger `merged` document.
//!
//! ## Merge Strategy
//!
//! Levels are assigned at add time by a [`MergeGrouping`] policy:
//! - Level 0: documents as added (`initial`)
//! - Level L: one document per level-L bucket (`merged`, `merge_level = L`)
//! - A level-L bucket is made of the level-(L-1) documents closed by it
//!
//! ## Process
//!
//! 1. Pick the bucket inputs (picker.rs)
//! 2. Concatenate their rows and apply the size gate ([`MergeJob::plan`])
//! 3. Sweep leftovers of interrupted merges ([`recover`])
//! 4. Write the output under the anchor's key pair
//! 5. Delete the inputs
//! 6. Update `merged_size` in the table header

pub mod grouping;
pub mod picker;

pub use grouping::{level_budget, MergeGrouping, SizeTiered};
pub use picker::{BucketPicker, MergeTask};

use crate::document::{chunk, DocName, DocStatus, DocSummary, DocumentHeader, Row};
use crate::error::Result;
use crate::logging::depot_log;
use crate::table::TableStore;
use log::Level;
use std::sync::Arc;

/// Merge job that executes one picked task
pub struct MergeJob<'a> {
    store: &'a TableStore,
    task: MergeTask,
    size_limit: u64,
}

impl<'a> MergeJob<'a> {
    /// Create a new merge job
    pub fn new(store: &'a TableStore, task: MergeTask, size_limit: u64) -> Self {
        Self { store, task, size_limit }
    }

    /// Execute the merge
    ///
    /// Returns None, with nothing written, when the merged payload does not
    /// fit within the size limit.
    pub fn run(&self) -> Result<Option<MergeResult>> {
        match self.plan()? {
            Some(plan) => self.commit(plan).map(Some),
            None => Ok(None),
        }
    }

    /// Reads the inputs and builds the output document without writing
    /// anything. Returns None when the output would exceed the size limit.
    pub fn plan(&self) -> Result<Option<MergePlan>> {
        let log = self.store.log();
        let mut headers = Vec::with_capacity(self.task.inputs.len());
        let mut rows: Vec<Row> = Vec::new();
        for name in &self.task.inputs {
            let header = self.store.read_header(name)?;
            rows.extend(header.decode_data::<Vec<Row>>()?);
            headers.push(header);
        }

        let data = match chunk::encode_within(&rows, self.size_limit) {
            Ok(data) => data,
            Err(e) if e.is_size_budget() => {
                depot_log!(Level::Info, ctx: log, "merge_over_budget", "anchor={} {}", self.task.anchor, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let (first, anchor) = match (headers.first(), headers.last()) {
            (Some(first), Some(anchor)) => (first, anchor),
            _ => return Ok(None),
        };
        let mut output = anchor.clone();
        output.merge_status = Some(DocStatus::Merged);
        output.merge_level = self.task.level;
        output.first_key = first.first_key.clone();
        output.age = first.age;
        output.set_data(data, rows.len() as u64);

        let released = headers
            .iter()
            .filter(|header| header.merge_status == Some(DocStatus::Merged))
            .map(|header| header.data_size)
            .sum();
        Ok(Some(MergePlan { output, released }))
    }

    /// Writes a planned output, removes the inputs and updates `merged_size`.
    pub fn commit(&self, plan: MergePlan) -> Result<MergeResult> {
        let log = self.store.log();
        depot_log!(
            Level::Info,
            ctx: log,
            "merge_start",
            "anchor={} inputs={} level={}",
            self.task.anchor,
            self.task.inputs.len(),
            self.task.level
        );

        let MergePlan { output, released } = plan;
        let output_name = self.store.write(&output)?;
        for name in &self.task.inputs {
            if *name != output_name {
                self.store.remove(name)?;
            }
        }
        self.store.adjust_merged_size(output.data_size as i128 - released as i128)?;

        depot_log!(
            Level::Info,
            ctx: log,
            "merge_done",
            "output={} rows={} data_size={}",
            output_name,
            output.line_nb,
            output.data_size
        );
        Ok(MergeResult {
            output: output_name,
            input_count: self.task.inputs.len(),
            line_nb: output.line_nb,
            data_size: output.data_size,
        })
    }
}

/// Output of a merge, built but not yet written.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    /// The merged document.
    pub output: DocumentHeader,
    /// `data_size` of the merged inputs it replaces.
    pub released: u64,
}

/// Result of a merge operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// Name of the merged document
    pub output: DocName,
    /// Number of documents consumed
    pub input_count: usize,
    /// Rows in the merged document
    pub line_nb: u64,
    /// Encoded size of the merged document
    pub data_size: u64,
}

/// Outcome of a [`recover`] sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Documents removed as superseded.
    pub removed: Vec<String>,
    /// `merged_size` after the sweep.
    pub merged_size: u64,
    /// Whether the table header had to be rewritten.
    pub header_repaired: bool,
}

/// Removes the leftovers of interrupted merges and status changes, then
/// makes `merged_size` agree with the remaining merged documents.
///
/// A document is superseded when another copy of its key pair has a more
/// advanced status, or when a document of a higher merge level covers its
/// whole range.
pub fn recover(store: &TableStore) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let Some(mut table_header) = store.table_header()? else {
        return Ok(report);
    };

    let mut docs: Vec<(DocName, Arc<DocSummary>)> = Vec::new();
    for entry in store.index().snapshot() {
        if entry.name.is_header() {
            continue;
        }
        let summary = match entry.summary {
            Some(summary) => summary,
            None => store.summary(&entry.name)?,
        };
        // Copies of one key pair are adjacent, lowest status first.
        if docs.last().is_some_and(|(previous, _)| previous.same_identity(&entry.name)) {
            if let Some((stale, _)) = docs.pop() {
                if store.remove(&stale)? {
                    report.removed.push(stale.to_string());
                }
            }
        }
        docs.push((entry.name, summary));
    }

    let mut covered = vec![false; docs.len()];
    for (pos, (cover, cover_summary)) in docs.iter().enumerate() {
        if cover.status() == Some(DocStatus::Initial) || cover_summary.merge_level == 0 {
            continue;
        }
        for inner in (0..pos).rev() {
            let (name, summary) = &docs[inner];
            if name.sort_key() < cover_summary.first_key.as_str() {
                break;
            }
            if summary.first_key >= cover_summary.first_key && summary.merge_level < cover_summary.merge_level {
                covered[inner] = true;
            }
        }
    }
    let mut merged_size = 0u64;
    for ((name, summary), covered) in docs.iter().zip(covered) {
        if covered {
            if store.remove(name)? {
                report.removed.push(name.to_string());
            }
        } else if name.status() == Some(DocStatus::Merged) {
            merged_size += summary.data_size;
        }
    }

    report.merged_size = merged_size;
    if table_header.merged_size != Some(merged_size) {
        depot_log!(
            Level::Warn,
            ctx: store.log(),
            "merged_size_repaired",
            "recorded={:?} actual={}",
            table_header.merged_size,
            merged_size
        );
        table_header.merged_size = Some(merged_size);
        store.write(&table_header)?;
        report.header_repaired = true;
    }
    if !report.removed.is_empty() {
        depot_log!(Level::Warn, ctx: store.log(), "recovered", "removed={:?}", report.removed);
    }
    Ok(report)
}
