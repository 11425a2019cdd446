//! Merge bucket picker.
//!
//! This module finds the inputs of a `(merge_key, level)` merge, or reports
//! that the bucket is not ready.

use crate::document::name::{sequence_key, sequence_position};
use crate::document::{DocName, DocStatus, DocSummary};
use crate::error::Result;
use crate::logging::depot_log;
use crate::table::TableStore;
use log::Level;

/// A merge selected by the picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTask {
    /// Document closing the bucket; the output keeps its key pair
    pub anchor: DocName,
    /// Bucket members, oldest first, anchor last
    pub inputs: Vec<DocName>,
    /// Target merge level
    pub level: u32,
}

/// Picker for merge buckets
pub struct BucketPicker<'a> {
    store: &'a TableStore,
}

impl<'a> BucketPicker<'a> {
    /// Create a new picker over a table
    pub fn new(store: &'a TableStore) -> Self {
        Self { store }
    }

    /// Status every input of a level-`level` merge must have.
    pub fn input_status(level: u32) -> DocStatus {
        if level <= 1 {
            DocStatus::Initial
        } else {
            DocStatus::Merged
        }
    }

    /// Pick the bucket anchored at `merge_key` for a merge to `level`.
    ///
    /// Returns None if any input is missing or inconsistent. Inputs must be
    /// gap-free: each one starts right where the previous one ends, and the
    /// oldest one right after the previous bucket boundary.
    pub fn pick(&self, merge_key: &str, level: u32) -> Result<Option<MergeTask>> {
        let index = self.store.index();
        let log = self.store.log();

        if index.header().is_none() {
            depot_log!(Level::Debug, ctx: log, "merge_not_ready", "reason=no_table_header");
            return Ok(None);
        }
        let Some(anchor) = index.find_by_merge_key(merge_key) else {
            depot_log!(Level::Debug, ctx: log, "merge_not_ready", "reason=no_anchor key={}", merge_key);
            return Ok(None);
        };

        let expected = Self::input_status(level);
        let summary = self.store.summary(&anchor)?;
        if anchor.status() != Some(expected)
            || summary.merge_level + 1 != level
            || summary.close_level < level
        {
            depot_log!(
                Level::Debug,
                ctx: log,
                "merge_not_ready",
                "reason=anchor doc={} merge_level={} close_level={} level={}",
                anchor,
                summary.merge_level,
                summary.close_level,
                level
            );
            return Ok(None);
        }

        let mut inputs = vec![anchor.clone()];
        let mut oldest = (anchor.clone(), summary);
        let mut bounded = false;
        for entry in index.data_before(&anchor) {
            let summary = match &entry.summary {
                Some(summary) => summary.clone(),
                None => self.store.summary(&entry.name)?,
            };
            if !follows(&entry.name, &summary, &oldest.1) {
                depot_log!(
                    Level::Debug,
                    ctx: log,
                    "merge_not_ready",
                    "reason=gap doc={} next={} level={}",
                    entry.name,
                    oldest.0,
                    level
                );
                return Ok(None);
            }
            if summary.close_level >= level {
                bounded = true;
                break;
            }
            if entry.name.status() != Some(expected) || summary.merge_level + 1 != level {
                depot_log!(
                    Level::Debug,
                    ctx: log,
                    "merge_not_ready",
                    "reason=sibling doc={} merge_level={} level={}",
                    entry.name,
                    summary.merge_level,
                    level
                );
                return Ok(None);
            }
            inputs.push(entry.name.clone());
            oldest = (entry.name, summary);
        }
        // Nothing precedes the oldest input, so it must open its batch.
        if !bounded && oldest.1.age.is_none() && sequence_position(&oldest.1.first_key).1 != 0 {
            depot_log!(Level::Debug, ctx: log, "merge_not_ready", "reason=gap next={} level={}", oldest.0, level);
            return Ok(None);
        }
        inputs.reverse();

        Ok(Some(MergeTask { anchor, inputs, level }))
    }
}

/// Whether `next` starts right after `prev`, named `prev_name`, ends.
///
/// Aged documents chain by age. A change-log chunk other than the first of
/// its batch must follow the previous chunk of the same batch; a batch start
/// may follow anything.
fn follows(prev_name: &DocName, prev: &DocSummary, next: &DocSummary) -> bool {
    if let (Some(end_age), Some(age)) = (prev.end_age, next.age) {
        return end_age.checked_add(1) == Some(age);
    }
    match sequence_position(&next.first_key) {
        (_, 0) => true,
        (start_seq, index) => prev_name.sort_key() == sequence_key(start_seq, index - 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{codec, DocumentHeader, Row};
    use crate::logging::LogContext;
    use crate::storage::MemoryStorage;
    use serde_json::Map;
    use std::sync::Arc;

    fn doc(key: &str, status: Option<DocStatus>, merge_level: u32, close_level: u32) -> DocumentHeader {
        let mut header = DocumentHeader {
            topic_id: "t".into(),
            table_id: "a".into(),
            merge_key: key.into(),
            sort_key: key.into(),
            first_key: key.into(),
            merge_status: status,
            merge_level,
            close_level,
            aged: true,
            age: None,
            end_age: None,
            start_seq: None,
            segment_id: None,
            meta_data: None,
            merged_size: status.is_none().then_some(0),
            merge_pending: Vec::new(),
            line_nb: 0,
            data_size: 0,
            data_crc: 0,
            data: String::new(),
            extra: Map::new(),
        };
        header.set_data(codec::encode(&Vec::<Row>::new()).unwrap(), 0);
        header
    }

    fn store(docs: &[DocumentHeader]) -> TableStore {
        let store = TableStore::new(Arc::new(MemoryStorage::new()), "t", "a", &LogContext::default()).unwrap();
        for d in docs {
            store.write(d).unwrap();
        }
        store
    }

    fn names(task: &MergeTask) -> Vec<String> {
        task.inputs.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_pick_level_one_bucket() {
        let store = store(&[
            doc("0000", None, 0, 0),
            doc("0001", Some(DocStatus::Initial), 0, 1),
            doc("0002", Some(DocStatus::Initial), 0, 0),
            doc("0003", Some(DocStatus::Initial), 0, 0),
            doc("0004", Some(DocStatus::Initial), 0, 2),
        ]);
        let picker = BucketPicker::new(&store);

        let task = picker.pick("0004", 1).unwrap().unwrap();
        assert_eq!(names(&task), vec!["0002-0002.initial", "0003-0003.initial", "0004-0004.initial"]);

        let task = picker.pick("0001", 1).unwrap().unwrap();
        assert_eq!(names(&task), vec!["0001-0001.initial"]);
    }

    #[test]
    fn test_not_ready_cases() {
        let store = store(&[
            doc("0000", None, 0, 0),
            doc("0001", Some(DocStatus::Initial), 0, 0),
            doc("0002", Some(DocStatus::Initial), 0, 1),
            doc("0003", Some(DocStatus::Merged), 1, 1),
            doc("0004", Some(DocStatus::Initial), 0, 2),
        ]);
        let picker = BucketPicker::new(&store);

        // Anchor does not close the level.
        assert!(picker.pick("0001", 1).unwrap().is_none());
        // Level 2 needs a merged anchor.
        assert!(picker.pick("0004", 2).unwrap().is_none());
        // Unknown key.
        assert!(picker.pick("0009", 1).unwrap().is_none());
        // A previous anchor bounds the bucket.
        assert_eq!(names(&picker.pick("0004", 1).unwrap().unwrap()), vec!["0004-0004.initial"]);
        // Closes level 1 only.
        assert!(picker.pick("0003", 2).unwrap().is_none());
    }

    #[test]
    fn test_level_two_requires_merged_siblings() {
        let store = store(&[
            doc("0000", None, 0, 0),
            doc("0001", Some(DocStatus::Merged), 1, 1),
            doc("0002", Some(DocStatus::Initial), 0, 0),
            doc("0003", Some(DocStatus::Merged), 1, 2),
        ]);
        let picker = BucketPicker::new(&store);
        assert!(picker.pick("0003", 2).unwrap().is_none());

        store.remove(&"0002-0002.initial".parse().unwrap()).unwrap();
        let task = picker.pick("0003", 2).unwrap().unwrap();
        assert_eq!(names(&task), vec!["0001-0001.merged", "0003-0003.merged"]);
    }

    #[test]
    fn test_age_gap_is_not_ready() {
        let aged = |key: &str, age: u64, close_level: u32| {
            let mut header = doc(key, Some(DocStatus::Initial), 0, close_level);
            header.age = Some(age);
            header.end_age = Some(age);
            header
        };
        let store = store(&[
            doc("0000", None, 0, 0),
            aged("0001", 1, 1),
            aged("0002", 2, 0),
            aged("0004", 4, 1),
        ]);
        let picker = BucketPicker::new(&store);
        assert!(picker.pick("0004", 1).unwrap().is_none());

        store.write(&aged("0003", 3, 0)).unwrap();
        let task = picker.pick("0004", 1).unwrap().unwrap();
        assert_eq!(names(&task), vec!["0002-0002.initial", "0003-0003.initial", "0004-0004.initial"]);

        // The previous boundary must end right before the bucket.
        store.remove(&"0001-0001.initial".parse().unwrap()).unwrap();
        store.write(&aged("0000", 0, 1)).unwrap();
        assert!(picker.pick("0004", 1).unwrap().is_none());
    }

    #[test]
    fn test_missing_sequence_chunk_is_not_ready() {
        let store = store(&[
            doc("0000", None, 0, 0),
            doc("0100", Some(DocStatus::Initial), 0, 0),
            doc("0100_000002", Some(DocStatus::Initial), 0, 1),
        ]);
        let picker = BucketPicker::new(&store);
        assert!(picker.pick("0100_000002", 1).unwrap().is_none());

        store.write(&doc("0100_000001", Some(DocStatus::Initial), 0, 0)).unwrap();
        assert_eq!(picker.pick("0100_000002", 1).unwrap().unwrap().inputs.len(), 3);

        // A bucket may not start in the middle of a batch.
        store.remove(&"0100-0100.initial".parse().unwrap()).unwrap();
        assert!(picker.pick("0100_000002", 1).unwrap().is_none());
    }

    #[test]
    fn test_no_header_is_not_ready() {
        let store = store(&[doc("0001", Some(DocStatus::Initial), 0, 1)]);
        assert!(BucketPicker::new(&store).pick("0001", 1).unwrap().is_none());
    }
}
