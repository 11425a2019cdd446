//! Document naming scheme.
//!
//! A document's identity is fully encoded in its name:
//!
//! ```text
//! <sort_key>.header                   table header
//! <merge_key>-<sort_key>.<status>     data document
//! ```
//!
//! Keys are opaque, lexicographically sortable strings and may not contain
//! `-`, `.` or `/`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Suffix of table header documents.
pub const HEADER_SUFFIX: &str = "header";

/// Lifecycle status of a data document.
///
/// Ordered by lifecycle: `Initial < Merged < Packaged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    /// Freshly added, not yet compacted.
    Initial,
    /// Produced by compaction.
    Merged,
    /// Applied downstream. Terminal.
    Packaged,
}

impl DocStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [DocStatus; 3] = [DocStatus::Initial, DocStatus::Merged, DocStatus::Packaged];

    /// The file name suffix of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            DocStatus::Initial => "initial",
            DocStatus::Merged => "merged",
            DocStatus::Packaged => "packaged",
        }
    }

    /// Parses a file name suffix.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "initial" => Some(DocStatus::Initial),
            "merged" => Some(DocStatus::Merged),
            "packaged" => Some(DocStatus::Packaged),
            _ => None,
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed document name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocName {
    /// The singleton table header, keyed by the table creation key.
    Header {
        /// Table creation key (the table's `start_seq`).
        key: String,
    },
    /// A data document covering `[merge_key, sort_key]`.
    Data {
        /// Start of the key range, used for merge grouping.
        merge_key: String,
        /// End of the key range, used for ordering and search.
        sort_key: String,
        /// Lifecycle status.
        status: DocStatus,
    },
}

impl DocName {
    /// Creates a header name.
    pub fn header(key: impl Into<String>) -> Self {
        DocName::Header { key: key.into() }
    }

    /// Creates a data document name.
    pub fn data(merge_key: impl Into<String>, sort_key: impl Into<String>, status: DocStatus) -> Self {
        DocName::Data { merge_key: merge_key.into(), sort_key: sort_key.into(), status }
    }

    /// Whether this names a table header.
    pub fn is_header(&self) -> bool {
        matches!(self, DocName::Header { .. })
    }

    /// Key used for ordering and range search.
    pub fn sort_key(&self) -> &str {
        match self {
            DocName::Header { key } => key,
            DocName::Data { sort_key, .. } => sort_key,
        }
    }

    /// Key used for merge grouping. Headers use their only key.
    pub fn merge_key(&self) -> &str {
        match self {
            DocName::Header { key } => key,
            DocName::Data { merge_key, .. } => merge_key,
        }
    }

    /// Status of a data document, `None` for headers.
    pub fn status(&self) -> Option<DocStatus> {
        match self {
            DocName::Header { .. } => None,
            DocName::Data { status, .. } => Some(*status),
        }
    }

    /// The same key pair with another status. Headers are returned unchanged.
    pub fn with_status(&self, new_status: DocStatus) -> Self {
        match self {
            DocName::Header { .. } => self.clone(),
            DocName::Data { merge_key, sort_key, .. } => {
                DocName::data(merge_key.clone(), sort_key.clone(), new_status)
            }
        }
    }

    /// Whether `other` names the same key pair (any status) or the same header.
    pub fn same_identity(&self, other: &DocName) -> bool {
        match (self, other) {
            (DocName::Header { key: a }, DocName::Header { key: b }) => a == b,
            (
                DocName::Data { merge_key: m1, sort_key: s1, .. },
                DocName::Data { merge_key: m2, sort_key: s2, .. },
            ) => m1 == m2 && s1 == s2,
            _ => false,
        }
    }
}

impl fmt::Display for DocName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocName::Header { key } => write!(f, "{}.{}", key, HEADER_SUFFIX),
            DocName::Data { merge_key, sort_key, status } => {
                write!(f, "{}-{}.{}", merge_key, sort_key, status)
            }
        }
    }
}

impl FromStr for DocName {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        let (stem, suffix) = name
            .rsplit_once('.')
            .ok_or_else(|| Error::invalid_argument(format!("Document name without suffix: {}", name)))?;

        if suffix == HEADER_SUFFIX {
            validate_key(stem)?;
            return Ok(DocName::header(stem));
        }

        let status = DocStatus::from_suffix(suffix)
            .ok_or_else(|| Error::invalid_argument(format!("Unknown document status: {}", name)))?;
        let (merge_key, sort_key) = split_key_pair(stem)?;
        Ok(DocName::data(merge_key, sort_key, status))
    }
}

/// Identifier accepted by `delete_documents`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocIdent {
    /// Exact header name.
    Header(String),
    /// Data key pair; matches every status.
    KeyPair(String, String),
}

impl DocIdent {
    /// Parses `<key>.header`, `<merge>-<sort>` or `<merge>-<sort>.<status>`.
    pub fn parse(id: &str) -> Result<Self> {
        if let Some(key) = id.strip_suffix(".header") {
            validate_key(key)?;
            return Ok(DocIdent::Header(key.to_string()));
        }
        let stem = match id.rsplit_once('.') {
            Some((stem, suffix)) if DocStatus::from_suffix(suffix).is_some() => stem,
            Some(_) => return Err(Error::invalid_argument(format!("Unknown document identifier: {}", id))),
            None => id,
        };
        let (merge_key, sort_key) = split_key_pair(stem)?;
        Ok(DocIdent::KeyPair(merge_key.to_string(), sort_key.to_string()))
    }

    /// Whether a document name matches this identifier.
    pub fn matches(&self, name: &DocName) -> bool {
        match (self, name) {
            (DocIdent::Header(k), DocName::Header { key }) => k == key,
            (DocIdent::KeyPair(m, s), DocName::Data { merge_key, sort_key, .. }) => {
                m == merge_key && s == sort_key
            }
            _ => false,
        }
    }
}

fn split_key_pair(stem: &str) -> Result<(&str, &str)> {
    let (merge_key, sort_key) = stem
        .split_once('-')
        .ok_or_else(|| Error::invalid_argument(format!("Missing key range separator: {}", stem)))?;
    validate_key(merge_key)?;
    validate_key(sort_key)?;
    Ok((merge_key, sort_key))
}

/// Checks that a key can be embedded in a document name.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_argument("Key cannot be empty"));
    }
    if key.contains(&['-', '.', '/'][..]) {
        return Err(Error::invalid_argument(format!("Key contains a reserved character: {}", key)));
    }
    Ok(())
}

/// Key of an age in an aged table: `start_seq + age`, zero-padded to the
/// width of `start_seq`.
pub fn aged_key(start_seq: &str, age: u64) -> Result<String> {
    if start_seq.is_empty() || !start_seq.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_argument(format!("Aged table start_seq is not numeric: {}", start_seq)));
    }
    let base: u128 = start_seq
        .parse()
        .map_err(|_| Error::invalid_argument(format!("start_seq out of range: {}", start_seq)))?;
    let key = base
        .checked_add(u128::from(age))
        .map(|k| format!("{:0width$}", k, width = start_seq.len()))
        .filter(|k| k.len() == start_seq.len())
        .ok_or_else(|| Error::invalid_argument(format!("Age {} overflows start_seq {}", age, start_seq)))?;
    Ok(key)
}

/// Key of the `index`-th chunk of a change-log batch starting at `start_seq`.
///
/// Later chunks append `_<index>`, which sorts after `start_seq` itself and
/// before any longer sequence sharing its prefix digits.
pub fn sequence_key(start_seq: &str, index: usize) -> String {
    if index == 0 {
        start_seq.to_string()
    } else {
        format!("{}_{:06}", start_seq, index)
    }
}

/// Splits a change-log key into its batch start sequence and chunk index.
pub fn sequence_position(key: &str) -> (&str, usize) {
    match key.rsplit_once('_') {
        Some((start_seq, index)) if index.len() == 6 && index.bytes().all(|b| b.is_ascii_digit()) => {
            (start_seq, index.parse().unwrap_or(0))
        }
        _ => (key, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let name: DocName = "20201113222500000000.header".parse().unwrap();
        assert!(name.is_header());
        assert_eq!(name.sort_key(), "20201113222500000000");
        assert_eq!(name.status(), None);
        assert_eq!(name.to_string(), "20201113222500000000.header");
    }

    #[test]
    fn test_parse_data() {
        let name: DocName = "20201113222500000002-20201113222500000014.merged".parse().unwrap();
        assert_eq!(name.merge_key(), "20201113222500000002");
        assert_eq!(name.sort_key(), "20201113222500000014");
        assert_eq!(name.status(), Some(DocStatus::Merged));
        assert_eq!(name.to_string(), "20201113222500000002-20201113222500000014.merged");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("no_suffix".parse::<DocName>().is_err());
        assert!("1-2.unknown".parse::<DocName>().is_err());
        assert!("12.initial".parse::<DocName>().is_err());
        assert!("-2.initial".parse::<DocName>().is_err());
    }

    #[test]
    fn test_with_status_keeps_identity() {
        let name = DocName::data("1", "2", DocStatus::Initial);
        let merged = name.with_status(DocStatus::Merged);
        assert_eq!(merged.to_string(), "1-2.merged");
        assert!(name.same_identity(&merged));
        assert!(!name.same_identity(&DocName::header("1")));
    }

    #[test]
    fn test_status_order() {
        assert!(DocStatus::Initial < DocStatus::Merged);
        assert!(DocStatus::Merged < DocStatus::Packaged);
        assert_eq!(serde_json::to_string(&DocStatus::Packaged).unwrap(), "\"packaged\"");
    }

    #[test]
    fn test_ident_ignores_status_suffix() {
        let packaged = DocName::data("8", "8", DocStatus::Packaged);
        assert!(DocIdent::parse("8-8.initial").unwrap().matches(&packaged));
        assert!(DocIdent::parse("8-8").unwrap().matches(&packaged));
        assert!(!DocIdent::parse("8-9").unwrap().matches(&packaged));

        let header = DocName::header("0");
        assert!(DocIdent::parse("0.header").unwrap().matches(&header));
        assert!(!DocIdent::parse("0-0").unwrap().matches(&header));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("20201113222500000100_000001").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a-b").is_err());
        assert!(validate_key("a.b").is_err());
        assert!(validate_key("a/b").is_err());
    }

    #[test]
    fn test_aged_key() {
        assert_eq!(aged_key("20201113222500000000", 267).unwrap(), "20201113222500000267");
        assert_eq!(aged_key("0000", 12).unwrap(), "0012");
        assert!(aged_key("9990", 10).is_err());
        assert!(aged_key("2020x", 1).is_err());
        assert!(aged_key("", 1).is_err());
    }

    #[test]
    fn test_sequence_position() {
        assert_eq!(sequence_position("20201113222500000100"), ("20201113222500000100", 0));
        assert_eq!(sequence_position("20201113222500000100_000002"), ("20201113222500000100", 2));
        assert_eq!(sequence_position("a_b"), ("a_b", 0));
        assert_eq!(sequence_position("a_12"), ("a_12", 0));
    }

    #[test]
    fn test_sequence_key_order() {
        let first = sequence_key("20201113222500000100", 0);
        let second = sequence_key("20201113222500000100", 1);
        assert_eq!(first, "20201113222500000100");
        assert_eq!(second, "20201113222500000100_000001");
        assert!(first < second);
        assert!(second.as_str() < "20201113222500000101");
        assert!(validate_key(&second).is_ok());
    }
}
