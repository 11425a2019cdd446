//! # Documents
//!
//! A document is one named blob in a table directory: either the table
//! header or a data document holding a chunk of CDC rows.
//!
//! ## File Format
//!
//! ```text
//! {
//!   "topic_id": ..., "table_id": ...,
//!   "merge_key": ..., "sort_key": ..., "first_key": ...,
//!   "merge_status": "initial" | "merged" | "packaged",   (data only)
//!   "merge_level": L, "close_level": C,
//!   "line_nb": rows, "data_size": bytes, "data_crc": crc32,
//!   "data": base64(gzip(json(rows))),
//!   ...free-form metadata
//! }
//! ```
//!
//! The table header additionally carries `meta_data` (encoded like `data`),
//! `merged_size` and `merge_pending`.

pub mod batch;
pub mod chunk;
pub mod codec;
pub mod name;

pub use batch::{BatchHeader, Row};
pub use name::{DocIdent, DocName, DocStatus};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Header fields that only the depositor may change.
pub const PROTECTED_FIELDS: &[&str] = &[
    "merge_key",
    "sort_key",
    "first_key",
    "data",
    "data_size",
    "data_crc",
    "line_nb",
    "meta_data",
    "merged_size",
    "merge_pending",
];

/// Stored header of a document, payload included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    /// Topic of the owning table.
    pub topic_id: String,
    /// Owning table.
    pub table_id: String,
    /// Start of the key range the document is named after.
    pub merge_key: String,
    /// End of the key range.
    pub sort_key: String,
    /// Lowest key covered; below `merge_key` only for compacted documents.
    pub first_key: String,
    /// Lifecycle status; `None` for the table header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_status: Option<DocStatus>,
    /// Compaction level reached (0 until merged).
    #[serde(default)]
    pub merge_level: u32,
    /// Highest merge level whose bucket this document closes.
    #[serde(default)]
    pub close_level: u32,
    /// Aged (snapshot) table.
    #[serde(default)]
    pub aged: bool,
    /// First age covered by an aged document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u64>,
    /// Last age covered by an aged document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_age: Option<u64>,
    /// Table creation key or batch start sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_seq: Option<String>,
    /// Partition tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
    /// Encoded table metadata (table header only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<String>,
    /// Sum of `data_size` over merged documents (table header only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_size: Option<u64>,
    /// Bytes added per merge level since the last bucket boundary (table header only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merge_pending: Vec<u64>,
    /// Number of rows in the payload.
    #[serde(default)]
    pub line_nb: u64,
    /// Length of the encoded payload.
    pub data_size: u64,
    /// CRC32 of the encoded payload.
    pub data_crc: u32,
    /// Encoded payload.
    pub data: String,
    /// Free-form metadata set through `update_document`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentHeader {
    /// An empty document of `topic_id/table_id` covering `[merge_key, sort_key]`.
    pub fn new(
        topic_id: impl Into<String>,
        table_id: impl Into<String>,
        merge_key: impl Into<String>,
        sort_key: impl Into<String>,
        merge_status: Option<DocStatus>,
    ) -> Self {
        let merge_key = merge_key.into();
        Self {
            topic_id: topic_id.into(),
            table_id: table_id.into(),
            first_key: merge_key.clone(),
            merge_key,
            sort_key: sort_key.into(),
            merge_status,
            merge_level: 0,
            close_level: 0,
            aged: false,
            age: None,
            end_age: None,
            start_seq: None,
            segment_id: None,
            meta_data: None,
            merged_size: None,
            merge_pending: Vec::new(),
            line_nb: 0,
            data_size: 0,
            data_crc: 0,
            data: String::new(),
            extra: Map::new(),
        }
    }

    /// Replaces the payload and refreshes the derived size fields.
    pub fn set_data(&mut self, data: String, line_nb: u64) {
        self.data_size = data.len() as u64;
        self.data_crc = codec::checksum(&data);
        self.line_nb = line_nb;
        self.data = data;
    }

    /// The name this header is stored under.
    pub fn doc_name(&self) -> DocName {
        match self.merge_status {
            None => DocName::header(self.sort_key.clone()),
            Some(status) => DocName::data(self.merge_key.clone(), self.sort_key.clone(), status),
        }
    }

    /// Compact summary kept by the sort-key index.
    pub fn summary(&self) -> DocSummary {
        DocSummary {
            first_key: self.first_key.clone(),
            merge_level: self.merge_level,
            close_level: self.close_level,
            data_size: self.data_size,
            line_nb: self.line_nb,
            age: self.age,
            end_age: self.end_age,
        }
    }

    /// Serializes the header as a document file.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a document file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::corruption(format!("invalid document header: {}", e)))
    }

    /// Decodes and verifies the payload.
    pub fn decode_data<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        codec::verify(&self.data, self.data_crc)?;
        codec::decode(&self.data)
    }
}

/// Index-side view of a document: what compaction and level filters need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSummary {
    /// Lowest key covered.
    pub first_key: String,
    /// Compaction level reached.
    pub merge_level: u32,
    /// Highest bucket level closed.
    pub close_level: u32,
    /// Encoded payload size.
    pub data_size: u64,
    /// Row count.
    pub line_nb: u64,
    /// First age covered, aged tables only.
    pub age: Option<u64>,
    /// Last age covered, aged tables only.
    pub end_age: Option<u64>,
}

/// A document as returned by `get_header_from_ref`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Parsed name.
    pub name: DocName,
    /// Stored header, payload still encoded.
    pub header: DocumentHeader,
    /// Decoded table metadata, if any.
    pub meta_data: Option<Map<String, Value>>,
}

impl Document {
    /// Builds a document from its file, checking it against its name.
    pub fn load(name: DocName, bytes: &[u8]) -> Result<Self> {
        let header = DocumentHeader::from_bytes(bytes)?;
        if header.doc_name() != name {
            return Err(Error::corruption(format!(
                "document {} holds the header of {}",
                name,
                header.doc_name()
            )));
        }
        let meta_data = match &header.meta_data {
            Some(encoded) => Some(codec::decode(encoded)?),
            None => None,
        };
        Ok(Self { name, header, meta_data })
    }

    /// Document name as stored.
    pub fn name(&self) -> String {
        self.name.to_string()
    }

    /// Start of the key range.
    pub fn merge_key(&self) -> &str {
        &self.header.merge_key
    }

    /// End of the key range.
    pub fn sort_key(&self) -> &str {
        &self.header.sort_key
    }

    /// Lifecycle status; `None` for the table header.
    pub fn status(&self) -> Option<DocStatus> {
        self.header.merge_status
    }

    /// Encoded payload size.
    pub fn data_size(&self) -> u64 {
        self.header.data_size
    }

    /// Sum of merged document sizes, for the table header.
    pub fn merged_size(&self) -> Option<u64> {
        self.header.merged_size
    }

    /// Looks up a free-form metadata field.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.header.extra.get(key)
    }
}
