//! Upstream batch headers.
//!
//! Producers deliver `(header, rows)` batches. A batch whose header carries
//! `meta-data` describes the table itself (its rows are the field list); any
//! other batch carries CDC rows for an age range or a sequence start.
//!
//! Producers are not strict about scalar types: `aged` arrives as `true` or
//! `"True"`, ages as `2` or `"2"`. Both are accepted.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One payload row: a JSON object.
pub type Row = Map<String, Value>;

/// Reserved row field holding the age of an aged row.
pub const AGE_FIELD: &str = "_AGE";

/// Header of an upstream batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchHeader {
    /// Topic the table belongs to.
    pub topic_id: String,
    /// Table identifier.
    pub table_id: String,
    /// Aged (snapshot) replication mode. Only read from table header batches.
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub aged: Option<bool>,
    /// First age covered by an aged batch.
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub age: Option<u64>,
    /// Last age covered by an aged batch.
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub end_age: Option<u64>,
    /// Table creation key, or the start sequence of a change-log batch.
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub start_seq: Option<String>,
    /// Table metadata; present only on table header batches.
    #[serde(default, rename = "meta-data", skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<Map<String, Value>>,
    /// Partition tag for horizontally segmented tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
}

impl BatchHeader {
    /// A table header batch: `start_seq` is the table creation key.
    pub fn table(
        topic_id: impl Into<String>,
        table_id: impl Into<String>,
        start_seq: impl Into<String>,
        meta_data: Map<String, Value>,
    ) -> Self {
        Self {
            topic_id: topic_id.into(),
            table_id: table_id.into(),
            start_seq: Some(start_seq.into()),
            meta_data: Some(meta_data),
            ..Default::default()
        }
    }

    /// A data batch with no range information yet.
    pub fn data(topic_id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self { topic_id: topic_id.into(), table_id: table_id.into(), ..Default::default() }
    }

    /// Parses a header from a JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Sets the aged flag.
    pub fn with_aged(mut self, aged: bool) -> Self {
        self.aged = Some(aged);
        self
    }

    /// Sets the age range `[age, end_age]`.
    pub fn with_ages(mut self, age: u64, end_age: Option<u64>) -> Self {
        self.age = Some(age);
        self.end_age = end_age;
        self
    }

    /// Sets the start sequence.
    pub fn with_start_seq(mut self, start_seq: impl Into<String>) -> Self {
        self.start_seq = Some(start_seq.into());
        self
    }

    /// Sets the segment tag.
    pub fn with_segment(mut self, segment_id: impl Into<String>) -> Self {
        self.segment_id = Some(segment_id.into());
        self
    }

    /// Whether this batch describes the table rather than carrying rows.
    pub fn is_table_header(&self) -> bool {
        self.meta_data.is_some()
    }
}

/// Reads the `_AGE` of a row, accepting numbers and numeric strings.
pub fn row_age(row: &Row) -> Result<Option<u64>> {
    match row.get(AGE_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value_to_u64(value)
            .map(Some)
            .ok_or_else(|| Error::invalid_argument(format!("Invalid {} value: {}", AGE_FIELD, value))),
    }
}

fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<bool>, D::Error> {
    use serde::de::Error as _;
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" | "" => Ok(Some(false)),
            _ => Err(D::Error::custom(format!("invalid boolean flag: {}", s))),
        },
        Some(Value::Number(n)) => Ok(Some(n.as_u64() != Some(0))),
        Some(other) => Err(D::Error::custom(format!("invalid boolean flag: {}", other))),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u64>, D::Error> {
    use serde::de::Error as _;
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value_to_u64(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid unsigned integer: {}", value))),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    use serde::de::Error as _;
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!("invalid key: {}", other))),
    }
}
