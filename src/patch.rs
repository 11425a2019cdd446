//! Metadata patches for `update_document`.
//!
//! A patch is an explicit list of operations applied in order to a
//! document's header fields, producing a new mapping.

use crate::document::PROTECTED_FIELDS;
use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// One metadata update operation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaPatch {
    /// Insert or replace a field.
    Set(String, Value),
    /// Remove a field. Removing an absent field is a no-op.
    Delete(String),
}

impl MetaPatch {
    /// Shorthand for [`MetaPatch::Set`].
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        MetaPatch::Set(key.into(), value.into())
    }

    /// Shorthand for [`MetaPatch::Delete`].
    pub fn delete(key: impl Into<String>) -> Self {
        MetaPatch::Delete(key.into())
    }

    /// The field this operation targets.
    pub fn key(&self) -> &str {
        match self {
            MetaPatch::Set(key, _) | MetaPatch::Delete(key) => key,
        }
    }
}

/// Applies patches to a header mapping.
///
/// Fails without touching anything if a patch targets a field the depositor
/// maintains itself.
pub fn apply(mut fields: Map<String, Value>, patches: &[MetaPatch]) -> Result<Map<String, Value>> {
    if let Some(patch) = patches.iter().find(|p| PROTECTED_FIELDS.contains(&p.key())) {
        return Err(Error::invalid_argument(format!("Field {} cannot be patched", patch.key())));
    }

    for patch in patches {
        match patch {
            MetaPatch::Set(key, value) => {
                fields.insert(key.clone(), value.clone());
            }
            MetaPatch::Delete(key) => {
                fields.remove(key);
            }
        }
    }
    Ok(fields)
}
