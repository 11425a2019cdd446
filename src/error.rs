//! Error types for the document depositor.
//!
//! Only structural failures are errors. Routine "not ready yet" outcomes of
//! the compaction loop (missing bucket inputs, absent table, size gate) are
//! reported as `false`/`None` by the depositor and never reach this type.

use std::io;

/// The result type used throughout the depositor.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for depositor operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred in the storage backend.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A stored document could not be parsed.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// The requested document was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The depositor is in an invalid state for the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A checksum mismatch was detected on a document payload.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The checksum recorded in the document header.
        expected: u32,
        /// The checksum computed over the stored payload.
        actual: u32,
    },

    /// The document or key range already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A payload cannot be stored within the configured size limit.
    #[error("Size budget exceeded: {size} bytes over a limit of {limit} bytes")]
    SizeBudget {
        /// Encoded size of the smallest payload that had to be stored.
        size: u64,
        /// The configured size limit.
        limit: u64,
    },
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Returns true for size-budget violations.
    pub fn is_size_budget(&self) -> bool {
        matches!(self, Error::SizeBudget { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Corruption(format!("invalid base64 payload: {}", err))
    }
}
