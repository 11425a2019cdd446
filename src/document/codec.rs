//! Payload codec.
//!
//! Payloads (row lists, field lists, table metadata) are JSON-encoded,
//! gzip-compressed and base64-encoded so that a document file stays a small
//! ASCII JSON object whatever its content.
//!
//! ```text
//! value --serde_json--> bytes --gzip--> bytes --base64--> String
//! ```

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

/// Encodes a value into its compact payload string.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Decodes a payload string produced by [`encode`].
pub fn decode<T: DeserializeOwned>(encoded: &str) -> Result<T> {
    let compressed = STANDARD.decode(encoded.as_bytes())?;
    let mut json = Vec::with_capacity(compressed.len() * 4);
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|e| Error::corruption(format!("invalid gzip payload: {}", e)))?;
    Ok(serde_json::from_slice(&json)?)
}

/// CRC32 of an encoded payload, as stored in `data_crc`.
pub fn checksum(encoded: &str) -> u32 {
    crc32fast::hash(encoded.as_bytes())
}

/// Verifies an encoded payload against its recorded checksum.
pub fn verify(encoded: &str, expected: u32) -> Result<()> {
    let actual = checksum(encoded);
    if actual != expected {
        return Err(Error::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
