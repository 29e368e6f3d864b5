//! # WeftDB Codec
//!
//! Data model and canonical payload encoding for WeftDB.
//!
//! This crate defines the types that cross the storage-engine boundary:
//! - [`Value`] — a dynamic field value (no floats; every value has a
//!   deterministic encoding)
//! - [`Key`] — the ordered key domain (integers, text, bytes, composites)
//! - [`KeyPath`] — field path(s) from which a record's key is extracted
//! - [`Record`] — an ordered field-name → value map
//!
//! Payloads are encoded as CBOR via `ciborium`. Because [`Record`] keeps
//! its fields ordered by name, identical records always produce identical
//! bytes.
//!
//! ## Example
//!
//! ```
//! use weftdb_codec::{decode_record, encode_record, Record};
//!
//! let record = Record::new().with("id", 1).with("name", "Alice");
//! let bytes = encode_record(&record).unwrap();
//! let decoded = decode_record(&bytes).unwrap();
//! assert_eq!(record, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod key;
mod record;
mod value;

pub use error::{CodecError, CodecResult};
pub use key::{Key, KeyPath};
pub use record::Record;
pub use value::Value;

/// Encodes a record to CBOR payload bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_record(record: &Record) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(record, &mut buffer).map_err(|e| CodecError::encode(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a record from CBOR payload bytes.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not a valid record
/// payload.
pub fn decode_record(bytes: &[u8]) -> CodecResult<Record> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decode(e.to_string()))
}
