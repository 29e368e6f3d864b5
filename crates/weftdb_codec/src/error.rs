//! Error types for codec operations.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding records and keys.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A record payload could not be encoded.
    #[error("encode failed: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },

    /// A record payload could not be decoded.
    #[error("decode failed: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },

    /// A value cannot be used as a key.
    #[error("value is not a valid key: {message}")]
    NotKeyable {
        /// Description of the offending value.
        message: String,
    },

    /// A key path referenced a field that is absent or not key-able.
    #[error("key path field {field:?} is absent or not key-able")]
    KeyPathUnsatisfied {
        /// The field the key path could not resolve.
        field: String,
    },
}

impl CodecError {
    /// Creates an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a not-keyable error.
    pub fn not_keyable(message: impl Into<String>) -> Self {
        Self::NotKeyable {
            message: message.into(),
        }
    }
}
