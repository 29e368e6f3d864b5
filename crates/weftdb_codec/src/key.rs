//! Ordered key domain and key paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A key in the engine's ordered key domain.
///
/// Keys have a total order: integers sort before text, text before bytes,
/// bytes before composites; within a variant the natural order applies and
/// composites compare element-wise. The derived `Ord` implements exactly
/// that, so the variant declaration order is load-bearing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Signed integer key.
    Integer(i64),
    /// Text key (UTF-8).
    Text(String),
    /// Byte-string key.
    Bytes(Vec<u8>),
    /// Composite key built from multiple parts.
    Composite(Vec<Key>),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Integer(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s:?}"),
            Key::Bytes(b) => write!(f, "0x{}", hex_string(b)),
            Key::Composite(parts) => {
                write!(f, "[")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, "]")
            }
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Integer(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

/// A path of one or more record fields that together form a key.
///
/// A single-field path extracts the field value directly; a multi-field
/// path yields a composite key with parts in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPath {
    fields: Vec<String>,
}

impl KeyPath {
    /// Creates a single-field key path.
    pub fn single(field: impl Into<String>) -> Self {
        Self {
            fields: vec![field.into()],
        }
    }

    /// Creates a composite key path over the given fields.
    pub fn composite<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the fields of this path in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Checks whether this path consists of exactly one field.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.fields.len() == 1
    }
}
