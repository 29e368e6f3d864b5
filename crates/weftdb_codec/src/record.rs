//! Record type: an ordered mapping of field names to values.

use crate::error::{CodecError, CodecResult};
use crate::key::{Key, KeyPath};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record: field name to value, ordered by field name.
///
/// The ordered representation means two records with the same fields
/// always encode to identical bytes, which keeps payloads canonical
/// without a separate sorting pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Sets a field value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Removes a field, returning its previous value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Gets a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Checks whether a field is present.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Checks whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Extracts the key of a single field, if the field is present and
    /// key-able. An absent field and a `Null` field both yield `None`.
    #[must_use]
    pub fn field_key(&self, field: &str) -> Option<Key> {
        self.fields.get(field).and_then(Value::as_key)
    }

    /// Extracts the key described by a key path.
    ///
    /// A single-field path yields that field's key; a multi-field path
    /// yields a composite key. Every referenced field must be present and
    /// key-able.
    pub fn key_of(&self, path: &KeyPath) -> CodecResult<Key> {
        let mut parts = Vec::with_capacity(path.fields().len());
        for field in path.fields() {
            let key = self
                .field_key(field)
                .ok_or_else(|| CodecError::KeyPathUnsatisfied {
                    field: field.clone(),
                })?;
            parts.push(key);
        }
        if path.is_single() {
            parts
                .into_iter()
                .next()
                .ok_or_else(|| CodecError::not_keyable("empty key path"))
        } else {
            Ok(Key::Composite(parts))
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
