//! Engine-level collection and index configuration.

use weftdb_codec::KeyPath;

/// Declaration of a secondary index over one or more record fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Name of the index (unique per collection).
    pub name: String,
    /// The indexed field(s); multiple fields form a composite index key.
    pub fields: KeyPath,
    /// Whether the index enforces uniqueness across records.
    pub unique: bool,
}

impl IndexConfig {
    /// Creates a non-unique index over a single field.
    pub fn new(name: impl Into<String>, fields: KeyPath) -> Self {
        Self {
            name: name.into(),
            fields,
            unique: false,
        }
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Declaration of a collection at the engine level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Collection name.
    pub name: String,
    /// Key path records are keyed by, if keys are in-line.
    pub key_path: Option<KeyPath>,
    /// Whether the engine assigns keys when none is supplied.
    pub auto_key: bool,
    /// Secondary indexes.
    pub indexes: Vec<IndexConfig>,
}

impl CollectionConfig {
    /// Creates a collection with out-of-line keys and no auto-key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: None,
            auto_key: false,
            indexes: Vec::new(),
        }
    }

    /// Keys records by the given path.
    #[must_use]
    pub fn key_path(mut self, path: KeyPath) -> Self {
        self.key_path = Some(path);
        self
    }

    /// Lets the engine assign keys when none is supplied.
    #[must_use]
    pub fn auto_key(mut self) -> Self {
        self.auto_key = true;
        self
    }

    /// Adds a secondary index.
    #[must_use]
    pub fn index(mut self, index: IndexConfig) -> Self {
        self.indexes.push(index);
        self
    }

    /// Looks up an index declaration by name.
    #[must_use]
    pub fn find_index(&self, name: &str) -> Option<&IndexConfig> {
        self.indexes.iter().find(|idx| idx.name == name)
    }
}
