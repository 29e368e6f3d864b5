//! Overlay schema: relations and foreign-key rules over engine collections.

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use weftdb_codec::KeyPath;
use weftdb_engine::{CollectionConfig, IndexConfig};

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one related record per source record.
    OneToOne,
    /// Any number of related records per source record.
    OneToMany,
}

/// Delete-propagation policy of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Recursively delete dependents.
    Cascade,
    /// Refuse the delete while dependents exist.
    Restrict,
    /// Null out the dependents' foreign-key field.
    SetNull,
    /// Do nothing.
    NoAction,
}

/// A declared equality join between two collections.
///
/// Directional: resolving the relation scans `target_collection`, grouping
/// scanned records by `target_field` and matching them against source
/// records' `source_field` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Relation name, unique per source collection.
    pub name: String,
    /// Cardinality of the relation.
    pub cardinality: Cardinality,
    /// Field on the source collection whose value is matched.
    pub source_field: String,
    /// Field on the target collection that is grouped by.
    pub target_field: String,
    /// The collection owning this relation.
    pub source_collection: String,
    /// The collection that is scanned when resolving.
    pub target_collection: String,
}

impl RelationDef {
    /// Declares a one-to-one relation.
    pub fn one_to_one(
        name: impl Into<String>,
        source_collection: impl Into<String>,
        source_field: impl Into<String>,
        target_collection: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::OneToOne,
            source_field: source_field.into(),
            target_field: target_field.into(),
            source_collection: source_collection.into(),
            target_collection: target_collection.into(),
        }
    }

    /// Declares a one-to-many relation.
    pub fn one_to_many(
        name: impl Into<String>,
        source_collection: impl Into<String>,
        source_field: impl Into<String>,
        target_collection: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            cardinality: Cardinality::OneToMany,
            ..Self::one_to_one(
                name,
                source_collection,
                source_field,
                target_collection,
                target_field,
            )
        }
    }
}

/// A foreign-key declaration on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRule {
    /// The field holding the referenced key.
    pub field: String,
    /// The collection the key must exist in.
    pub target_collection: String,
    /// What happens to this record when the referenced record is deleted.
    pub on_delete: OnDelete,
}

impl ForeignKeyRule {
    /// Declares a foreign key with the `no-action` delete policy.
    pub fn new(field: impl Into<String>, target_collection: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            target_collection: target_collection.into(),
            on_delete: OnDelete::NoAction,
        }
    }

    /// Sets the delete policy.
    #[must_use]
    pub const fn on_delete(mut self, policy: OnDelete) -> Self {
        self.on_delete = policy;
        self
    }
}

/// Overlay-level declaration of a collection.
#[derive(Debug, Clone)]
pub struct CollectionDef {
    /// Collection name.
    pub name: String,
    /// Key path records are keyed by, if keys are in-line.
    pub key_path: Option<KeyPath>,
    /// Whether the engine assigns keys when none is supplied.
    pub auto_key: bool,
    /// Secondary indexes.
    pub indexes: Vec<IndexConfig>,
    /// Relations owned by this collection.
    pub relations: Vec<RelationDef>,
    /// Foreign keys carried by this collection's records.
    pub foreign_keys: Vec<ForeignKeyRule>,
}

impl CollectionDef {
    /// Creates a collection declaration with out-of-line keys.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: None,
            auto_key: false,
            indexes: Vec::new(),
            relations: Vec::new(),
            foreign_keys: Vec::new(),
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

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, rule: ForeignKeyRule) -> Self {
        self.foreign_keys.push(rule);
        self
    }

    /// Converts this declaration into the engine-level configuration.
    #[must_use]
    pub fn engine_config(&self) -> CollectionConfig {
        let mut config = CollectionConfig::new(self.name.clone());
        if let Some(path) = &self.key_path {
            config = config.key_path(path.clone());
        }
        if self.auto_key {
            config = config.auto_key();
        }
        for index in &self.indexes {
            config = config.index(index.clone());
        }
        config
    }
}

/// The full overlay schema: a named set of collection declarations.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    collections: BTreeMap<String, CollectionDef>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a collection declaration.
    #[must_use]
    pub fn collection(mut self, def: CollectionDef) -> Self {
        self.collections.insert(def.name.clone(), def);
        self
    }

    /// Looks up a collection declaration.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.get(name)
    }

    /// Looks up a collection declaration, failing if absent.
    pub fn require(&self, name: &str) -> CoreResult<&CollectionDef> {
        self.get(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// Looks up a relation on a collection, failing if absent.
    pub fn relation(&self, collection: &str, name: &str) -> CoreResult<&RelationDef> {
        self.require(collection)?
            .relations
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| CoreError::RelationNotFound {
                collection: collection.to_string(),
                relation: name.to_string(),
            })
    }

    /// Returns every `(collection, rule)` whose foreign key targets the
    /// given collection.
    #[must_use]
    pub fn dependents_of(&self, target: &str) -> Vec<(&str, &ForeignKeyRule)> {
        let mut dependents = Vec::new();
        for def in self.collections.values() {
            for rule in &def.foreign_keys {
                if rule.target_collection == target {
                    dependents.push((def.name.as_str(), rule));
                }
            }
        }
        dependents
    }

    /// Returns a declared single-field index covering the given field, if
    /// one exists. Used to route foreign-key lookups through an index
    /// instead of a full scan.
    #[must_use]
    pub fn field_index(&self, collection: &str, field: &str) -> Option<&IndexConfig> {
        self.get(collection)?.indexes.iter().find(|index| {
            index.fields.is_single() && index.fields.fields()[0] == field
        })
    }

    /// Returns the names of all declared collections.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    /// Iterates over all collection declarations.
    pub fn iter(&self) -> impl Iterator<Item = &CollectionDef> {
        self.collections.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::new()
            .collection(
                CollectionDef::new("users")
                    .key_path(KeyPath::single("id"))
                    .relation(RelationDef::one_to_many(
                        "posts", "users", "id", "posts", "userId",
                    )),
            )
            .collection(
                CollectionDef::new("posts")
                    .key_path(KeyPath::single("id"))
                    .index(IndexConfig::new("by_user", KeyPath::single("userId")))
                    .foreign_key(ForeignKeyRule::new("userId", "users").on_delete(OnDelete::Cascade)),
            )
    }

    #[test]
    fn relation_lookup() {
        let schema = sample_schema();
        let relation = schema.relation("users", "posts").unwrap();
        assert_eq!(relation.cardinality, Cardinality::OneToMany);
        assert_eq!(relation.target_collection, "posts");
    }

    #[test]
    fn unknown_relation_fails() {
        let schema = sample_schema();
        let result = schema.relation("users", "comments");
        assert!(matches!(result, Err(CoreError::RelationNotFound { .. })));
    }

    #[test]
    fn dependents_of_finds_foreign_keys() {
        let schema = sample_schema();
        let dependents = schema.dependents_of("users");
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].0, "posts");
        assert_eq!(dependents[0].1.on_delete, OnDelete::Cascade);
        assert!(schema.dependents_of("posts").is_empty());
    }

    #[test]
    fn field_index_matches_single_field_only() {
        let schema = sample_schema();
        assert!(schema.field_index("posts", "userId").is_some());
        assert!(schema.field_index("posts", "id").is_none());
        assert!(schema.field_index("users", "id").is_none());
    }

    #[test]
    fn engine_config_carries_indexes() {
        let schema = sample_schema();
        let config = schema.get("posts").unwrap().engine_config();
        assert_eq!(config.name, "posts");
        assert!(config.find_index("by_user").is_some());
    }
}
