//! Referential integrity: foreign-key validation and delete policies.

use crate::error::{CoreError, CoreResult};
use crate::scan::CursorScanner;
use crate::schema::{OnDelete, Schema};
use crate::txn::TransactionContext;
use std::sync::Arc;
use weftdb_codec::{Key, Record, Value};
use weftdb_engine::KeyRange;

/// Validates foreign-key references on writes and applies on-delete
/// policies to dependents.
///
/// Every check and every cascade runs inside the same transaction
/// context as the triggering mutation, so either the whole cascade
/// commits or none of it does.
pub struct ReferentialIntegrityEnforcer {
    schema: Arc<Schema>,
}

impl ReferentialIntegrityEnforcer {
    /// Creates an enforcer over a schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// Validates every foreign-key field of a record about to be written.
    ///
    /// A null or absent foreign-key field passes. A non-null value must
    /// be key-able and must reference an existing record in the target
    /// collection, otherwise the write fails with a validation error.
    pub fn validate_record(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        record: &Record,
    ) -> CoreResult<()> {
        let def = self.schema.require(collection)?;
        for rule in &def.foreign_keys {
            let Some(value) = record.get(&rule.field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let Some(key) = value.as_key() else {
                return Err(CoreError::validation(
                    collection,
                    rule.field.as_str(),
                    "foreign-key value is not a valid key",
                ));
            };
            if ctx.get(&rule.target_collection, &key)?.is_none() {
                return Err(CoreError::validation(
                    collection,
                    rule.field.as_str(),
                    format!(
                        "references missing key {key} in {:?}",
                        rule.target_collection
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Deletes a record, applying on-delete policies to its dependents
    /// first.
    pub fn delete_record(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        key: &Key,
    ) -> CoreResult<()> {
        self.enforce_delete(ctx, collection, key)?;
        ctx.delete(collection, key)
    }

    /// Applies the declared on-delete policy of every dependent relation
    /// before a record is deleted.
    pub fn enforce_delete(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        key: &Key,
    ) -> CoreResult<()> {
        // Collect owned rules first: the recursion below re-borrows self.
        let dependents: Vec<(String, String, OnDelete)> = self
            .schema
            .dependents_of(collection)
            .into_iter()
            .map(|(name, rule)| (name.to_string(), rule.field.clone(), rule.on_delete))
            .collect();

        for (dep_collection, field, policy) in dependents {
            match policy {
                OnDelete::NoAction => {}
                OnDelete::Restrict => {
                    let found = self.dependents(ctx, &dep_collection, &field, key, Some(1))?;
                    if !found.is_empty() {
                        return Err(CoreError::ReferentialIntegrity {
                            collection: collection.to_string(),
                            dependent_collection: dep_collection,
                            dependents: found.len(),
                        });
                    }
                }
                OnDelete::Cascade => {
                    let found = self.dependents(ctx, &dep_collection, &field, key, None)?;
                    for (dep_key, _) in found {
                        // Re-enters enforcement: the dependent's own
                        // dependents are handled the same way.
                        self.delete_record(ctx, &dep_collection, &dep_key)?;
                    }
                }
                OnDelete::SetNull => {
                    let found = self.dependents(ctx, &dep_collection, &field, key, None)?;
                    for (dep_key, mut dep_record) in found {
                        dep_record.set(&field, Value::Null);
                        ctx.put(&dep_collection, Some(dep_key), &dep_record)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Finds records in `collection` whose `field` equals `key`.
    ///
    /// Routed through a declared single-field index when one covers the
    /// foreign-key field; otherwise a full predicate scan.
    fn dependents(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        field: &str,
        key: &Key,
        limit: Option<usize>,
    ) -> CoreResult<Vec<(Key, Record)>> {
        if let Some(index) = self.schema.field_index(collection, field) {
            let index_name = index.name.clone();
            let entries = CursorScanner::new(ctx, collection)
                .range_scan(&index_name, &KeyRange::only(key.clone()))?;
            let mut found: Vec<(Key, Record)> = entries
                .into_iter()
                .map(|e| (e.primary_key, e.record))
                .collect();
            if let Some(limit) = limit {
                found.truncate(limit);
            }
            return Ok(found);
        }
        CursorScanner::new(ctx, collection)
            .scan_where(|record| record.field_key(field).as_ref() == Some(key), limit)
    }
}

impl std::fmt::Debug for ReferentialIntegrityEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferentialIntegrityEnforcer")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionDef, ForeignKeyRule};
    use weftdb_codec::KeyPath;
    use weftdb_engine::{AccessMode, IndexConfig, MemoryEngine, StorageEngine};

    /// users <- posts (cascade) <- comments (cascade); tags restrict on
    /// users; profiles set-null on users.
    fn schema() -> Schema {
        Schema::new()
            .collection(CollectionDef::new("users").key_path(KeyPath::single("id")))
            .collection(
                CollectionDef::new("posts")
                    .key_path(KeyPath::single("id"))
                    .index(IndexConfig::new("by_user", KeyPath::single("userId")))
                    .foreign_key(ForeignKeyRule::new("userId", "users").on_delete(OnDelete::Cascade)),
            )
            .collection(
                CollectionDef::new("comments")
                    .key_path(KeyPath::single("id"))
                    .foreign_key(ForeignKeyRule::new("postId", "posts").on_delete(OnDelete::Cascade)),
            )
            .collection(
                CollectionDef::new("tags")
                    .key_path(KeyPath::single("id"))
                    .foreign_key(
                        ForeignKeyRule::new("ownerId", "users").on_delete(OnDelete::Restrict),
                    ),
            )
            .collection(
                CollectionDef::new("profiles")
                    .key_path(KeyPath::single("id"))
                    .foreign_key(
                        ForeignKeyRule::new("userId", "users").on_delete(OnDelete::SetNull),
                    ),
            )
    }

    fn setup() -> (ReferentialIntegrityEnforcer, TransactionContext) {
        let schema = Arc::new(schema());
        let engine = MemoryEngine::new();
        for def in schema.iter() {
            engine.create_collection(def.engine_config()).unwrap();
        }
        let names = schema.collection_names();
        let ctx = TransactionContext::new(engine.begin(&names, AccessMode::ReadWrite).unwrap());
        (ReferentialIntegrityEnforcer::new(schema), ctx)
    }

    fn add(ctx: &mut TransactionContext, collection: &str, record: Record) {
        ctx.add(collection, None, &record).unwrap();
    }

    #[test]
    fn valid_reference_passes() {
        let (enforcer, mut ctx) = setup();
        add(&mut ctx, "users", Record::new().with("id", 1));
        let post = Record::new().with("id", 10).with("userId", 1);
        enforcer.validate_record(&mut ctx, "posts", &post).unwrap();
    }

    #[test]
    fn null_and_absent_foreign_keys_pass() {
        let (enforcer, mut ctx) = setup();
        let absent = Record::new().with("id", 10);
        enforcer.validate_record(&mut ctx, "posts", &absent).unwrap();
        let null = Record::new().with("id", 11).with("userId", Value::Null);
        enforcer.validate_record(&mut ctx, "posts", &null).unwrap();
    }

    #[test]
    fn dangling_reference_fails_validation() {
        let (enforcer, mut ctx) = setup();
        let post = Record::new().with("id", 10).with("userId", 99);
        let result = enforcer.validate_record(&mut ctx, "posts", &post);
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn non_keyable_reference_fails_validation() {
        let (enforcer, mut ctx) = setup();
        let post = Record::new().with("id", 10).with("userId", true);
        let result = enforcer.validate_record(&mut ctx, "posts", &post);
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn cascade_deletes_dependents_transitively() {
        let (enforcer, mut ctx) = setup();
        add(&mut ctx, "users", Record::new().with("id", 1));
        add(&mut ctx, "posts", Record::new().with("id", 10).with("userId", 1));
        add(&mut ctx, "comments", Record::new().with("id", 100).with("postId", 10));

        enforcer
            .delete_record(&mut ctx, "users", &Key::Integer(1))
            .unwrap();

        assert_eq!(ctx.count("users").unwrap(), 0);
        assert_eq!(ctx.count("posts").unwrap(), 0);
        assert_eq!(ctx.count("comments").unwrap(), 0);
    }

    #[test]
    fn restrict_blocks_delete_and_leaves_rows() {
        let (enforcer, mut ctx) = setup();
        add(&mut ctx, "users", Record::new().with("id", 1));
        add(&mut ctx, "tags", Record::new().with("id", 5).with("ownerId", 1));

        let result = enforcer.delete_record(&mut ctx, "users", &Key::Integer(1));
        assert!(matches!(
            result,
            Err(CoreError::ReferentialIntegrity { ref dependent_collection, .. })
                if dependent_collection == "tags"
        ));
        assert_eq!(ctx.count("users").unwrap(), 1);
        assert_eq!(ctx.count("tags").unwrap(), 1);
    }

    #[test]
    fn set_null_rewrites_dependent_field() {
        let (enforcer, mut ctx) = setup();
        add(&mut ctx, "users", Record::new().with("id", 1));
        add(&mut ctx, "profiles", Record::new().with("id", 7).with("userId", 1));

        enforcer
            .delete_record(&mut ctx, "users", &Key::Integer(1))
            .unwrap();

        let profile = ctx.get("profiles", &Key::Integer(7)).unwrap().unwrap();
        assert_eq!(profile.get("userId"), Some(&Value::Null));
    }

    #[test]
    fn no_action_leaves_orphans() {
        let schema = Arc::new(
            Schema::new()
                .collection(CollectionDef::new("parents").key_path(KeyPath::single("id")))
                .collection(
                    CollectionDef::new("children")
                        .key_path(KeyPath::single("id"))
                        .foreign_key(
                            ForeignKeyRule::new("parentId", "parents")
                                .on_delete(OnDelete::NoAction),
                        ),
                ),
        );
        let engine = MemoryEngine::new();
        for def in schema.iter() {
            engine.create_collection(def.engine_config()).unwrap();
        }
        let names = schema.collection_names();
        let mut ctx = TransactionContext::new(engine.begin(&names, AccessMode::ReadWrite).unwrap());
        let enforcer = ReferentialIntegrityEnforcer::new(schema);

        add(&mut ctx, "parents", Record::new().with("id", 1));
        add(&mut ctx, "children", Record::new().with("id", 2).with("parentId", 1));

        enforcer
            .delete_record(&mut ctx, "parents", &Key::Integer(1))
            .unwrap();
        assert_eq!(ctx.count("children").unwrap(), 1);
    }

    #[test]
    fn cascade_on_self_referencing_chain_terminates() {
        let schema = Arc::new(
            Schema::new().collection(
                CollectionDef::new("nodes")
                    .key_path(KeyPath::single("id"))
                    .foreign_key(
                        ForeignKeyRule::new("parentId", "nodes").on_delete(OnDelete::Cascade),
                    ),
            ),
        );
        let engine = MemoryEngine::new();
        for def in schema.iter() {
            engine.create_collection(def.engine_config()).unwrap();
        }
        let mut ctx = TransactionContext::new(
            engine
                .begin(&schema.collection_names(), AccessMode::ReadWrite)
                .unwrap(),
        );
        let enforcer = ReferentialIntegrityEnforcer::new(schema);

        add(&mut ctx, "nodes", Record::new().with("id", 1));
        add(&mut ctx, "nodes", Record::new().with("id", 2).with("parentId", 1));
        add(&mut ctx, "nodes", Record::new().with("id", 3).with("parentId", 2));

        enforcer
            .delete_record(&mut ctx, "nodes", &Key::Integer(1))
            .unwrap();
        assert_eq!(ctx.count("nodes").unwrap(), 0);
    }

    #[test]
    fn dependents_lookup_uses_declared_index() {
        // posts has by_user on userId: the indexed route must agree with
        // the scan route.
        let (enforcer, mut ctx) = setup();
        add(&mut ctx, "users", Record::new().with("id", 1));
        add(&mut ctx, "users", Record::new().with("id", 2));
        for id in 10..13 {
            add(&mut ctx, "posts", Record::new().with("id", id).with("userId", 1));
        }
        add(&mut ctx, "posts", Record::new().with("id", 13).with("userId", 2));

        let found = enforcer
            .dependents(&mut ctx, "posts", "userId", &Key::Integer(1), None)
            .unwrap();
        assert_eq!(found.len(), 3);

        let limited = enforcer
            .dependents(&mut ctx, "posts", "userId", &Key::Integer(1), Some(1))
            .unwrap();
        assert_eq!(limited.len(), 1);
    }
}
