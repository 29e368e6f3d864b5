//! Database facade wiring the overlay together.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::hub::ChangeHub;
use crate::integrity::ReferentialIntegrityEnforcer;
use crate::live::LiveQuery;
use crate::resolve::{RelationResolver, ResolvedRecord, WithSpec};
use crate::scan::CursorScanner;
use crate::schema::Schema;
use crate::txn::{TransactionContext, TransactionScheduler};
use std::sync::Arc;
use weftdb_codec::{Key, Record};
use weftdb_engine::{Direction, KeyRange, StorageEngine};

/// The main database handle.
///
/// `Database` overlays relational semantics on a supplied storage engine:
/// every mutation is foreign-key validated and delete policies cascade
/// inside one atomic scope; reads can expand declared relations; live
/// queries recompute when their observed collections change.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use weftdb_codec::{KeyPath, Record};
/// use weftdb_core::{CollectionDef, Database, Schema, WithSpec};
/// use weftdb_engine::MemoryEngine;
///
/// let schema = Schema::new()
///     .collection(CollectionDef::new("users").key_path(KeyPath::single("id")));
/// let db = Database::open(Arc::new(MemoryEngine::new()), schema).unwrap();
///
/// db.insert("users", &Record::new().with("id", 1).with("name", "Ada")).unwrap();
/// let users = db.find("users", &WithSpec::new()).unwrap();
/// assert_eq!(users.len(), 1);
/// ```
pub struct Database {
    schema: Arc<Schema>,
    config: Config,
    scheduler: Arc<TransactionScheduler>,
    integrity: ReferentialIntegrityEnforcer,
}

impl Database {
    /// Opens a database over an engine with the default configuration.
    pub fn open(engine: Arc<dyn StorageEngine>, schema: Schema) -> CoreResult<Self> {
        Self::open_with_config(engine, schema, Config::default())
    }

    /// Opens a database over an engine with a custom configuration.
    ///
    /// When `provision_collections` is set, engine collections missing
    /// from the engine are created from the schema.
    pub fn open_with_config(
        engine: Arc<dyn StorageEngine>,
        schema: Schema,
        config: Config,
    ) -> CoreResult<Self> {
        if config.provision_collections {
            for def in schema.iter() {
                if !engine.has_collection(&def.name) {
                    engine.create_collection(def.engine_config())?;
                }
            }
        }
        let schema = Arc::new(schema);
        let hub = Arc::new(ChangeHub::new());
        let scheduler = Arc::new(TransactionScheduler::new(
            engine,
            Arc::clone(&schema),
            hub,
        ));
        let integrity = ReferentialIntegrityEnforcer::new(Arc::clone(&schema));
        Ok(Self {
            schema,
            config,
            scheduler,
            integrity,
        })
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the scheduler, for composing multiple operations into one
    /// atomic scope via its `*_nested` entry points.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<TransactionScheduler> {
        &self.scheduler
    }

    // === Mutations ===

    /// Inserts a record; fails on a duplicate key or a dangling foreign
    /// key. Returns the resolved key.
    pub fn insert(&self, collection: &str, record: &Record) -> CoreResult<Key> {
        self.scheduler
            .write(|ctx| self.insert_in(ctx, collection, record))
    }

    /// [`insert`](Self::insert) within a supplied context.
    pub fn insert_in(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        record: &Record,
    ) -> CoreResult<Key> {
        self.schema.require(collection)?;
        if self.config.enforce_foreign_keys {
            self.integrity.validate_record(ctx, collection, record)?;
        }
        ctx.add(collection, None, record)
    }

    /// Inserts or replaces a record, foreign keys validated. Returns the
    /// resolved key.
    pub fn put(&self, collection: &str, record: &Record) -> CoreResult<Key> {
        self.scheduler
            .write(|ctx| self.put_in(ctx, collection, record))
    }

    /// [`put`](Self::put) within a supplied context.
    pub fn put_in(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        record: &Record,
    ) -> CoreResult<Key> {
        self.schema.require(collection)?;
        if self.config.enforce_foreign_keys {
            self.integrity.validate_record(ctx, collection, record)?;
        }
        ctx.put(collection, None, record)
    }

    /// Replaces an existing record; fails if the key is absent.
    pub fn update(&self, collection: &str, key: &Key, record: &Record) -> CoreResult<()> {
        self.scheduler
            .write(|ctx| self.update_in(ctx, collection, key, record))
    }

    /// [`update`](Self::update) within a supplied context.
    pub fn update_in(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        key: &Key,
        record: &Record,
    ) -> CoreResult<()> {
        self.schema.require(collection)?;
        if ctx.get(collection, key)?.is_none() {
            return Err(CoreError::invalid_operation(format!(
                "update of missing key {key} in {collection:?}"
            )));
        }
        if self.config.enforce_foreign_keys {
            self.integrity.validate_record(ctx, collection, record)?;
        }
        ctx.put(collection, Some(key.clone()), record)?;
        Ok(())
    }

    /// Deletes a record, applying on-delete policies to dependents.
    pub fn delete(&self, collection: &str, key: &Key) -> CoreResult<()> {
        self.scheduler
            .write(|ctx| self.delete_in(ctx, collection, key))
    }

    /// [`delete`](Self::delete) within a supplied context.
    pub fn delete_in(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        key: &Key,
    ) -> CoreResult<()> {
        self.schema.require(collection)?;
        if self.config.enforce_foreign_keys {
            self.integrity.delete_record(ctx, collection, key)
        } else {
            ctx.delete(collection, key)
        }
    }

    /// Deletes every record in a collection. Delete policies are not
    /// applied; dependents are untouched.
    pub fn clear(&self, collection: &str) -> CoreResult<()> {
        self.schema.require(collection)?;
        self.scheduler.write(|ctx| ctx.clear(collection))
    }

    // === Reads ===

    /// Fetches a record by primary key.
    pub fn get(&self, collection: &str, key: &Key) -> CoreResult<Option<Record>> {
        self.schema.require(collection)?;
        self.scheduler.read(|ctx| ctx.get(collection, key))
    }

    /// Returns all records in ascending key order.
    pub fn get_all(&self, collection: &str) -> CoreResult<Vec<(Key, Record)>> {
        self.schema.require(collection)?;
        self.scheduler.read(|ctx| ctx.get_all(collection))
    }

    /// Counts the records in a collection.
    pub fn count(&self, collection: &str) -> CoreResult<usize> {
        self.schema.require(collection)?;
        self.scheduler.read(|ctx| ctx.count(collection))
    }

    /// Returns all records with the requested relations populated.
    pub fn find(&self, collection: &str, with: &WithSpec) -> CoreResult<Vec<ResolvedRecord>> {
        self.find_where(collection, |_| true, with)
    }

    /// Returns records matching `predicate`, with the requested relations
    /// populated.
    pub fn find_where<P>(
        &self,
        collection: &str,
        predicate: P,
        with: &WithSpec,
    ) -> CoreResult<Vec<ResolvedRecord>>
    where
        P: FnMut(&Record) -> bool,
    {
        self.schema.require(collection)?;
        self.scheduler
            .read(|ctx| self.find_in(ctx, collection, predicate, with))
    }

    /// [`find_where`](Self::find_where) within a supplied context.
    pub fn find_in<P>(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        predicate: P,
        with: &WithSpec,
    ) -> CoreResult<Vec<ResolvedRecord>>
    where
        P: FnMut(&Record) -> bool,
    {
        let roots = CursorScanner::new(ctx, collection).scan_where(predicate, None)?;
        let resolver = RelationResolver::new(Arc::clone(&self.schema), collection);
        resolver.resolve(ctx, roots, with)
    }

    /// Returns all index entries whose key falls in the range, in index
    /// order.
    pub fn range(
        &self,
        collection: &str,
        index: &str,
        range: &KeyRange,
    ) -> CoreResult<Vec<(Key, Record)>> {
        self.schema.require(collection)?;
        self.scheduler.read(|ctx| {
            let entries = CursorScanner::new(ctx, collection).range_scan(index, range)?;
            Ok(entries
                .into_iter()
                .map(|e| (e.primary_key, e.record))
                .collect())
        })
    }

    /// Returns the first record scanning an index forward or backward.
    pub fn first(
        &self,
        collection: &str,
        index: &str,
        direction: Direction,
    ) -> CoreResult<Option<(Key, Record)>> {
        self.schema.require(collection)?;
        self.scheduler.read(|ctx| {
            let entry = CursorScanner::new(ctx, collection).first_by_direction(index, direction)?;
            Ok(entry.map(|e| (e.primary_key, e.record)))
        })
    }

    /// Creates a live query over an arbitrary read computation.
    pub fn live<T, F>(&self, compute: F) -> LiveQuery<T>
    where
        T: Clone + Send + 'static,
        F: Fn(&mut TransactionContext) -> CoreResult<T> + Send + Sync + 'static,
    {
        LiveQuery::new(Arc::clone(&self.scheduler), compute)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("collections", &self.schema.collection_names())
            .finish_non_exhaustive()
    }
}
