//! Storage engine trait surface.

use crate::config::CollectionConfig;
use crate::error::EngineResult;
use crate::keyrange::KeyRange;
use weftdb_codec::{Key, Record};

/// Access mode of a transaction scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Reads only; mutations are rejected.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// Traversal direction for cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending key order.
    Forward,
    /// Descending key order.
    Reverse,
}

/// A single entry yielded by a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorEntry {
    /// The record's primary key.
    pub primary_key: Key,
    /// The index key this entry was reached through, for index cursors.
    pub index_key: Option<Key>,
    /// The record itself.
    pub record: Record,
}

/// A transactional key-value storage engine.
///
/// The engine is an external collaborator: it owns collections, keys,
/// secondary indexes, and atomic scopes. It knows nothing about relations,
/// foreign keys, or live queries - those semantics are layered on top by
/// `weftdb_core`.
///
/// # Invariants
///
/// - A scope settles exactly once: `commit` or `abort`, never both.
/// - Writes staged in a scope are visible to reads in the same scope
///   (read-your-writes) and invisible elsewhere until commit.
/// - Cursor order is ascending primary-key order for collection cursors
///   and ascending index-key order for index cursors (reversed for
///   [`Direction::Reverse`]).
pub trait StorageEngine: Send + Sync {
    /// Creates a collection.
    ///
    /// # Errors
    ///
    /// Fails if a collection with the same name already exists.
    fn create_collection(&self, config: CollectionConfig) -> EngineResult<()>;

    /// Deletes a collection and all its records.
    fn delete_collection(&self, name: &str) -> EngineResult<()>;

    /// Checks whether a collection exists.
    fn has_collection(&self, name: &str) -> bool;

    /// Returns the names of all collections.
    fn collection_names(&self) -> Vec<String>;

    /// Begins a scope over the named collections.
    ///
    /// Operations inside the scope may only touch declared collections.
    ///
    /// # Errors
    ///
    /// Fails if any named collection does not exist.
    fn begin(&self, scope: &[String], mode: AccessMode) -> EngineResult<Box<dyn EngineTransaction>>;
}

/// One atomic scope over a set of collections.
///
/// All operations are fallible engine calls; implementations are expected
/// to reject access to undeclared collections and mutations in read-only
/// mode.
pub trait EngineTransaction: Send {
    /// Returns the scope's access mode.
    fn mode(&self) -> AccessMode;

    /// Checks whether the scope has already settled.
    fn is_settled(&self) -> bool;

    /// Fetches a record by primary key.
    fn get(&mut self, collection: &str, key: &Key) -> EngineResult<Option<Record>>;

    /// Returns all records in ascending key order.
    fn get_all(&mut self, collection: &str) -> EngineResult<Vec<(Key, Record)>>;

    /// Counts the records in a collection.
    fn count(&mut self, collection: &str) -> EngineResult<usize>;

    /// Inserts a record; fails on a duplicate key.
    ///
    /// The effective key is resolved in order: the collection's key path,
    /// the explicit `key` argument, then an engine-assigned auto-key.
    /// Returns the resolved key.
    fn add(&mut self, collection: &str, key: Option<Key>, record: &Record) -> EngineResult<Key>;

    /// Inserts or replaces a record (upsert). Returns the resolved key.
    fn put(&mut self, collection: &str, key: Option<Key>, record: &Record) -> EngineResult<Key>;

    /// Deletes a record by primary key. Deleting an absent key is a no-op.
    fn delete(&mut self, collection: &str, key: &Key) -> EngineResult<()>;

    /// Deletes every record in a collection.
    fn clear(&mut self, collection: &str) -> EngineResult<()>;

    /// Opens a cursor over a collection in key order.
    fn open_cursor(
        &mut self,
        collection: &str,
        direction: Direction,
    ) -> EngineResult<Box<dyn EngineCursor>>;

    /// Opens a cursor over a secondary index, optionally restricted to a
    /// key range, in index-key order.
    fn open_index_cursor(
        &mut self,
        collection: &str,
        index: &str,
        range: Option<&KeyRange>,
        direction: Direction,
    ) -> EngineResult<Box<dyn EngineCursor>>;

    /// Returns all index entries in a range, in index-key order.
    fn index_get_all(
        &mut self,
        collection: &str,
        index: &str,
        range: Option<&KeyRange>,
    ) -> EngineResult<Vec<CursorEntry>>;

    /// Commits the scope, making staged writes durable and visible.
    fn commit(&mut self) -> EngineResult<()>;

    /// Aborts the scope, discarding staged writes.
    fn abort(&mut self) -> EngineResult<()>;
}

/// The engine's stepwise cursor protocol.
///
/// Each `advance` call yields the next entry or `None` at exhaustion.
/// Implementations are not required to tolerate advancing past
/// exhaustion; callers wrap cursors in a fused stream.
pub trait EngineCursor: Send {
    /// Advances the cursor one step.
    fn advance(&mut self) -> EngineResult<Option<CursorEntry>>;
}
