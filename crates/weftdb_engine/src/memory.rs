//! In-memory reference engine.

use crate::config::CollectionConfig;
use crate::error::{EngineError, EngineResult};
use crate::keyrange::KeyRange;
use crate::traits::{AccessMode, CursorEntry, Direction, EngineCursor, EngineTransaction, StorageEngine};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use weftdb_codec::{decode_record, encode_record, Key, KeyPath, Record};

/// An in-memory storage engine.
///
/// `MemoryEngine` is the reference implementation of the engine traits,
/// used by every test in the workspace. Records are stored as canonical
/// CBOR payloads in ordered maps; transactions stage their writes and
/// apply them atomically under the store lock at commit.
///
/// It is not a persistence layer: data lives only as long as the engine.
pub struct MemoryEngine {
    store: Arc<RwLock<Store>>,
}

struct Store {
    collections: BTreeMap<String, CollectionData>,
}

struct CollectionData {
    config: CollectionConfig,
    rows: BTreeMap<Key, Vec<u8>>,
    next_auto: i64,
}

impl MemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Store {
                collections: BTreeMap::new(),
            })),
        }
    }

    /// Returns the number of committed records in a collection.
    pub fn committed_count(&self, collection: &str) -> EngineResult<usize> {
        let store = self.store.read();
        let data = store
            .collections
            .get(collection)
            .ok_or_else(|| EngineError::collection_not_found(collection))?;
        Ok(data.rows.len())
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemoryEngine {
    fn create_collection(&self, config: CollectionConfig) -> EngineResult<()> {
        let mut store = self.store.write();
        if store.collections.contains_key(&config.name) {
            return Err(EngineError::corrupted(format!(
                "collection {:?} already exists",
                config.name
            )));
        }
        store.collections.insert(
            config.name.clone(),
            CollectionData {
                config,
                rows: BTreeMap::new(),
                next_auto: 0,
            },
        );
        Ok(())
    }

    fn delete_collection(&self, name: &str) -> EngineResult<()> {
        let mut store = self.store.write();
        store
            .collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::collection_not_found(name))
    }

    fn has_collection(&self, name: &str) -> bool {
        self.store.read().collections.contains_key(name)
    }

    fn collection_names(&self) -> Vec<String> {
        self.store.read().collections.keys().cloned().collect()
    }

    fn begin(&self, scope: &[String], mode: AccessMode) -> EngineResult<Box<dyn EngineTransaction>> {
        {
            let store = self.store.read();
            for name in scope {
                if !store.collections.contains_key(name) {
                    return Err(EngineError::collection_not_found(name.clone()));
                }
            }
        }
        Ok(Box::new(MemoryTransaction {
            store: Arc::clone(&self.store),
            scope: scope.iter().cloned().collect(),
            mode,
            settled: false,
            staged: BTreeMap::new(),
        }))
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.read();
        f.debug_struct("MemoryEngine")
            .field("collections", &store.collections.len())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct StagedCollection {
    cleared: bool,
    writes: BTreeMap<Key, Option<Vec<u8>>>,
}

struct MemoryTransaction {
    store: Arc<RwLock<Store>>,
    scope: BTreeSet<String>,
    mode: AccessMode,
    settled: bool,
    staged: BTreeMap<String, StagedCollection>,
}

impl MemoryTransaction {
    fn check_access(&self, collection: &str, write: bool) -> EngineResult<()> {
        if self.settled {
            return Err(EngineError::TransactionSettled);
        }
        if !self.scope.contains(collection) {
            return Err(EngineError::out_of_scope(collection));
        }
        if write && self.mode == AccessMode::ReadOnly {
            return Err(EngineError::ReadOnly);
        }
        Ok(())
    }

    /// Builds the scope-visible row set: committed rows overlaid with
    /// staged writes (read-your-writes).
    fn merged_rows(&self, store: &Store, collection: &str) -> EngineResult<BTreeMap<Key, Vec<u8>>> {
        let data = store
            .collections
            .get(collection)
            .ok_or_else(|| EngineError::collection_not_found(collection))?;
        let staged = self.staged.get(collection);
        let mut rows = match staged {
            Some(sc) if sc.cleared => BTreeMap::new(),
            _ => data.rows.clone(),
        };
        if let Some(sc) = staged {
            for (key, write) in &sc.writes {
                match write {
                    Some(payload) => {
                        rows.insert(key.clone(), payload.clone());
                    }
                    None => {
                        rows.remove(key);
                    }
                }
            }
        }
        Ok(rows)
    }

    fn resolve_key(
        data: &mut CollectionData,
        explicit: Option<Key>,
        record: &Record,
    ) -> EngineResult<Key> {
        if let Some(path) = &data.config.key_path {
            return Ok(record.key_of(path)?);
        }
        if let Some(key) = explicit {
            return Ok(key);
        }
        if data.config.auto_key {
            data.next_auto += 1;
            return Ok(Key::Integer(data.next_auto));
        }
        Err(EngineError::MissingKey {
            collection: data.config.name.clone(),
        })
    }

    fn stage_write(
        &mut self,
        collection: &str,
        explicit: Option<Key>,
        record: &Record,
        fail_on_duplicate: bool,
    ) -> EngineResult<Key> {
        self.check_access(collection, true)?;
        let payload = encode_record(record)?;
        let mut store = self.store.write();
        let merged = self.merged_rows(&store, collection)?;
        let data = store
            .collections
            .get_mut(collection)
            .ok_or_else(|| EngineError::collection_not_found(collection))?;
        let key = Self::resolve_key(data, explicit, record)?;
        drop(store);

        if fail_on_duplicate && merged.contains_key(&key) {
            return Err(EngineError::duplicate_key(collection, key));
        }
        self.staged
            .entry(collection.to_string())
            .or_default()
            .writes
            .insert(key.clone(), Some(payload));
        Ok(key)
    }

    fn materialize(
        &self,
        collection: &str,
        index: Option<&str>,
        range: Option<&KeyRange>,
        direction: Direction,
    ) -> EngineResult<Vec<CursorEntry>> {
        let store = self.store.read();
        let rows = self.merged_rows(&store, collection)?;
        let mut entries = match index {
            None => {
                let mut entries = Vec::with_capacity(rows.len());
                for (key, payload) in rows {
                    entries.push(CursorEntry {
                        primary_key: key,
                        index_key: None,
                        record: decode_record(&payload)?,
                    });
                }
                entries
            }
            Some(index_name) => {
                let data = store
                    .collections
                    .get(collection)
                    .ok_or_else(|| EngineError::collection_not_found(collection))?;
                let index_config =
                    data.config
                        .find_index(index_name)
                        .ok_or_else(|| EngineError::IndexNotFound {
                            collection: collection.to_string(),
                            index: index_name.to_string(),
                        })?;
                let fields = index_config.fields.clone();
                let mut entries = Vec::new();
                for (key, payload) in rows {
                    let record = decode_record(&payload)?;
                    // Rows whose indexed fields are absent or not key-able
                    // are simply not present in the index.
                    let Some(index_key) = extract_index_key(&record, &fields) else {
                        continue;
                    };
                    if let Some(range) = range {
                        if !range.contains(&index_key) {
                            continue;
                        }
                    }
                    entries.push(CursorEntry {
                        primary_key: key,
                        index_key: Some(index_key),
                        record,
                    });
                }
                entries.sort_by(|a, b| {
                    (a.index_key.as_ref(), &a.primary_key).cmp(&(b.index_key.as_ref(), &b.primary_key))
                });
                entries
            }
        };
        if direction == Direction::Reverse {
            entries.reverse();
        }
        Ok(entries)
    }
}

fn extract_index_key(record: &Record, fields: &KeyPath) -> Option<Key> {
    record.key_of(fields).ok()
}

impl EngineTransaction for MemoryTransaction {
    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn is_settled(&self) -> bool {
        self.settled
    }

    fn get(&mut self, collection: &str, key: &Key) -> EngineResult<Option<Record>> {
        self.check_access(collection, false)?;
        if let Some(sc) = self.staged.get(collection) {
            if let Some(write) = sc.writes.get(key) {
                return match write {
                    Some(payload) => Ok(Some(decode_record(payload)?)),
                    None => Ok(None),
                };
            }
            if sc.cleared {
                return Ok(None);
            }
        }
        let store = self.store.read();
        let data = store
            .collections
            .get(collection)
            .ok_or_else(|| EngineError::collection_not_found(collection))?;
        match data.rows.get(key) {
            Some(payload) => Ok(Some(decode_record(payload)?)),
            None => Ok(None),
        }
    }

    fn get_all(&mut self, collection: &str) -> EngineResult<Vec<(Key, Record)>> {
        self.check_access(collection, false)?;
        let entries = self.materialize(collection, None, None, Direction::Forward)?;
        Ok(entries
            .into_iter()
            .map(|e| (e.primary_key, e.record))
            .collect())
    }

    fn count(&mut self, collection: &str) -> EngineResult<usize> {
        self.check_access(collection, false)?;
        let store = self.store.read();
        Ok(self.merged_rows(&store, collection)?.len())
    }

    fn add(&mut self, collection: &str, key: Option<Key>, record: &Record) -> EngineResult<Key> {
        self.stage_write(collection, key, record, true)
    }

    fn put(&mut self, collection: &str, key: Option<Key>, record: &Record) -> EngineResult<Key> {
        self.stage_write(collection, key, record, false)
    }

    fn delete(&mut self, collection: &str, key: &Key) -> EngineResult<()> {
        self.check_access(collection, true)?;
        self.staged
            .entry(collection.to_string())
            .or_default()
            .writes
            .insert(key.clone(), None);
        Ok(())
    }

    fn clear(&mut self, collection: &str) -> EngineResult<()> {
        self.check_access(collection, true)?;
        let sc = self.staged.entry(collection.to_string()).or_default();
        sc.cleared = true;
        sc.writes.clear();
        Ok(())
    }

    fn open_cursor(
        &mut self,
        collection: &str,
        direction: Direction,
    ) -> EngineResult<Box<dyn EngineCursor>> {
        self.check_access(collection, false)?;
        let entries = self.materialize(collection, None, None, direction)?;
        Ok(Box::new(MemoryCursor {
            entries: entries.into_iter(),
        }))
    }

    fn open_index_cursor(
        &mut self,
        collection: &str,
        index: &str,
        range: Option<&KeyRange>,
        direction: Direction,
    ) -> EngineResult<Box<dyn EngineCursor>> {
        self.check_access(collection, false)?;
        let entries = self.materialize(collection, Some(index), range, direction)?;
        Ok(Box::new(MemoryCursor {
            entries: entries.into_iter(),
        }))
    }

    fn index_get_all(
        &mut self,
        collection: &str,
        index: &str,
        range: Option<&KeyRange>,
    ) -> EngineResult<Vec<CursorEntry>> {
        self.check_access(collection, false)?;
        self.materialize(collection, Some(index), range, Direction::Forward)
    }

    fn commit(&mut self) -> EngineResult<()> {
        if self.settled {
            return Err(EngineError::TransactionSettled);
        }
        let mut store = self.store.write();

        // Validate unique indexes against the post-commit view before
        // applying anything.
        for name in self.staged.keys() {
            let final_rows = self.merged_rows(&store, name)?;
            let data = store
                .collections
                .get(name)
                .ok_or_else(|| EngineError::collection_not_found(name.clone()))?;
            for index in data.config.indexes.iter().filter(|i| i.unique) {
                let mut seen: HashMap<Key, Key> = HashMap::new();
                for (key, payload) in &final_rows {
                    let record = decode_record(payload)?;
                    if let Some(index_key) = extract_index_key(&record, &index.fields) {
                        if seen.insert(index_key.clone(), key.clone()).is_some() {
                            return Err(EngineError::UniqueConstraint {
                                collection: name.clone(),
                                index: index.name.clone(),
                                key: index_key,
                            });
                        }
                    }
                }
            }
        }

        for (name, sc) in std::mem::take(&mut self.staged) {
            let data = store
                .collections
                .get_mut(&name)
                .ok_or_else(|| EngineError::collection_not_found(name.clone()))?;
            if sc.cleared {
                data.rows.clear();
            }
            for (key, write) in sc.writes {
                match write {
                    Some(payload) => {
                        data.rows.insert(key, payload);
                    }
                    None => {
                        data.rows.remove(&key);
                    }
                }
            }
        }
        self.settled = true;
        Ok(())
    }

    fn abort(&mut self) -> EngineResult<()> {
        if self.settled {
            return Err(EngineError::TransactionSettled);
        }
        self.staged.clear();
        self.settled = true;
        Ok(())
    }
}

struct MemoryCursor {
    entries: std::vec::IntoIter<CursorEntry>,
}

impl EngineCursor for MemoryCursor {
    fn advance(&mut self) -> EngineResult<Option<CursorEntry>> {
        Ok(self.entries.next())
    }
}
