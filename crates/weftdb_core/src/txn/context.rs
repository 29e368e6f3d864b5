//! Transaction context: one scoped, atomic unit of work.

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeSet;
use tracing::warn;
use weftdb_codec::{Key, Record};
use weftdb_engine::{AccessMode, CursorEntry, Direction, EngineCursor, EngineTransaction, KeyRange};

/// Settlement state of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// The scope is open and can perform operations.
    Active,
    /// The scope committed successfully.
    Committed,
    /// The scope was aborted, explicitly or via an error.
    Aborted,
}

type StagedCallback = Box<dyn FnOnce(&mut TransactionContext) -> CoreResult<()> + Send>;
type CommittedCallback = Box<dyn FnOnce() + Send>;

/// One scoped, atomic unit of work over the engine.
///
/// A context wraps a single engine transaction and is shared by reference
/// across all operations composed into the same logical unit of work. It
/// tracks:
///
/// - keyed pre-commit callbacks (last writer wins per key, registration
///   order preserved) that run before settlement,
/// - post-commit callbacks that fire strictly after a successful commit,
/// - the collections read (observed) and written (touched) through it.
///
/// Once settled - committed or aborted - a context never re-enters an
/// active state, and `abort` is idempotent.
pub struct TransactionContext {
    txn: Box<dyn EngineTransaction>,
    state: ScopeState,
    abort_reason: Option<String>,
    staged: Vec<(String, StagedCallback)>,
    committed: Vec<CommittedCallback>,
    observed: BTreeSet<String>,
    touched: BTreeSet<String>,
}

impl TransactionContext {
    /// Wraps an engine transaction in a new context.
    pub fn new(txn: Box<dyn EngineTransaction>) -> Self {
        Self {
            txn,
            state: ScopeState::Active,
            abort_reason: None,
            staged: Vec::new(),
            committed: Vec::new(),
            observed: BTreeSet::new(),
            touched: BTreeSet::new(),
        }
    }

    /// Returns the scope's access mode.
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.txn.mode()
    }

    /// Returns the settlement state.
    #[must_use]
    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// Checks whether the scope is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ScopeState::Active
    }

    /// Returns the collections read through this context.
    #[must_use]
    pub fn observed(&self) -> &BTreeSet<String> {
        &self.observed
    }

    /// Returns the collections written through this context.
    #[must_use]
    pub fn touched(&self) -> &BTreeSet<String> {
        &self.touched
    }

    /// Registers a keyed pre-commit callback.
    ///
    /// All staged callbacks run after the scope body and before
    /// settlement, in registration order. Re-registering a key replaces
    /// the callback but keeps its original position. A callback error
    /// aborts the scope.
    ///
    /// # Errors
    ///
    /// Fails on a settled context and on read-only scopes, which have no
    /// pre-commit staging.
    pub fn on_will_commit<F>(&mut self, key: impl Into<String>, callback: F) -> CoreResult<()>
    where
        F: FnOnce(&mut TransactionContext) -> CoreResult<()> + Send + 'static,
    {
        self.ensure_active()?;
        if self.mode() == AccessMode::ReadOnly {
            return Err(CoreError::invalid_operation(
                "read-only scopes have no pre-commit staging",
            ));
        }
        let key = key.into();
        let boxed: StagedCallback = Box::new(callback);
        if let Some(slot) = self.staged.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = boxed;
        } else {
            self.staged.push((key, boxed));
        }
        Ok(())
    }

    /// Registers a callback fired strictly after a successful commit.
    ///
    /// Post-commit callbacks never fire for aborted or errored scopes.
    pub fn on_did_commit<F>(&mut self, callback: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_active()?;
        self.committed.push(Box::new(callback));
        Ok(())
    }

    /// Requests termination of the scope.
    ///
    /// Idempotent: aborting a settled scope does nothing. A failure from
    /// the engine's own abort call is swallowed and logged - the scope is
    /// marked aborted regardless.
    pub fn abort(&mut self) {
        self.abort_with_reason("aborted by caller");
    }

    /// Aborts the scope, recording the reason carried by the resulting
    /// [`CoreError::Aborted`].
    pub fn abort_with_reason(&mut self, reason: impl Into<String>) {
        if self.state != ScopeState::Active {
            return;
        }
        if let Err(e) = self.txn.abort() {
            warn!(error = %e, "engine abort failed; scope marked aborted anyway");
        }
        self.state = ScopeState::Aborted;
        self.abort_reason = Some(reason.into());
    }

    /// Settles the scope: drains staged callbacks, then commits.
    ///
    /// The first terminal signal wins: an abort requested by a staged
    /// callback (or earlier) takes precedence over commit, and an engine
    /// commit failure marks the scope aborted. Post-commit callbacks fire
    /// only on the successful path.
    pub(crate) fn settle(&mut self) -> CoreResult<()> {
        if self.state == ScopeState::Aborted {
            return Err(self.aborted_error());
        }
        // Staged callbacks may register further staged work; drain until
        // the queue is empty.
        while !self.staged.is_empty() {
            let batch = std::mem::take(&mut self.staged);
            for (key, callback) in batch {
                if let Err(e) = callback(self) {
                    self.abort_with_reason(format!("pre-commit callback {key:?} failed: {e}"));
                    return Err(e);
                }
                if self.state == ScopeState::Aborted {
                    return Err(self.aborted_error());
                }
            }
        }
        match self.txn.commit() {
            Ok(()) => {
                self.state = ScopeState::Committed;
                for callback in std::mem::take(&mut self.committed) {
                    callback();
                }
                Ok(())
            }
            Err(e) => {
                self.state = ScopeState::Aborted;
                self.abort_reason = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    fn aborted_error(&self) -> CoreError {
        CoreError::aborted(
            self.abort_reason
                .clone()
                .unwrap_or_else(|| "aborted".to_string()),
        )
    }

    fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            ScopeState::Active => Ok(()),
            ScopeState::Committed => {
                Err(CoreError::invalid_operation("scope already committed"))
            }
            ScopeState::Aborted => Err(CoreError::invalid_operation("scope already aborted")),
        }
    }

    // === Data operations ===
    //
    // All delegate to the engine transaction, recording reads in the
    // observed set and writes in the touched set.

    /// Fetches a record by primary key.
    pub fn get(&mut self, collection: &str, key: &Key) -> CoreResult<Option<Record>> {
        self.ensure_active()?;
        self.observed.insert(collection.to_string());
        Ok(self.txn.get(collection, key)?)
    }

    /// Returns all records in ascending key order.
    pub fn get_all(&mut self, collection: &str) -> CoreResult<Vec<(Key, Record)>> {
        self.ensure_active()?;
        self.observed.insert(collection.to_string());
        Ok(self.txn.get_all(collection)?)
    }

    /// Counts the records in a collection.
    pub fn count(&mut self, collection: &str) -> CoreResult<usize> {
        self.ensure_active()?;
        self.observed.insert(collection.to_string());
        Ok(self.txn.count(collection)?)
    }

    /// Inserts a record; fails on a duplicate key. Returns the resolved key.
    pub fn add(&mut self, collection: &str, key: Option<Key>, record: &Record) -> CoreResult<Key> {
        self.ensure_active()?;
        self.touched.insert(collection.to_string());
        Ok(self.txn.add(collection, key, record)?)
    }

    /// Inserts or replaces a record. Returns the resolved key.
    pub fn put(&mut self, collection: &str, key: Option<Key>, record: &Record) -> CoreResult<Key> {
        self.ensure_active()?;
        self.touched.insert(collection.to_string());
        Ok(self.txn.put(collection, key, record)?)
    }

    /// Deletes a record by primary key.
    pub fn delete(&mut self, collection: &str, key: &Key) -> CoreResult<()> {
        self.ensure_active()?;
        self.touched.insert(collection.to_string());
        Ok(self.txn.delete(collection, key)?)
    }

    /// Deletes every record in a collection.
    pub fn clear(&mut self, collection: &str) -> CoreResult<()> {
        self.ensure_active()?;
        self.touched.insert(collection.to_string());
        Ok(self.txn.clear(collection)?)
    }

    /// Opens a cursor over a collection in key order.
    pub fn open_cursor(
        &mut self,
        collection: &str,
        direction: Direction,
    ) -> CoreResult<Box<dyn EngineCursor>> {
        self.ensure_active()?;
        self.observed.insert(collection.to_string());
        Ok(self.txn.open_cursor(collection, direction)?)
    }

    /// Opens a cursor over a secondary index.
    pub fn open_index_cursor(
        &mut self,
        collection: &str,
        index: &str,
        range: Option<&KeyRange>,
        direction: Direction,
    ) -> CoreResult<Box<dyn EngineCursor>> {
        self.ensure_active()?;
        self.observed.insert(collection.to_string());
        Ok(self.txn.open_index_cursor(collection, index, range, direction)?)
    }

    /// Returns all index entries in a range, in index-key order.
    pub fn index_get_all(
        &mut self,
        collection: &str,
        index: &str,
        range: Option<&KeyRange>,
    ) -> CoreResult<Vec<CursorEntry>> {
        self.ensure_active()?;
        self.observed.insert(collection.to_string());
        Ok(self.txn.index_get_all(collection, index, range)?)
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("state", &self.state)
            .field("staged", &self.staged.len())
            .field("observed", &self.observed)
            .field("touched", &self.touched)
            .finish_non_exhaustive()
    }
}
