//! Cursor-based scanning and iteration primitives.

use crate::error::CoreResult;
use crate::txn::TransactionContext;
use weftdb_codec::{Key, Record};
use weftdb_engine::{CursorEntry, Direction, EngineCursor, KeyRange};

/// A lazily-pulled, single-consumption sequence over an engine cursor.
///
/// Bridges the engine's stepwise `advance` protocol into a fused
/// iterator: each `next` call pulls exactly one entry, and once the
/// stream yields `None` (or an error) the underlying cursor is dropped
/// and the stream is permanently exhausted - it can never be restarted.
pub struct RecordStream {
    cursor: Option<Box<dyn EngineCursor>>,
}

impl RecordStream {
    /// Wraps an engine cursor.
    #[must_use]
    pub fn new(cursor: Box<dyn EngineCursor>) -> Self {
        Self {
            cursor: Some(cursor),
        }
    }

    /// Checks whether the stream has terminated.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_none()
    }
}

impl Iterator for RecordStream {
    type Item = CoreResult<CursorEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        match cursor.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.cursor = None;
                None
            }
            Err(e) => {
                self.cursor = None;
                Some(Err(e.into()))
            }
        }
    }
}

impl std::iter::FusedIterator for RecordStream {}

/// Sequential and ranged traversal over one collection.
///
/// All operations run within the already-open scope of the borrowed
/// context; none of them commit or abort it.
pub struct CursorScanner<'a> {
    ctx: &'a mut TransactionContext,
    collection: String,
}

impl<'a> CursorScanner<'a> {
    /// Creates a scanner over a collection.
    pub fn new(ctx: &'a mut TransactionContext, collection: impl Into<String>) -> Self {
        Self {
            ctx,
            collection: collection.into(),
        }
    }

    /// Opens a full forward scan as a lazily-pulled stream.
    pub fn stream(&mut self) -> CoreResult<RecordStream> {
        let cursor = self.ctx.open_cursor(&self.collection, Direction::Forward)?;
        Ok(RecordStream::new(cursor))
    }

    /// Opens an index scan as a lazily-pulled stream.
    pub fn index_stream(
        &mut self,
        index: &str,
        range: Option<&KeyRange>,
        direction: Direction,
    ) -> CoreResult<RecordStream> {
        let cursor = self
            .ctx
            .open_index_cursor(&self.collection, index, range, direction)?;
        Ok(RecordStream::new(cursor))
    }

    /// Scans forward, collecting records matching `predicate`.
    ///
    /// Result order is cursor order (ascending key order). Stops after
    /// `limit` matches or at exhaustion.
    pub fn scan_where<P>(
        &mut self,
        mut predicate: P,
        limit: Option<usize>,
    ) -> CoreResult<Vec<(Key, Record)>>
    where
        P: FnMut(&Record) -> bool,
    {
        let mut matches = Vec::new();
        if limit == Some(0) {
            return Ok(matches);
        }
        let stream = self.stream()?;
        for entry in stream {
            let entry = entry?;
            if !predicate(&entry.record) {
                continue;
            }
            matches.push((entry.primary_key, entry.record));
            if let Some(limit) = limit {
                if matches.len() >= limit {
                    break;
                }
            }
        }
        Ok(matches)
    }

    /// Scans forward, deleting records matching `predicate`.
    ///
    /// For each match, `before` runs first: `Ok(true)` proceeds with the
    /// delete, `Ok(false)` is a non-exceptional veto that skips this
    /// record (it does not count toward `limit`), and an error aborts the
    /// whole scan. `after` runs after each successful delete. Returns the
    /// number of records deleted.
    pub fn delete_where<P>(
        &mut self,
        mut predicate: P,
        limit: Option<usize>,
        mut before: Option<&mut dyn FnMut(&Key, &Record) -> CoreResult<bool>>,
        mut after: Option<&mut dyn FnMut(&Key, &Record) -> CoreResult<()>>,
    ) -> CoreResult<usize>
    where
        P: FnMut(&Record) -> bool,
    {
        let mut deleted = 0;
        if limit == Some(0) {
            return Ok(deleted);
        }
        let stream = self.stream()?;
        for entry in stream {
            let entry = entry?;
            if !predicate(&entry.record) {
                continue;
            }
            if let Some(before) = before.as_deref_mut() {
                if !before(&entry.primary_key, &entry.record)? {
                    continue;
                }
            }
            self.ctx.delete(&self.collection, &entry.primary_key)?;
            deleted += 1;
            if let Some(after) = after.as_deref_mut() {
                after(&entry.primary_key, &entry.record)?;
            }
            if let Some(limit) = limit {
                if deleted >= limit {
                    break;
                }
            }
        }
        Ok(deleted)
    }

    /// Returns all index entries whose key falls in the range, in index
    /// order.
    pub fn range_scan(&mut self, index: &str, range: &KeyRange) -> CoreResult<Vec<CursorEntry>> {
        self.ctx.index_get_all(&self.collection, index, Some(range))
    }

    /// Returns the first entry scanning the index in the given direction,
    /// or `None` if the index is empty.
    pub fn first_by_direction(
        &mut self,
        index: &str,
        direction: Direction,
    ) -> CoreResult<Option<CursorEntry>> {
        let mut stream = self.index_stream(index, None, direction)?;
        stream.next().transpose()
    }
}
