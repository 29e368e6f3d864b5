//! Transaction scheduler: obtains or reuses contexts for operations.

use crate::error::CoreResult;
use crate::hub::ChangeHub;
use crate::schema::Schema;
use crate::txn::context::TransactionContext;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use weftdb_engine::{AccessMode, StorageEngine};

/// Supplies transaction contexts for operations.
///
/// Mutations run in read-write scopes; queries run in read-only scopes.
/// Composed operations share one atomic scope through the `*_nested`
/// entry points: when the caller supplies an active context, the handler
/// runs against it directly and no new scope is opened or settled. The
/// ambient context is an explicit parameter, not hidden task-local state.
pub struct TransactionScheduler {
    engine: Arc<dyn StorageEngine>,
    schema: Arc<Schema>,
    hub: Arc<ChangeHub>,
}

impl TransactionScheduler {
    /// Creates a scheduler over an engine and schema.
    pub fn new(engine: Arc<dyn StorageEngine>, schema: Arc<Schema>, hub: Arc<ChangeHub>) -> Self {
        Self {
            engine,
            schema,
            hub,
        }
    }

    /// Returns the change hub commits are published to.
    #[must_use]
    pub fn hub(&self) -> &Arc<ChangeHub> {
        &self.hub
    }

    /// Returns the schema the scheduler declares scopes over.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn open(&self, mode: AccessMode) -> CoreResult<TransactionContext> {
        let scope = self.schema.collection_names();
        let txn = self.engine.begin(&scope, mode)?;
        Ok(TransactionContext::new(txn))
    }

    fn drive<T, F>(&self, mut ctx: TransactionContext, body: F) -> CoreResult<(T, TransactionContext)>
    where
        F: FnOnce(&mut TransactionContext) -> CoreResult<T>,
    {
        match body(&mut ctx) {
            Ok(value) => {
                ctx.settle()?;
                Ok((value, ctx))
            }
            Err(e) => {
                // Any error thrown by the body aborts the scope; the
                // original error is the carried reason and is re-thrown.
                ctx.abort_with_reason(e.to_string());
                Err(e)
            }
        }
    }

    /// Runs a mutation handler in a read-write scope.
    ///
    /// After a successful commit, the touched collections are published
    /// to the change hub (the live-query trigger).
    pub fn write<T, F>(&self, body: F) -> CoreResult<T>
    where
        F: FnOnce(&mut TransactionContext) -> CoreResult<T>,
    {
        let ctx = self.open(AccessMode::ReadWrite)?;
        let (value, ctx) = self.drive(ctx, body)?;
        let touched = ctx.touched();
        if !touched.is_empty() {
            debug!(collections = ?touched, "publishing committed mutations");
            self.hub.publish(touched);
        }
        Ok(value)
    }

    /// Runs a query handler in a read-only scope.
    pub fn read<T, F>(&self, body: F) -> CoreResult<T>
    where
        F: FnOnce(&mut TransactionContext) -> CoreResult<T>,
    {
        self.read_observed(body).map(|(value, _)| value)
    }

    /// Runs a query handler in a read-only scope, returning the set of
    /// collections it observed. Live queries use this to capture their
    /// dependency set.
    pub fn read_observed<T, F>(&self, body: F) -> CoreResult<(T, BTreeSet<String>)>
    where
        F: FnOnce(&mut TransactionContext) -> CoreResult<T>,
    {
        let ctx = self.open(AccessMode::ReadOnly)?;
        let (value, ctx) = self.drive(ctx, body)?;
        Ok((value, ctx.observed().clone()))
    }

    /// Runs a mutation handler, reusing the supplied context if one is
    /// active (nested call) instead of opening a new scope.
    pub fn write_nested<T, F>(
        &self,
        existing: Option<&mut TransactionContext>,
        body: F,
    ) -> CoreResult<T>
    where
        F: FnOnce(&mut TransactionContext) -> CoreResult<T>,
    {
        match existing {
            Some(ctx) => body(ctx),
            None => self.write(body),
        }
    }

    /// Runs a query handler, reusing the supplied context if one is
    /// active (nested call) instead of opening a new scope.
    pub fn read_nested<T, F>(
        &self,
        existing: Option<&mut TransactionContext>,
        body: F,
    ) -> CoreResult<T>
    where
        F: FnOnce(&mut TransactionContext) -> CoreResult<T>,
    {
        match existing {
            Some(ctx) => body(ctx),
            None => self.read(body),
        }
    }
}

impl std::fmt::Debug for TransactionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScheduler")
            .field("collections", &self.schema.collection_names())
            .finish_non_exhaustive()
    }
}
