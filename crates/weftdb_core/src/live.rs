//! Live queries: cached computations with dependency-tracked invalidation.

use crate::error::{CoreError, CoreResult};
use crate::hub::WatcherId;
use crate::txn::{TransactionContext, TransactionScheduler};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tracing::warn;

/// Unique identifier for a subscriber.
pub type SubscriptionId = u64;

type ComputeFn<T> = Arc<dyn Fn(&mut TransactionContext) -> CoreResult<T> + Send + Sync>;
type SubscriberFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A cached read computation that recomputes when any collection it read
/// during its last successful computation is mutated.
///
/// The computation runs in a read-only scope; the collections it observes
/// are captured per refresh and wholesale-replace the previous dependency
/// set before subscribers are notified. Concurrent invalidations coalesce:
/// a mutation arriving while a refresh is in flight marks it pending and
/// the refresh runs one more pass instead of overlapping.
///
/// Handles are cheap to clone; [`LiveQuery::dispose`] is terminal.
pub struct LiveQuery<T> {
    shared: Arc<LiveShared<T>>,
}

impl<T> Clone for LiveQuery<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct LiveShared<T> {
    scheduler: Arc<TransactionScheduler>,
    compute: ComputeFn<T>,
    state: Mutex<LiveState<T>>,
}

struct LiveState<T> {
    cache: Option<T>,
    pending: bool,
    refreshing: bool,
    disposed: bool,
    watcher: Option<WatcherId>,
    subscribers: Vec<(SubscriptionId, SubscriberFn<T>)>,
    next_subscription: SubscriptionId,
}

impl<T: Clone + Send + 'static> LiveQuery<T> {
    /// Creates a live query over a read computation.
    ///
    /// Nothing is computed until the first [`get`](Self::get),
    /// [`subscribe`](Self::subscribe), or relevant mutation.
    pub fn new<F>(scheduler: Arc<TransactionScheduler>, compute: F) -> Self
    where
        F: Fn(&mut TransactionContext) -> CoreResult<T> + Send + Sync + 'static,
    {
        let shared = Arc::new(LiveShared {
            scheduler,
            compute: Arc::new(compute),
            state: Mutex::new(LiveState {
                cache: None,
                pending: false,
                refreshing: false,
                disposed: false,
                watcher: None,
                subscribers: Vec::new(),
                next_subscription: 1,
            }),
        });
        let weak: Weak<LiveShared<T>> = Arc::downgrade(&shared);
        let watcher = shared.scheduler.hub().watch(BTreeSet::new(), move || {
            if let Some(shared) = weak.upgrade() {
                shared.invalidate();
            }
        });
        shared.state.lock().watcher = Some(watcher);
        Self { shared }
    }

    /// Returns the cached value, computing it first if necessary.
    ///
    /// If the cache is stale (a relevant mutation is pending) or empty,
    /// the caller performs the refresh and receives its outcome - a
    /// failing refresh rejects exactly the callers of that refresh and
    /// never poisons a previously cached value.
    pub fn get(&self) -> CoreResult<T> {
        {
            let state = self.shared.state.lock();
            if state.disposed {
                return Err(CoreError::Disposed);
            }
            if !state.pending && !state.refreshing {
                if let Some(value) = &state.cache {
                    return Ok(value.clone());
                }
            }
        }
        self.shared.refresh()
    }

    /// Registers a push subscriber.
    ///
    /// Delivers the cached value immediately when one exists, otherwise
    /// triggers a refresh (whose failure is logged, not returned - the
    /// subscription itself is kept).
    pub fn subscribe<F>(&self, callback: F) -> CoreResult<SubscriptionId>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: SubscriberFn<T> = Arc::new(callback);
        let (id, cached) = {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return Err(CoreError::Disposed);
            }
            let id = state.next_subscription;
            state.next_subscription += 1;
            state.subscribers.push((id, Arc::clone(&callback)));
            (id, state.cache.clone())
        };
        match cached {
            Some(value) => callback(&value),
            None => {
                if let Err(e) = self.shared.refresh() {
                    warn!(error = %e, "live query refresh on subscribe failed");
                }
            }
        }
        Ok(id)
    }

    /// Removes a subscriber. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.shared.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(sub_id, _)| *sub_id != id);
        state.subscribers.len() != before
    }

    /// Forces a recomputation, bypassing the cache.
    pub fn refresh(&self) -> CoreResult<T> {
        {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return Err(CoreError::Disposed);
            }
            state.pending = true;
        }
        self.shared.refresh()
    }

    /// Disposes the query: clears subscribers, stops observing all
    /// collections, and makes the instance permanently refuse further
    /// `get`/`subscribe` calls. Idempotent.
    pub fn dispose(&self) {
        let watcher = {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.subscribers.clear();
            state.cache = None;
            state.watcher.take()
        };
        if let Some(id) = watcher {
            self.shared.scheduler.hub().unwatch(id);
        }
    }

    /// Checks whether the query has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().disposed
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().subscribers.len()
    }
}

impl<T: Clone + Send + 'static> LiveShared<T> {
    /// Hub callback: a collection in the dependency set was mutated.
    fn invalidate(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.pending = true;
            if state.refreshing {
                // Coalesce into the in-flight refresh.
                return;
            }
        }
        if let Err(e) = self.refresh() {
            warn!(error = %e, "live query auto-refresh failed");
        }
    }

    fn refresh(self: &Arc<Self>) -> CoreResult<T> {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(CoreError::Disposed);
            }
            if state.refreshing {
                state.pending = true;
                return state.cache.clone().ok_or_else(|| {
                    CoreError::invalid_operation("live query refresh re-entered before first value")
                });
            }
            state.refreshing = true;
            state.pending = false;
        }

        let compute = Arc::clone(&self.compute);
        match self.scheduler.read_observed(|ctx| compute(ctx)) {
            Ok((value, observed)) => {
                // The new dependency set fully replaces the previous one,
                // before subscribers hear about the value.
                let watcher = self.state.lock().watcher;
                if let Some(id) = watcher {
                    self.scheduler.hub().rewatch(id, observed);
                }
                let (subscribers, run_again) = {
                    let mut state = self.state.lock();
                    state.cache = Some(value.clone());
                    state.refreshing = false;
                    let subscribers: Vec<SubscriberFn<T>> = state
                        .subscribers
                        .iter()
                        .map(|(_, callback)| Arc::clone(callback))
                        .collect();
                    (subscribers, state.pending)
                };
                for subscriber in &subscribers {
                    subscriber(&value);
                }
                if run_again {
                    // An invalidation arrived mid-computation.
                    return self.refresh();
                }
                Ok(value)
            }
            Err(e) => {
                self.state.lock().refreshing = false;
                Err(e)
            }
        }
    }
}

impl<T> std::fmt::Debug for LiveQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("LiveQuery")
            .field("cached", &state.cache.is_some())
            .field("pending", &state.pending)
            .field("disposed", &state.disposed)
            .field("subscribers", &state.subscribers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ChangeHub;
    use crate::schema::{CollectionDef, Schema};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use weftdb_codec::{KeyPath, Record};
    use weftdb_engine::{MemoryEngine, StorageEngine};

    fn create_scheduler() -> Arc<TransactionScheduler> {
        let schema = Schema::new()
            .collection(CollectionDef::new("items").key_path(KeyPath::single("id")))
            .collection(CollectionDef::new("other").key_path(KeyPath::single("id")));
        let engine = MemoryEngine::new();
        for def in schema.iter() {
            engine.create_collection(def.engine_config()).unwrap();
        }
        Arc::new(TransactionScheduler::new(
            Arc::new(engine),
            Arc::new(schema),
            Arc::new(ChangeHub::new()),
        ))
    }

    fn insert(scheduler: &TransactionScheduler, collection: &str, id: i64) {
        scheduler
            .write(|ctx| {
                ctx.add(collection, None, &Record::new().with("id", id))
                    .map(|_| ())
            })
            .unwrap();
    }

    fn counting_query(
        scheduler: &Arc<TransactionScheduler>,
        runs: &Arc<AtomicUsize>,
    ) -> LiveQuery<usize> {
        let runs = Arc::clone(runs);
        LiveQuery::new(Arc::clone(scheduler), move |ctx| {
            runs.fetch_add(1, Ordering::SeqCst);
            ctx.count("items")
        })
    }

    #[test]
    fn get_computes_once_then_serves_cache() {
        let scheduler = create_scheduler();
        let runs = Arc::new(AtomicUsize::new(0));
        let query = counting_query(&scheduler, &runs);

        assert_eq!(query.get().unwrap(), 0);
        assert_eq!(query.get().unwrap(), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn relevant_mutation_recomputes_and_notifies() {
        let scheduler = create_scheduler();
        let runs = Arc::new(AtomicUsize::new(0));
        let query = counting_query(&scheduler, &runs);

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let delivered2 = Arc::clone(&delivered);
        query
            .subscribe(move |value| delivered2.lock().push(*value))
            .unwrap();
        assert_eq!(*delivered.lock(), vec![0]);

        insert(&scheduler, "items", 1);
        assert_eq!(*delivered.lock(), vec![0, 1]);
        assert_eq!(query.get().unwrap(), 1);
    }

    #[test]
    fn irrelevant_mutation_does_not_recompute() {
        let scheduler = create_scheduler();
        let runs = Arc::new(AtomicUsize::new(0));
        let query = counting_query(&scheduler, &runs);

        query.get().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        insert(&scheduler, "other", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_commit_touching_two_dependencies_refreshes_once() {
        let scheduler = create_scheduler();
        let runs = Arc::new(AtomicUsize::new(0));
        let runs2 = Arc::clone(&runs);
        let query = LiveQuery::new(Arc::clone(&scheduler), move |ctx| {
            runs2.fetch_add(1, Ordering::SeqCst);
            Ok(ctx.count("items")? + ctx.count("other")?)
        });
        query.get().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        scheduler
            .write(|ctx| {
                ctx.add("items", None, &Record::new().with("id", 1))?;
                ctx.add("other", None, &Record::new().with("id", 1))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dependency_set_is_replaced_per_refresh() {
        let scheduler = create_scheduler();
        let read_other = Arc::new(AtomicBool::new(false));
        let runs = Arc::new(AtomicUsize::new(0));

        let read_other2 = Arc::clone(&read_other);
        let runs2 = Arc::clone(&runs);
        let query = LiveQuery::new(Arc::clone(&scheduler), move |ctx| {
            runs2.fetch_add(1, Ordering::SeqCst);
            if read_other2.load(Ordering::SeqCst) {
                ctx.count("other")
            } else {
                ctx.count("items")
            }
        });

        query.get().unwrap(); // deps = {items}
        read_other.store(true, Ordering::SeqCst);

        insert(&scheduler, "items", 1); // recompute, deps become {other}
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // items is no longer observed.
        insert(&scheduler, "items", 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // other now is.
        insert(&scheduler, "other", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_computation_keeps_previous_cache() {
        let scheduler = create_scheduler();
        let fail = Arc::new(AtomicBool::new(false));

        let fail2 = Arc::clone(&fail);
        let query = LiveQuery::new(Arc::clone(&scheduler), move |ctx| {
            if fail2.load(Ordering::SeqCst) {
                return Err(CoreError::invalid_operation("compute failed"));
            }
            ctx.count("items")
        });

        let notified = Arc::new(AtomicUsize::new(0));
        let notified2 = Arc::clone(&notified);
        query
            .subscribe(move |_| {
                notified2.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        fail.store(true, Ordering::SeqCst);
        // The forced refresh rejects its caller...
        assert!(query.refresh().is_err());
        // ...subscribers stay uncalled, and the old value survives.
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        fail.store(false, Ordering::SeqCst);
        assert_eq!(query.get().unwrap(), 0);
    }

    #[test]
    fn dispose_is_terminal_and_idempotent() {
        let scheduler = create_scheduler();
        let runs = Arc::new(AtomicUsize::new(0));
        let query = counting_query(&scheduler, &runs);
        query.get().unwrap();
        assert_eq!(scheduler.hub().watcher_count(), 1);

        query.dispose();
        query.dispose();
        assert!(query.is_disposed());
        assert_eq!(scheduler.hub().watcher_count(), 0);
        assert_eq!(query.subscriber_count(), 0);

        assert!(matches!(query.get(), Err(CoreError::Disposed)));
        assert!(matches!(query.subscribe(|_| {}), Err(CoreError::Disposed)));

        // Mutations after disposal never recompute.
        insert(&scheduler, "items", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let scheduler = create_scheduler();
        let runs = Arc::new(AtomicUsize::new(0));
        let query = counting_query(&scheduler, &runs);

        let notified = Arc::new(AtomicUsize::new(0));
        let notified2 = Arc::clone(&notified);
        let id = query
            .subscribe(move |_| {
                notified2.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        assert!(query.unsubscribe(id));
        assert!(!query.unsubscribe(id));

        insert(&scheduler, "items", 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_gets_cached_value_immediately() {
        let scheduler = create_scheduler();
        let runs = Arc::new(AtomicUsize::new(0));
        let query = counting_query(&scheduler, &runs);
        query.get().unwrap();

        let delivered = Arc::new(AtomicUsize::new(0));
        let delivered2 = Arc::clone(&delivered);
        query
            .subscribe(move |_| {
                delivered2.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        // No extra computation was needed.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
