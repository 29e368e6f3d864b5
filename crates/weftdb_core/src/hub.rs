//! Change hub: routes committed mutations to interested watchers.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a watcher.
pub type WatcherId = u64;

type WatchCallback = Arc<dyn Fn() + Send + Sync>;

struct Watcher {
    collections: BTreeSet<String>,
    callback: WatchCallback,
}

/// Distributes commit notifications to watchers by collection.
///
/// A watcher declares the set of collections it depends on; after a
/// read-write scope commits, the scheduler publishes the touched
/// collections and every watcher whose set intersects is invoked.
/// Watchers can wholesale-replace their dependency set, which is how
/// live queries stop observing collections they no longer read.
pub struct ChangeHub {
    watchers: RwLock<HashMap<WatcherId, Watcher>>,
    next_id: AtomicU64,
}

impl ChangeHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            watchers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a watcher over a set of collections.
    pub fn watch<F>(&self, collections: BTreeSet<String>, callback: F) -> WatcherId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.watchers.write().insert(
            id,
            Watcher {
                collections,
                callback: Arc::new(callback),
            },
        );
        id
    }

    /// Replaces a watcher's dependency set.
    ///
    /// Collections no longer in the set stop triggering the watcher;
    /// newly added ones start. Unknown ids are ignored.
    pub fn rewatch(&self, id: WatcherId, collections: BTreeSet<String>) {
        if let Some(watcher) = self.watchers.write().get_mut(&id) {
            watcher.collections = collections;
        }
    }

    /// Removes a watcher. Returns whether it existed.
    pub fn unwatch(&self, id: WatcherId) -> bool {
        self.watchers.write().remove(&id).is_some()
    }

    /// Notifies every watcher whose dependency set intersects the touched
    /// collections.
    ///
    /// Callbacks are invoked outside the hub lock, so a callback may
    /// freely re-enter the hub.
    pub fn publish(&self, touched: &BTreeSet<String>) {
        let callbacks: Vec<WatchCallback> = {
            let watchers = self.watchers.read();
            watchers
                .values()
                .filter(|w| w.collections.iter().any(|c| touched.contains(c)))
                .map(|w| Arc::clone(&w.callback))
                .collect()
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Returns the number of registered watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeHub")
            .field("watchers", &self.watcher_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn publish_fires_intersecting_watchers() {
        let hub = ChangeHub::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits2 = Arc::clone(&hits);
        hub.watch(set(&["users"]), move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        hub.publish(&set(&["users", "posts"]));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        hub.publish(&set(&["posts"]));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rewatch_replaces_dependency_set() {
        let hub = ChangeHub::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits2 = Arc::clone(&hits);
        let id = hub.watch(set(&["users"]), move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        hub.rewatch(id, set(&["posts"]));

        hub.publish(&set(&["users"]));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        hub.publish(&set(&["posts"]));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unwatch_removes_watcher() {
        let hub = ChangeHub::new();
        let id = hub.watch(set(&["users"]), || {});
        assert_eq!(hub.watcher_count(), 1);
        assert!(hub.unwatch(id));
        assert!(!hub.unwatch(id));
        assert_eq!(hub.watcher_count(), 0);
    }

    #[test]
    fn callback_may_reenter_hub() {
        let hub = Arc::new(ChangeHub::new());
        let hub2 = Arc::clone(&hub);
        hub.watch(set(&["users"]), move || {
            // Re-entrancy: inspecting the hub from inside a callback must
            // not deadlock.
            let _ = hub2.watcher_count();
        });
        hub.publish(&set(&["users"]));
    }
}
