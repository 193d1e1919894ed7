//! Copy-on-write listener registry.
//!
//! The current listener list lives behind an [`ArcSwap`]. Every mutation
//! builds a new list and swaps it in; a notification pass loads one snapshot
//! and iterates it, so concurrent `add`/`remove` never disturb a pass that is
//! already running and iteration never takes a lock.

use std::sync::Arc;

use arc_swap::ArcSwap;
use zkcache_core::{CacheResult, Stat};

/// Subscriber notified after a watched path has been reloaded.
///
/// Called with the freshly fetched value and stat. Returning an error only
/// affects this listener: it is logged and the remaining listeners still run.
pub trait DataCacheListener<T>: Send + Sync {
    fn on_update(&self, path: &str, data: &T, stat: &Stat) -> CacheResult<()>;
}

/// Thread-safe, insertion-ordered set of listeners.
///
/// Listener identity is pointer identity of the registered `Arc`, so the
/// same handler can be registered from several places without being
/// deduplicated by value.
pub struct ListenerRegistry<L: ?Sized> {
    listeners: ArcSwap<Vec<Arc<L>>>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append a listener. Registering the same `Arc` twice is a no-op.
    ///
    /// Returns `true` if the listener was added.
    pub fn add(&self, listener: Arc<L>) -> bool {
        let mut added = false;
        self.listeners.rcu(|current| {
            added = !current.iter().any(|l| Arc::ptr_eq(l, &listener));
            let mut next = Vec::clone(current);
            if added {
                next.push(Arc::clone(&listener));
            }
            next
        });
        added
    }

    /// Remove a listener. Removing one that is not registered is a no-op.
    ///
    /// Returns `true` if the listener was present.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut removed = false;
        self.listeners.rcu(|current| {
            let next: Vec<Arc<L>> = current
                .iter()
                .filter(|l| !Arc::ptr_eq(l, listener))
                .cloned()
                .collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    /// Whether `listener` is registered right now.
    pub fn contains(&self, listener: &Arc<L>) -> bool {
        self.listeners
            .load()
            .iter()
            .any(|l| Arc::ptr_eq(l, listener))
    }

    /// Immutable view of the registry as of this call, in registration order.
    pub fn snapshot(&self) -> Arc<Vec<Arc<L>>> {
        self.listeners.load_full()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> std::fmt::Debug for ListenerRegistry<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}
