//! Collaborator traits for the cache layer.
//!
//! This module defines the seams between the typed cache and the things it
//! sits on: the remote store session, the raw per-path cache, the byte
//! deserializer, and the watch callback.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use zkcache_core::{CacheResult, Stat, WatchedEvent};

/// Converts the raw bytes of a node into a typed value.
///
/// Implementations must be pure: the same `(path, bytes)` always yields the
/// same result, and no state is kept between calls.
pub trait Deserializer<T>: Send + Sync {
    fn deserialize(&self, path: &str, content: &[u8]) -> CacheResult<T>;
}

impl<T, F> Deserializer<T> for F
where
    F: Fn(&str, &[u8]) -> CacheResult<T> + Send + Sync,
{
    fn deserialize(&self, path: &str, content: &[u8]) -> CacheResult<T> {
        self(path, content)
    }
}

/// Entry point the raw cache calls when the store reports a change.
///
/// The handler runs once per delivered event and must not assume it is the
/// only pass in flight for `path`.
pub trait CacheUpdater: Send + Sync {
    fn reload_cache(&self, path: &str);
}

/// Receiver of one-shot watch notifications from the store.
pub trait Watcher: Send + Sync {
    fn process(&self, event: WatchedEvent);
}

/// A session against the remote coordination store.
///
/// `get_data` and `exists` arm a one-shot watch on `path` when a watcher is
/// supplied. ZooKeeper semantics apply: `get_data` on a missing node returns
/// `Ok(None)` and arms nothing, so callers that want to hear about creation
/// must follow up with `exists`.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Read the data and stat of a node.
    async fn get_data(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> CacheResult<Option<(Vec<u8>, Stat)>>;

    /// Read only the stat of a node. Arms the watch whether or not the node
    /// exists.
    async fn exists(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> CacheResult<Option<Stat>>;

    /// Identifier of the current session, for log context.
    fn session_id(&self) -> i64;
}

/// Keyed store of `(value, stat)` pairs per path.
///
/// The raw cache owns entry storage and all of its synchronization. On a miss
/// it fetches from the store, applies the deserializer, and arms a watch that
/// calls back into `updater`. At most one fetch per path is in flight.
#[async_trait]
pub trait RawCache<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Fetch without blocking the caller's thread.
    async fn fetch_async(
        &self,
        path: &str,
        deserializer: Arc<dyn Deserializer<T>>,
        updater: Weak<dyn CacheUpdater>,
    ) -> CacheResult<Option<(T, Stat)>>;

    /// Blocking fetch.
    fn fetch(
        &self,
        path: &str,
        deserializer: Arc<dyn Deserializer<T>>,
        updater: Weak<dyn CacheUpdater>,
    ) -> CacheResult<Option<(T, Stat)>>;

    /// Drop the entry for `path`, if any.
    fn invalidate(&self, path: &str);

    /// Drop every entry.
    fn invalidate_all(&self);

    /// Current usage counters.
    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of lookups answered from a cached entry.
    pub hits: u64,
    /// Number of lookups that found no completed entry.
    pub misses: u64,
    /// Number of reads actually issued to the store.
    pub fetches: u64,
    /// Number of cached values. Cached absences of missing nodes are not counted.
    pub entry_count: u64,
    /// Number of entries dropped by invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
