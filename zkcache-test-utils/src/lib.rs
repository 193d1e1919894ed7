//! zkcache Test Utilities
//!
//! Shared test infrastructure for the zkcache workspace:
//! - A scripted raw cache stub with fetch-count instrumentation
//! - Recording and failing listeners
//! - Proptest generators for paths and stats
//! - Tracing setup for tests

// Re-export core types for convenience
pub use zkcache_core::{
    validate_path, CacheConfig, CacheError, CacheResult, EventType, KeeperState, Stat,
    StoreError, WatchedEvent,
};
pub use zkcache_storage::{
    CacheStats, CacheUpdater, DataCache, DataCacheListener, Deserializer, InMemoryNodeStore,
    NodeCache, NodeStore, RawCache, ReloadOutcome, Utf8Deserializer,
};

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError, Weak};

// ============================================================================
// STUB RAW CACHE
// ============================================================================

type RawResult = CacheResult<Option<(Vec<u8>, Stat)>>;

fn locked<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Raw cache stub whose "remote" reads are scripted per path.
///
/// Each miss pops the next scripted result for the path (or reports the
/// node missing when the script is exhausted), applies the deserializer, and
/// remembers the updater so a test can fire the watch with [`fire_watch`].
///
/// [`fire_watch`]: StubRawCache::fire_watch
pub struct StubRawCache<T> {
    entries: Mutex<HashMap<String, Option<(T, Stat)>>>,
    script: Mutex<HashMap<String, VecDeque<RawResult>>>,
    watches: Mutex<HashMap<String, Weak<dyn CacheUpdater>>>,
    fetches: AtomicUsize,
    fetches_by_path: Mutex<HashMap<String, usize>>,
}

impl<T> Default for StubRawCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            script: Mutex::new(HashMap::new()),
            watches: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
            fetches_by_path: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> StubRawCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the bytes the next fetch of `path` will see.
    pub fn seed(&self, path: &str, data: impl Into<Vec<u8>>, version: i32) {
        self.push(path, Ok(Some((data.into(), Stat::new(version)))));
    }

    /// Queue a "node does not exist" result for `path`.
    pub fn seed_missing(&self, path: &str) {
        self.push(path, Ok(None));
    }

    /// Queue a failure for the next fetch of `path`.
    pub fn seed_error(&self, path: &str, error: CacheError) {
        self.push(path, Err(error));
    }

    fn push(&self, path: &str, result: RawResult) {
        locked(&self.script)
            .entry(path.to_string())
            .or_default()
            .push_back(result);
    }

    /// Total number of remote reads performed.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of remote reads performed for `path`.
    pub fn fetch_count_for(&self, path: &str) -> usize {
        locked(&self.fetches_by_path).get(path).copied().unwrap_or(0)
    }

    pub fn is_cached(&self, path: &str) -> bool {
        locked(&self.entries).contains_key(path)
    }

    /// Simulate the remote store reporting a change on `path`: drop the entry
    /// and call the updater that armed the watch, once.
    ///
    /// Returns `false` if no live watch was armed on `path`.
    pub fn fire_watch(&self, path: &str) -> bool {
        let updater = locked(&self.watches).remove(path);
        locked(&self.entries).remove(path);
        match updater.and_then(|u| u.upgrade()) {
            Some(updater) => {
                updater.reload_cache(path);
                true
            }
            None => false,
        }
    }

    fn load(
        &self,
        path: &str,
        deserializer: &dyn Deserializer<T>,
        updater: Weak<dyn CacheUpdater>,
    ) -> CacheResult<Option<(T, Stat)>> {
        validate_path(path)?;
        if let Some(entry) = locked(&self.entries).get(path) {
            return Ok(entry.clone());
        }

        self.fetches.fetch_add(1, Ordering::SeqCst);
        *locked(&self.fetches_by_path).entry(path.to_string()).or_default() += 1;

        let next = locked(&self.script)
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(None));
        let entry = match next? {
            Some((bytes, stat)) => Some((deserializer.deserialize(path, &bytes)?, stat)),
            None => None,
        };

        locked(&self.watches).insert(path.to_string(), updater);
        locked(&self.entries).insert(path.to_string(), entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> RawCache<T> for StubRawCache<T> {
    async fn fetch_async(
        &self,
        path: &str,
        deserializer: Arc<dyn Deserializer<T>>,
        updater: Weak<dyn CacheUpdater>,
    ) -> CacheResult<Option<(T, Stat)>> {
        self.load(path, &*deserializer, updater)
    }

    fn fetch(
        &self,
        path: &str,
        deserializer: Arc<dyn Deserializer<T>>,
        updater: Weak<dyn CacheUpdater>,
    ) -> CacheResult<Option<(T, Stat)>> {
        self.load(path, &*deserializer, updater)
    }

    fn invalidate(&self, path: &str) {
        locked(&self.entries).remove(path);
    }

    fn invalidate_all(&self) {
        locked(&self.entries).clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            fetches: self.fetch_count() as u64,
            entry_count: locked(&self.entries).values().filter(|e| e.is_some()).count() as u64,
            ..Default::default()
        }
    }
}

// ============================================================================
// LISTENERS
// ============================================================================

/// One recorded `on_update` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<T> {
    pub path: String,
    pub data: T,
    pub stat: Stat,
}

/// Listener that records every update it receives.
pub struct RecordingListener<T> {
    updates: Mutex<Vec<Update<T>>>,
}

impl<T> Default for RecordingListener<T> {
    fn default() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> RecordingListener<T> {
    /// Create a recorder and the trait-object handle used to (un)register it.
    pub fn new() -> (Arc<Self>, Arc<dyn DataCacheListener<T>>) {
        let recorder = Arc::new(Self::default());
        let handle: Arc<dyn DataCacheListener<T>> = Arc::clone(&recorder) as _;
        (recorder, handle)
    }

    pub fn updates(&self) -> Vec<Update<T>> {
        locked(&self.updates).clone()
    }

    pub fn count(&self) -> usize {
        locked(&self.updates).len()
    }
}

impl<T: Clone + Send + Sync> DataCacheListener<T> for RecordingListener<T> {
    fn on_update(&self, path: &str, data: &T, stat: &Stat) -> CacheResult<()> {
        locked(&self.updates).push(Update {
            path: path.to_string(),
            data: data.clone(),
            stat: *stat,
        });
        Ok(())
    }
}

/// Listener that always fails, counting how often it was asked.
#[derive(Debug, Default)]
pub struct FailingListener {
    calls: AtomicUsize,
}

impl FailingListener {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T> DataCacheListener<T> for FailingListener {
    fn on_update(&self, path: &str, _data: &T, _stat: &Stat) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Listener {
            path: path.to_string(),
            reason: "failing listener".to_string(),
        })
    }
}

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a fmt subscriber for test output, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zkcache_storage=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// A single well-formed path segment.
    pub fn arb_segment() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9_.-]{0,11}".prop_filter("relative segment", |s| s != "." && s != "..")
    }

    /// A well-formed absolute node path, one to five segments deep.
    pub fn arb_path() -> impl Strategy<Value = String> {
        prop::collection::vec(arb_segment(), 1..=5)
            .prop_map(|segments| format!("/{}", segments.join("/")))
    }

    /// A plausible stat: non-negative versions and consistent zxids.
    pub fn arb_stat() -> impl Strategy<Value = Stat> {
        (1i64..1_000_000, 0i64..1_000, 0i32..10_000, 0i32..64, 0i32..1_048_576).prop_map(
            |(czxid, delta, version, num_children, data_length)| Stat {
                czxid,
                mzxid: czxid + delta,
                pzxid: czxid,
                version,
                num_children,
                data_length,
                ..Default::default()
            },
        )
    }
}

pub use generators::{arb_path, arb_segment, arb_stat};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_arb_path_is_valid(path in arb_path()) {
            prop_assert!(validate_path(&path).is_ok());
        }

        #[test]
        fn prop_arb_stat_is_consistent(stat in arb_stat()) {
            prop_assert!(stat.mzxid >= stat.czxid);
            prop_assert!(stat.version >= 0);
        }
    }

    #[test]
    fn test_stub_counts_fetches_per_path() {
        let stub: StubRawCache<String> = StubRawCache::new();
        stub.seed("/a", "v1", 1);
        let noop: Weak<dyn CacheUpdater> = Weak::<DataCache<String, StubRawCache<String>>>::new();

        let value = stub
            .fetch("/a", Arc::new(Utf8Deserializer), noop.clone())
            .expect("fetch");
        assert_eq!(value.map(|(v, _)| v), Some("v1".to_string()));
        stub.fetch("/a", Arc::new(Utf8Deserializer), noop.clone())
            .expect("fetch");
        stub.fetch("/b", Arc::new(Utf8Deserializer), noop)
            .expect("fetch");

        assert_eq!(stub.fetch_count(), 2);
        assert_eq!(stub.fetch_count_for("/a"), 1);
        assert_eq!(stub.fetch_count_for("/b"), 1);
        assert!(!stub.fire_watch("/a"));
    }
}
