//! Raw node cache: one `(value, stat)` entry per path, filled from the store.
//!
//! Concurrent misses on the same path share a single store read. Every read
//! arms a watch; when it fires the entry is dropped and the owning
//! [`CacheUpdater`] is asked to reload the path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, trace};
use zkcache_core::{validate_path, CacheConfig, CacheResult, Stat, WatchedEvent};

use super::traits::{CacheStats, CacheUpdater, Deserializer, NodeStore, RawCache, Watcher};

type Entry<T> = Option<(T, Stat)>;
type SharedFetch<T> = Shared<BoxFuture<'static, CacheResult<Entry<T>>>>;

enum Slot<T> {
    /// A completed read. `None` records that the node did not exist.
    Ready(Entry<T>),
    /// A read in flight; every caller that misses awaits the same future.
    Pending {
        generation: u64,
        fetch: SharedFetch<T>,
    },
}

enum Lookup<T> {
    Hit(Entry<T>),
    Wait(SharedFetch<T>),
}

/// Entry storage and counters, shared with in-flight fetches and watchers.
struct Slots<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    invalidations: AtomicU64,
}

impl<T: Clone> Slots<T> {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate(&self, path: &str) -> bool {
        let removed = self.lock().remove(path).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    fn invalidate_all(&self) -> usize {
        let mut slots = self.lock();
        let count = slots.len();
        slots.clear();
        self.invalidations.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Install the outcome of the fetch started as `generation`.
    ///
    /// Nothing is installed if the slot was invalidated or replaced while the
    /// fetch was running. Errors are never cached.
    fn complete(
        &self,
        path: &str,
        generation: u64,
        result: &CacheResult<Entry<T>>,
        cache_missing: bool,
    ) {
        let mut slots = self.lock();
        let is_current = matches!(
            slots.get(path),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        );
        if !is_current {
            trace!(path, generation, "discarding superseded fetch result");
            return;
        }
        match result {
            Ok(Some(entry)) => {
                slots.insert(path.to_string(), Slot::Ready(Some(entry.clone())));
            }
            Ok(None) if cache_missing => {
                slots.insert(path.to_string(), Slot::Ready(None));
            }
            _ => {
                slots.remove(path);
            }
        }
    }
}

/// Watch armed on behalf of one [`CacheUpdater`].
struct NodeWatcher<T> {
    slots: Weak<Slots<T>>,
    updater: Weak<dyn CacheUpdater>,
    executor: Option<tokio::runtime::Handle>,
    session_id: i64,
}

impl<T> NodeWatcher<T> {
    fn dispatch_reload(&self, path: String) {
        let Some(updater) = self.updater.upgrade() else {
            return;
        };
        match &self.executor {
            Some(handle) => {
                handle.spawn_blocking(move || updater.reload_cache(&path));
            }
            None => updater.reload_cache(&path),
        }
    }
}

impl<T> Watcher for NodeWatcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn process(&self, event: WatchedEvent) {
        info!(session_id = self.session_id, ?event, "received watch event");
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        match event.path {
            Some(path) => {
                slots.invalidate(&path);
                self.dispatch_reload(path);
            }
            None if event.is_session_expired() => {
                let dropped = slots.invalidate_all();
                debug!(dropped, "session expired, dropped all cached nodes");
            }
            None => {}
        }
    }
}

/// [`RawCache`] implementation over a [`NodeStore`] session.
///
/// # Blocking reads
///
/// [`RawCache::fetch`] drives the async fetch to completion on the calling
/// thread. Call it from plain threads or `spawn_blocking`, not from inside an
/// async task on a current-thread runtime.
pub struct NodeCache<T> {
    store: Arc<dyn NodeStore>,
    slots: Arc<Slots<T>>,
    config: CacheConfig,
    executor: Option<tokio::runtime::Handle>,
    watchers: Mutex<Vec<(Weak<dyn CacheUpdater>, Arc<NodeWatcher<T>>)>>,
}

impl<T> NodeCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a node cache over `store`.
    ///
    /// When `config.background_reload` is set and a tokio runtime is current,
    /// reload passes are handed to that runtime's blocking pool.
    pub fn new(store: Arc<dyn NodeStore>, config: CacheConfig) -> Self {
        let executor = if config.background_reload {
            tokio::runtime::Handle::try_current().ok()
        } else {
            None
        };
        Self {
            store,
            slots: Arc::new(Slots::new()),
            config,
            executor,
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Create a node cache with default configuration.
    pub fn with_defaults(store: Arc<dyn NodeStore>) -> Self {
        Self::new(store, CacheConfig::default())
    }

    /// Run reload passes on `handle`'s blocking pool.
    pub fn with_executor(mut self, handle: tokio::runtime::Handle) -> Self {
        self.executor = Some(handle);
        self
    }

    /// Whether `path` currently has a completed entry.
    pub fn contains(&self, path: &str) -> bool {
        matches!(self.slots.lock().get(path), Some(Slot::Ready(_)))
    }

    /// The watcher for `updater`, created once and reused so a re-armed
    /// watch is the same object the store already holds.
    fn watcher_for(&self, updater: &Weak<dyn CacheUpdater>) -> Arc<NodeWatcher<T>> {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        watchers.retain(|(u, _)| u.strong_count() > 0);
        if let Some((_, watcher)) = watchers.iter().find(|(u, _)| Weak::ptr_eq(u, updater)) {
            return Arc::clone(watcher);
        }
        let watcher = Arc::new(NodeWatcher {
            slots: Arc::downgrade(&self.slots),
            updater: updater.clone(),
            executor: self.executor.clone(),
            session_id: self.store.session_id(),
        });
        watchers.push((updater.clone(), Arc::clone(&watcher)));
        watcher
    }

    fn lookup(
        &self,
        path: &str,
        deserializer: Arc<dyn Deserializer<T>>,
        updater: Weak<dyn CacheUpdater>,
    ) -> CacheResult<Lookup<T>> {
        validate_path(path)?;
        let watcher = self.watcher_for(&updater);

        let mut slots = self.slots.lock();
        match slots.get(path) {
            Some(Slot::Ready(entry)) => {
                self.slots.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Lookup::Hit(entry.clone()));
            }
            Some(Slot::Pending { fetch, .. }) => {
                self.slots.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(Lookup::Wait(fetch.clone()));
            }
            None => {}
        }

        self.slots.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.slots.next_generation.fetch_add(1, Ordering::Relaxed);
        let fetch = load(
            Arc::clone(&self.store),
            Arc::downgrade(&self.slots),
            path.to_string(),
            generation,
            deserializer,
            watcher,
            self.config.cache_missing_nodes,
        )
        .boxed()
        .shared();
        slots.insert(
            path.to_string(),
            Slot::Pending {
                generation,
                fetch: fetch.clone(),
            },
        );
        Ok(Lookup::Wait(fetch))
    }
}

async fn load<T>(
    store: Arc<dyn NodeStore>,
    slots: Weak<Slots<T>>,
    path: String,
    generation: u64,
    deserializer: Arc<dyn Deserializer<T>>,
    watcher: Arc<NodeWatcher<T>>,
    cache_missing: bool,
) -> CacheResult<Entry<T>>
where
    T: Clone + Send + Sync + 'static,
{
    if let Some(slots) = slots.upgrade() {
        slots.fetches.fetch_add(1, Ordering::Relaxed);
    }
    debug!(path = %path, "fetching node from store");

    let result = read_node(&*store, &path, &*deserializer, watcher, cache_missing).await;

    if let Some(slots) = slots.upgrade() {
        slots.complete(&path, generation, &result, cache_missing);
    }
    result
}

async fn read_node<T>(
    store: &dyn NodeStore,
    path: &str,
    deserializer: &dyn Deserializer<T>,
    watcher: Arc<NodeWatcher<T>>,
    cache_missing: bool,
) -> CacheResult<Entry<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let watcher: Arc<dyn Watcher> = watcher;

    if let Some((bytes, stat)) = store.get_data(path, Some(Arc::clone(&watcher))).await? {
        let value = deserializer.deserialize(path, &bytes)?;
        return Ok(Some((value, stat)));
    }
    if !cache_missing {
        return Ok(None);
    }

    // A missing node arms no data watch, so watch for its creation instead.
    if store.exists(path, Some(watcher)).await?.is_none() {
        return Ok(None);
    }
    // Created between the two calls; the exists watch now covers its data.
    match store.get_data(path, None).await? {
        Some((bytes, stat)) => Ok(Some((deserializer.deserialize(path, &bytes)?, stat))),
        None => Ok(None),
    }
}

#[async_trait]
impl<T> RawCache<T> for NodeCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn fetch_async(
        &self,
        path: &str,
        deserializer: Arc<dyn Deserializer<T>>,
        updater: Weak<dyn CacheUpdater>,
    ) -> CacheResult<Option<(T, Stat)>> {
        match self.lookup(path, deserializer, updater)? {
            Lookup::Hit(entry) => Ok(entry),
            Lookup::Wait(fetch) => fetch.await,
        }
    }

    fn fetch(
        &self,
        path: &str,
        deserializer: Arc<dyn Deserializer<T>>,
        updater: Weak<dyn CacheUpdater>,
    ) -> CacheResult<Option<(T, Stat)>> {
        match self.lookup(path, deserializer, updater)? {
            Lookup::Hit(entry) => Ok(entry),
            Lookup::Wait(fetch) => futures::executor::block_on(fetch),
        }
    }

    fn invalidate(&self, path: &str) {
        self.slots.invalidate(path);
    }

    fn invalidate_all(&self) {
        self.slots.invalidate_all();
    }

    fn stats(&self) -> CacheStats {
        let entry_count = self
            .slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(Some(_))))
            .count() as u64;
        CacheStats {
            hits: self.slots.hits.load(Ordering::Relaxed),
            misses: self.slots.misses.load(Ordering::Relaxed),
            fetches: self.slots.fetches.load(Ordering::Relaxed),
            entry_count,
            invalidations: self.slots.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::mpsc;
    use std::thread::{self, ThreadId};
    use std::time::Duration;
    use zkcache_core::{CacheError, EventType, KeeperState, StoreError};

    /// Store that serves a fixed map and records armed watchers.
    #[derive(Default)]
    struct MockStore {
        nodes: Mutex<HashMap<String, (Vec<u8>, Stat)>>,
        watchers: Mutex<Vec<(String, Arc<dyn Watcher>)>>,
        reads: AtomicUsize,
        fail_with: Mutex<Option<StoreError>>,
        /// While set, `get_data` parks until `gate` is notified.
        gated: AtomicBool,
        gate: tokio::sync::Notify,
    }

    impl MockStore {
        fn put(&self, path: &str, data: &str, version: i32) {
            self.nodes
                .lock()
                .unwrap()
                .insert(path.to_string(), (data.as_bytes().to_vec(), Stat::new(version)));
        }

        fn fire(&self, event: WatchedEvent) {
            let watchers: Vec<_> = self.watchers.lock().unwrap().drain(..).collect();
            for (_, watcher) in watchers {
                watcher.process(event.clone());
            }
        }
    }

    #[async_trait]
    impl NodeStore for MockStore {
        async fn get_data(
            &self,
            path: &str,
            watcher: Option<Arc<dyn Watcher>>,
        ) -> CacheResult<Option<(Vec<u8>, Stat)>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.gated.load(Ordering::SeqCst) {
                self.gate.notified().await;
            }
            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err.into());
            }
            let node = self.nodes.lock().unwrap().get(path).cloned();
            if let (Some(_), Some(watcher)) = (&node, watcher) {
                self.watchers.lock().unwrap().push((path.to_string(), watcher));
            }
            Ok(node)
        }

        async fn exists(
            &self,
            path: &str,
            watcher: Option<Arc<dyn Watcher>>,
        ) -> CacheResult<Option<Stat>> {
            if let Some(watcher) = watcher {
                self.watchers.lock().unwrap().push((path.to_string(), watcher));
            }
            Ok(self.nodes.lock().unwrap().get(path).map(|(_, stat)| *stat))
        }

        fn session_id(&self) -> i64 {
            7
        }
    }

    #[derive(Default)]
    struct CountingUpdater {
        reloads: Mutex<Vec<String>>,
    }

    impl CacheUpdater for CountingUpdater {
        fn reload_cache(&self, path: &str) {
            self.reloads.lock().unwrap().push(path.to_string());
        }
    }

    fn utf8() -> Arc<dyn Deserializer<String>> {
        Arc::new(|path: &str, bytes: &[u8]| {
            String::from_utf8(bytes.to_vec()).map_err(|e| CacheError::deserialize(path, e))
        })
    }

    fn setup() -> (Arc<MockStore>, NodeCache<String>, Arc<CountingUpdater>) {
        let store = Arc::new(MockStore::default());
        let cache = NodeCache::new(
            Arc::clone(&store) as Arc<dyn NodeStore>,
            CacheConfig::default().with_background_reload(false),
        );
        (store, cache, Arc::new(CountingUpdater::default()))
    }

    /// Records the thread each reload ran on.
    struct ThreadUpdater {
        tx: Mutex<mpsc::Sender<(String, ThreadId)>>,
    }

    impl CacheUpdater for ThreadUpdater {
        fn reload_cache(&self, path: &str) {
            let _ = self
                .tx
                .lock()
                .unwrap()
                .send((path.to_string(), thread::current().id()));
        }
    }

    fn weak<U: CacheUpdater + 'static>(updater: &Arc<U>) -> Weak<dyn CacheUpdater> {
        let updater: Arc<dyn CacheUpdater> = Arc::clone(updater) as Arc<dyn CacheUpdater>;
        Arc::downgrade(&updater)
    }

    #[test]
    fn test_miss_then_hit() {
        let (store, cache, updater) = setup();
        store.put("/a", "v1", 1);

        let first = cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");
        let second = cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");

        assert_eq!(first, Some(("v1".to_string(), Stat::new(1))));
        assert_eq!(first, second);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_missing_node_is_cached_and_watched() {
        let (store, cache, updater) = setup();

        assert_eq!(cache.fetch("/nope", utf8(), weak(&updater)).expect("fetch"), None);
        assert_eq!(cache.fetch("/nope", utf8(), weak(&updater)).expect("fetch"), None);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert!(cache.contains("/nope"));
        assert_eq!(store.watchers.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_node_not_cached_when_disabled() {
        let store = Arc::new(MockStore::default());
        let cache: NodeCache<String> = NodeCache::new(
            Arc::clone(&store) as Arc<dyn NodeStore>,
            CacheConfig::default()
                .with_background_reload(false)
                .with_cache_missing_nodes(false),
        );
        let updater = Arc::new(CountingUpdater::default());

        assert_eq!(cache.fetch("/nope", utf8(), weak(&updater)).expect("fetch"), None);
        assert_eq!(cache.fetch("/nope", utf8(), weak(&updater)).expect("fetch"), None);
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
        assert!(!cache.contains("/nope"));
    }

    #[test]
    fn test_errors_are_not_cached() {
        let (store, cache, updater) = setup();
        store.put("/a", "v1", 1);
        *store.fail_with.lock().unwrap() = Some(StoreError::ConnectionLoss);

        let err = cache.fetch("/a", utf8(), weak(&updater)).expect_err("injected failure");
        assert_eq!(err, CacheError::Store(StoreError::ConnectionLoss));
        assert!(!cache.contains("/a"));

        let value = cache.fetch("/a", utf8(), weak(&updater)).expect("retry succeeds");
        assert_eq!(value.map(|(v, _)| v), Some("v1".to_string()));
    }

    #[test]
    fn test_invalid_path_rejected_before_fetch() {
        let (store, cache, updater) = setup();
        let err = cache.fetch("a/b", utf8(), weak(&updater)).expect_err("relative path");
        assert!(matches!(err, CacheError::InvalidPath { .. }));
        assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalidate_forces_refetch() {
        let (store, cache, updater) = setup();
        store.put("/a", "v1", 1);
        cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");

        cache.invalidate("/a");
        cache.invalidate("/never-cached");
        store.put("/a", "v2", 2);

        let value = cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");
        assert_eq!(value.map(|(v, s)| (v, s.version)), Some(("v2".to_string(), 2)));
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_watch_event_invalidates_and_dispatches_reload() {
        let (store, cache, updater) = setup();
        store.put("/a", "v1", 1);
        cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");

        store.fire(WatchedEvent::node(EventType::NodeDataChanged, "/a"));

        assert!(!cache.contains("/a"));
        assert_eq!(*updater.reloads.lock().unwrap(), vec!["/a".to_string()]);
    }

    #[test]
    fn test_session_expiry_drops_everything() {
        let (store, cache, updater) = setup();
        store.put("/a", "v1", 1);
        store.put("/b", "v1", 1);
        cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");
        cache.fetch("/b", utf8(), weak(&updater)).expect("fetch");

        store.fire(WatchedEvent::session(KeeperState::Expired));

        assert_eq!(cache.stats().entry_count, 0);
        assert!(updater.reloads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_watcher_reused_per_updater() {
        let (store, cache, updater) = setup();
        store.put("/a", "v1", 1);
        cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");
        cache.invalidate("/a");
        cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");

        let watchers = store.watchers.lock().unwrap();
        assert_eq!(watchers.len(), 2);
        assert!(Arc::ptr_eq(&watchers[0].1, &watchers[1].1));
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let (store, cache, updater) = setup();
        store.put("/a", "v1", 1);

        let results = futures::future::join_all(
            (0..16).map(|_| cache.fetch_async("/a", utf8(), weak(&updater))),
        )
        .await;

        for result in results {
            assert_eq!(result.expect("fetch").map(|(v, _)| v), Some("v1".to_string()));
        }
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().fetches, 1);
    }

    /// Start a fetch of `/a`, hold it at the store, run `invalidate`, then let
    /// the fetch finish.
    async fn invalidate_during_fetch(invalidate: impl FnOnce(&NodeCache<String>)) {
        let (store, cache, updater) = setup();
        let cache = Arc::new(cache);
        store.put("/a", "old", 1);
        store.gated.store(true, Ordering::SeqCst);

        let pending = tokio::spawn({
            let cache = Arc::clone(&cache);
            let updater = weak(&updater);
            async move { cache.fetch_async("/a", utf8(), updater).await }
        });
        while store.reads.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        invalidate(&*cache);
        store.gate.notify_one();

        // The caller that started the fetch still gets its answer.
        let result = pending.await.expect("join").expect("fetch");
        assert_eq!(result.map(|(v, _)| v), Some("old".to_string()));
        assert!(!cache.contains("/a"));
        assert_eq!(cache.stats().entry_count, 0);

        store.gated.store(false, Ordering::SeqCst);
        store.put("/a", "new", 2);
        let fresh = cache.fetch_async("/a", utf8(), weak(&updater)).await.expect("fetch");
        assert_eq!(fresh.map(|(v, s)| (v, s.version)), Some(("new".to_string(), 2)));
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_discards_result() {
        invalidate_during_fetch(|cache| cache.invalidate("/a")).await;
    }

    #[tokio::test]
    async fn test_invalidate_all_during_fetch_discards_result() {
        invalidate_during_fetch(|cache| cache.invalidate_all()).await;
    }

    #[test]
    fn test_with_executor_dispatches_on_blocking_pool() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .expect("runtime");
        let store = Arc::new(MockStore::default());
        store.put("/a", "v1", 1);

        // No runtime is current here, so only the explicit handle enables
        // background dispatch.
        let cache: NodeCache<String> =
            NodeCache::new(Arc::clone(&store) as Arc<dyn NodeStore>, CacheConfig::default())
                .with_executor(runtime.handle().clone());
        let (tx, rx) = mpsc::channel();
        let updater = Arc::new(ThreadUpdater { tx: Mutex::new(tx) });
        cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");

        store.fire(WatchedEvent::node(EventType::NodeDataChanged, "/a"));

        let (path, reload_thread) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("reload dispatched");
        assert_eq!(path, "/a");
        assert_ne!(reload_thread, thread::current().id());
        assert!(!cache.contains("/a"));
    }

    #[test]
    fn test_inline_dispatch_without_executor() {
        let store = Arc::new(MockStore::default());
        store.put("/a", "v1", 1);
        let cache: NodeCache<String> = NodeCache::new(
            Arc::clone(&store) as Arc<dyn NodeStore>,
            CacheConfig::default().with_background_reload(false),
        );
        let (tx, rx) = mpsc::channel();
        let updater = Arc::new(ThreadUpdater { tx: Mutex::new(tx) });
        cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");

        store.fire(WatchedEvent::node(EventType::NodeDataChanged, "/a"));

        let (_, reload_thread) = rx.try_recv().expect("reload ran inline");
        assert_eq!(reload_thread, thread::current().id());
    }

    #[test]
    fn test_entry_count_excludes_cached_absence() {
        let (store, cache, updater) = setup();
        store.put("/a", "v1", 1);
        cache.fetch("/a", utf8(), weak(&updater)).expect("fetch");
        cache.fetch("/nope", utf8(), weak(&updater)).expect("fetch");

        assert!(cache.contains("/nope"));
        assert_eq!(cache.stats().entry_count, 1);
    }
}
