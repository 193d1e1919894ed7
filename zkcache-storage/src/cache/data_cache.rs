//! Typed, listener-aware cache over a [`RawCache`].
//!
//! A [`DataCache`] serves typed lookups for one value type and reacts to
//! watch events on the paths it has read. A watch event starts a reload
//! pass for that path:
//!
//! 1. drop the local entry so no reader can see the stale value,
//! 2. fetch the path again (this re-arms the watch),
//! 3. if the node exists, notify every registered listener with the new
//!    value and stat, in registration order.
//!
//! A failed fetch ends the pass without notifying anyone. A deleted node
//! also ends the pass silently: listeners are not told about deletions.
//! Passes for the same path are not coalesced, so overlapping events may
//! fetch twice.
//!
//! # Threading
//!
//! The pass runs on whichever thread the raw cache dispatches it to and
//! blocks that thread for the refetch and for every listener call. With
//! [`NodeCache`](super::NodeCache) and `background_reload` enabled that is
//! the tokio blocking pool; otherwise it is the store's event delivery
//! thread, and slow listeners delay every later watch event.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use tracing::{debug, warn};
use zkcache_core::{CacheConfig, CacheError, CacheResult, Stat};

use super::listeners::{DataCacheListener, ListenerRegistry};
use super::traits::{CacheStats, CacheUpdater, Deserializer, RawCache};

/// Terminal state of one reload pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The path was refetched and the listener snapshot was walked.
    Notified {
        /// Listeners that returned successfully.
        delivered: usize,
        /// Listeners that returned an error or panicked.
        failed: usize,
    },
    /// The node no longer exists; no listener was called.
    NodeMissing,
    /// The refetch failed; no listener was called.
    FetchFailed(CacheError),
}

/// Typed cache for values stored under coordination-store paths.
///
/// # Type Parameters
///
/// - `T`: The deserialized value type
/// - `R`: The raw cache that owns entries and talks to the store
///
/// # Example
///
/// ```ignore
/// let raw = Arc::new(NodeCache::with_defaults(store));
/// let policies = DataCache::new(raw, JsonDeserializer::<Policies>::new());
///
/// policies.register_listener(listener.clone());
/// let current = policies.get("/admin/policies/tenant-a")?;
/// ```
pub struct DataCache<T, R>
where
    T: Clone + Send + Sync + 'static,
    R: RawCache<T>,
{
    cache: Arc<R>,
    deserializer: Arc<dyn Deserializer<T>>,
    listeners: ListenerRegistry<dyn DataCacheListener<T>>,
    config: CacheConfig,
    /// Handed to the raw cache as the watch callback target.
    this: Weak<Self>,
}

impl<T, R> DataCache<T, R>
where
    T: Clone + Send + Sync + 'static,
    R: RawCache<T> + 'static,
{
    /// Create a data cache over `cache` with default configuration.
    pub fn new(cache: Arc<R>, deserializer: impl Deserializer<T> + 'static) -> Arc<Self> {
        Self::with_config(cache, deserializer, CacheConfig::default())
    }

    /// Create a data cache with explicit configuration.
    pub fn with_config(
        cache: Arc<R>,
        deserializer: impl Deserializer<T> + 'static,
        config: CacheConfig,
    ) -> Arc<Self> {
        let deserializer: Arc<dyn Deserializer<T>> = Arc::new(deserializer);
        Arc::new_cyclic(|this| Self {
            cache,
            deserializer,
            listeners: ListenerRegistry::new(),
            config,
            this: this.clone(),
        })
    }

    /// Get a reference to the raw cache.
    pub fn raw(&self) -> &R {
        &self.cache
    }

    /// Usage counters of the underlying raw cache.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn updater(&self) -> Weak<dyn CacheUpdater> {
        self.this.clone()
    }

    /// Look up `path` without blocking the calling thread.
    ///
    /// A missing node is `Ok(None)`. Raw cache failures are returned exactly
    /// as the raw cache reported them.
    pub async fn get_async(&self, path: &str) -> CacheResult<Option<T>> {
        let entry = self
            .cache
            .fetch_async(path, Arc::clone(&self.deserializer), self.updater())
            .await?;
        Ok(entry.map(|(value, _)| value))
    }

    /// Blocking lookup of `path`.
    ///
    /// A missing node is `Ok(None)`; any failure is wrapped in
    /// [`CacheError::Lookup`].
    pub fn get(&self, path: &str) -> CacheResult<Option<T>> {
        Ok(self.get_with_stat(path)?.map(|(value, _)| value))
    }

    /// Blocking lookup that also returns the node's stat, for callers doing
    /// version-checked writes.
    pub fn get_with_stat(&self, path: &str) -> CacheResult<Option<(T, Stat)>> {
        self.cache
            .fetch(path, Arc::clone(&self.deserializer), self.updater())
            .map_err(|e| CacheError::lookup(path, e))
    }

    /// Drop the cached entry for `path`. Listeners are not notified.
    pub fn invalidate(&self, path: &str) {
        self.cache.invalidate(path);
    }

    /// Drop every entry in the raw cache. Listeners are not notified.
    ///
    /// Intended for tests and resets: every path is refetched on next use.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Add `listener` to the end of the notification order. Registering the
    /// same `Arc` again is a no-op.
    pub fn register_listener(&self, listener: Arc<dyn DataCacheListener<T>>) {
        self.listeners.add(listener);
    }

    /// Remove `listener`. Removing one that is not registered is a no-op.
    ///
    /// Passes that start after this returns never call `listener`. A pass
    /// already under way skips it unless it has just passed the registration
    /// check, in which case that one in-flight call may still complete.
    pub fn unregister_listener(&self, listener: &Arc<dyn DataCacheListener<T>>) {
        self.listeners.remove(listener);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Run one reload pass for `path` and report how it ended.
    pub fn reload(&self, path: &str) -> ReloadOutcome {
        debug!(path, "reloading data cache");
        self.cache.invalidate(path);

        let fetched = self
            .cache
            .fetch(path, Arc::clone(&self.deserializer), self.updater());
        let (value, stat) = match fetched {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(path, "node does not exist, skipping notification");
                return ReloadOutcome::NodeMissing;
            }
            Err(e) => {
                warn!(path, error = %e, "reloading data cache failed");
                return ReloadOutcome::FetchFailed(e);
            }
        };

        let (delivered, failed) = self.notify_listeners(path, &value, &stat);
        ReloadOutcome::Notified { delivered, failed }
    }

    fn notify_listeners(&self, path: &str, value: &T, stat: &Stat) -> (usize, usize) {
        let snapshot = self.listeners.snapshot();
        let mut delivered = 0;
        let mut failed = 0;

        for listener in snapshot.iter() {
            // Skip listeners unregistered since the snapshot was taken. A removal
            // landing after this check still sees the call through.
            if !self.listeners.contains(listener) {
                continue;
            }
            debug!(path, version = stat.version, "notifying listener");
            match self.invoke(&**listener, path, value, stat) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(path, error = %e, "listener failed during notification");
                }
            }
        }
        (delivered, failed)
    }

    fn invoke(
        &self,
        listener: &dyn DataCacheListener<T>,
        path: &str,
        value: &T,
        stat: &Stat,
    ) -> CacheResult<()> {
        let result = if self.config.catch_listener_panics {
            panic::catch_unwind(AssertUnwindSafe(|| listener.on_update(path, value, stat)))
                .unwrap_or_else(|payload| {
                    Err(CacheError::Listener {
                        path: path.to_string(),
                        reason: format!("listener panicked: {}", panic_message(&*payload)),
                    })
                })
        } else {
            listener.on_update(path, value, stat)
        };

        result.map_err(|e| match e {
            e @ CacheError::Listener { .. } => e,
            other => CacheError::Listener {
                path: path.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

impl<T, R> CacheUpdater for DataCache<T, R>
where
    T: Clone + Send + Sync + 'static,
    R: RawCache<T> + 'static,
{
    fn reload_cache(&self, path: &str) {
        self.reload(path);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
