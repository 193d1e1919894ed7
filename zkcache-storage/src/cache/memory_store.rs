//! In-memory coordination store.
//!
//! Implements [`NodeStore`] with ZooKeeper-style one-shot watches and stat
//! bookkeeping, so the cache can be exercised without a server. Watchers are
//! always invoked after the store lock is released, which lets a watcher read
//! back from the store on the same thread.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::trace;
use zkcache_core::{
    parent_path, validate_path, CacheResult, EventType, KeeperState, Stat, StoreError,
    WatchedEvent,
};

use super::traits::{NodeStore, Watcher};

static NEXT_SESSION_ID: AtomicI64 = AtomicI64::new(1);

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    stat: Stat,
}

#[derive(Default)]
struct StoreState {
    nodes: HashMap<String, Node>,
    zxid: i64,
    /// Watches armed by `get_data`/`exists` on existing nodes.
    data_watches: HashMap<String, Vec<Arc<dyn Watcher>>>,
    /// Watches armed by `exists` on missing nodes.
    exist_watches: HashMap<String, Vec<Arc<dyn Watcher>>>,
    injected_failures: VecDeque<StoreError>,
    reads: u64,
}

impl StoreState {
    fn next_zxid(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn arm(
        watches: &mut HashMap<String, Vec<Arc<dyn Watcher>>>,
        path: &str,
        watcher: Arc<dyn Watcher>,
    ) {
        let armed = watches.entry(path.to_string()).or_default();
        if !armed.iter().any(|w| Arc::ptr_eq(w, &watcher)) {
            armed.push(watcher);
        }
    }

    /// Take every watch armed on `path`, deduplicated.
    fn take_watches(&mut self, path: &str) -> Vec<Arc<dyn Watcher>> {
        let mut fired: Vec<Arc<dyn Watcher>> = Vec::new();
        let data = self.data_watches.remove(path).unwrap_or_default();
        let exist = self.exist_watches.remove(path).unwrap_or_default();
        for watcher in data.into_iter().chain(exist) {
            if !fired.iter().any(|w| Arc::ptr_eq(w, &watcher)) {
                fired.push(watcher);
            }
        }
        fired
    }

    fn check_read(&mut self) -> CacheResult<()> {
        self.reads += 1;
        match self.injected_failures.pop_front() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Process-local [`NodeStore`].
pub struct InMemoryNodeStore {
    state: Mutex<StoreState>,
    session_id: i64,
}

impl Default for InMemoryNodeStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl InMemoryNodeStore {
    /// Create an empty store. Only the root `/` exists implicitly.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a node. The parent must already exist.
    pub fn create(&self, path: &str, data: impl Into<Vec<u8>>) -> CacheResult<Stat> {
        validate_path(path)?;
        let data = data.into();
        let data_length = data_length(path, data.len())?;
        let (stat, fired) = {
            let mut state = self.state();
            if path == "/" || state.nodes.contains_key(path) {
                return Err(StoreError::NodeExists {
                    path: path.to_string(),
                }
                .into());
            }
            let parent = parent_path(path).unwrap_or("/");
            if parent != "/" && !state.nodes.contains_key(parent) {
                return Err(StoreError::NoNode {
                    path: parent.to_string(),
                }
                .into());
            }

            let zxid = state.next_zxid();
            let now = Utc::now().timestamp_millis();
            let stat = Stat {
                czxid: zxid,
                mzxid: zxid,
                pzxid: zxid,
                ctime: now,
                mtime: now,
                data_length,
                ..Default::default()
            };
            if let Some(parent) = state.nodes.get_mut(parent) {
                parent.stat.num_children += 1;
                parent.stat.cversion += 1;
                parent.stat.pzxid = zxid;
            }
            state.nodes.insert(path.to_string(), Node { data, stat });
            (stat, state.take_watches(path))
        };

        fire(fired, WatchedEvent::node(EventType::NodeCreated, path));
        Ok(stat)
    }

    /// Create `path` and any missing ancestors. Ancestors get empty data.
    pub fn create_all(&self, path: &str, data: impl Into<Vec<u8>>) -> CacheResult<Stat> {
        validate_path(path)?;
        let mut ancestors = Vec::new();
        let mut cursor = parent_path(path);
        while let Some(p) = cursor {
            if p == "/" {
                break;
            }
            ancestors.push(p.to_string());
            cursor = parent_path(p);
        }
        for ancestor in ancestors.iter().rev() {
            if !self.exists_now(ancestor) {
                self.create(ancestor, Vec::new())?;
            }
        }
        self.create(path, data)
    }

    /// Replace a node's data, bumping its version.
    pub fn set_data(&self, path: &str, data: impl Into<Vec<u8>>) -> CacheResult<Stat> {
        let data = data.into();
        let data_length = data_length(path, data.len())?;
        let (stat, fired) = {
            let mut state = self.state();
            let zxid = state.next_zxid();
            let node = state.nodes.get_mut(path).ok_or_else(|| StoreError::NoNode {
                path: path.to_string(),
            })?;
            node.stat.mzxid = zxid;
            node.stat.mtime = Utc::now().timestamp_millis();
            node.stat.version += 1;
            node.stat.data_length = data_length;
            node.data = data;
            let stat = node.stat;
            (stat, state.take_watches(path))
        };

        fire(fired, WatchedEvent::node(EventType::NodeDataChanged, path));
        Ok(stat)
    }

    /// Delete a node. Nodes with children cannot be deleted.
    pub fn delete(&self, path: &str) -> CacheResult<()> {
        let fired = {
            let mut state = self.state();
            let node = state.nodes.get(path).ok_or_else(|| StoreError::NoNode {
                path: path.to_string(),
            })?;
            if node.stat.num_children > 0 {
                return Err(StoreError::NotEmpty {
                    path: path.to_string(),
                }
                .into());
            }
            state.nodes.remove(path);
            let zxid = state.next_zxid();
            if let Some(parent) = parent_path(path).and_then(|p| state.nodes.get_mut(p)) {
                parent.stat.num_children -= 1;
                parent.stat.cversion += 1;
                parent.stat.pzxid = zxid;
            }
            state.take_watches(path)
        };

        fire(fired, WatchedEvent::node(EventType::NodeDeleted, path));
        Ok(())
    }

    /// Expire the session: every armed watcher receives one `Expired` event
    /// and all watches are dropped.
    pub fn expire_session(&self) {
        let fired = {
            let mut guard = self.state();
            let state = &mut *guard;
            let mut fired: Vec<Arc<dyn Watcher>> = Vec::new();
            let all = state
                .data_watches
                .drain()
                .chain(state.exist_watches.drain())
                .flat_map(|(_, watchers)| watchers)
                .collect::<Vec<_>>();
            for watcher in all {
                if !fired.iter().any(|w| Arc::ptr_eq(w, &watcher)) {
                    fired.push(watcher);
                }
            }
            fired
        };
        fire(fired, WatchedEvent::session(KeeperState::Expired));
    }

    /// Make the next `count` reads fail with `error`.
    pub fn fail_next_reads(&self, count: usize, error: StoreError) {
        let mut state = self.state();
        state
            .injected_failures
            .extend(std::iter::repeat(error).take(count));
    }

    /// Number of `get_data`/`exists` calls served so far.
    pub fn read_count(&self) -> u64 {
        self.state().reads
    }

    /// Number of distinct watches currently armed on `path`.
    pub fn watch_count(&self, path: &str) -> usize {
        let state = self.state();
        state.data_watches.get(path).map_or(0, Vec::len)
            + state.exist_watches.get(path).map_or(0, Vec::len)
    }

    /// Whether `path` exists right now, without arming a watch.
    pub fn exists_now(&self, path: &str) -> bool {
        self.state().nodes.contains_key(path)
    }
}

/// `Stat::data_length` is an `i32`; larger payloads are rejected.
fn data_length(path: &str, len: usize) -> CacheResult<i32> {
    i32::try_from(len).map_err(|_| {
        StoreError::Other {
            reason: format!("payload of {len} bytes for {path} exceeds the node size limit"),
        }
        .into()
    })
}

fn fire(watchers: Vec<Arc<dyn Watcher>>, event: WatchedEvent) {
    for watcher in watchers {
        trace!(?event, "firing watch");
        watcher.process(event.clone());
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get_data(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> CacheResult<Option<(Vec<u8>, Stat)>> {
        let mut state = self.state();
        state.check_read()?;
        let Some(node) = state.nodes.get(path).cloned() else {
            return Ok(None);
        };
        if let Some(watcher) = watcher {
            StoreState::arm(&mut state.data_watches, path, watcher);
        }
        Ok(Some((node.data, node.stat)))
    }

    async fn exists(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> CacheResult<Option<Stat>> {
        let mut state = self.state();
        state.check_read()?;
        let stat = state.nodes.get(path).map(|node| node.stat);
        if let Some(watcher) = watcher {
            if stat.is_some() {
                StoreState::arm(&mut state.data_watches, path, watcher);
            } else {
                StoreState::arm(&mut state.exist_watches, path, watcher);
            }
        }
        Ok(stat)
    }

    fn session_id(&self) -> i64 {
        self.session_id
    }
}
