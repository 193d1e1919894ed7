//! Typed cache layer with watch-driven invalidation.
//!
//! The layer is split the same way the data flows:
//!
//! - [`NodeStore`] is the remote session. [`InMemoryNodeStore`] implements it
//!   for tests and local runs.
//! - [`RawCache`] owns `(value, stat)` entries per path. [`NodeCache`] fills
//!   them from a `NodeStore`, shares concurrent misses, and arms watches.
//! - [`DataCache`] is the typed facade callers use. It turns watch events
//!   into reload passes and fans the new value out to its listeners.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(InMemoryNodeStore::new());
//! let raw = Arc::new(NodeCache::with_defaults(store.clone()));
//! let cache = DataCache::new(raw, JsonDeserializer::<Policies>::new());
//!
//! cache.register_listener(listener);
//! let policies = cache.get("/admin/policies/tenant-a")?;
//!
//! // A remote write fires the watch; the listener sees the new value.
//! store.set_data("/admin/policies/tenant-a", new_bytes)?;
//! ```

pub mod data_cache;
pub mod deserializer;
pub mod listeners;
pub mod memory_store;
pub mod node_cache;
pub mod traits;

pub use data_cache::{DataCache, ReloadOutcome};
pub use deserializer::{JsonDeserializer, Utf8Deserializer};
pub use listeners::{DataCacheListener, ListenerRegistry};
pub use memory_store::InMemoryNodeStore;
pub use node_cache::NodeCache;
pub use traits::{CacheStats, CacheUpdater, Deserializer, NodeStore, RawCache, Watcher};
