//! zkcache Storage - Watch-Invalidated Typed Cache
//!
//! Read-through cache for values stored in a hierarchical coordination
//! store. Values are deserialized once per change, kept coherent through
//! one-shot watches, and pushed to listeners after every remote update.

pub mod cache;

pub use cache::{
    CacheStats, CacheUpdater, DataCache, DataCacheListener, Deserializer, InMemoryNodeStore,
    JsonDeserializer, ListenerRegistry, NodeCache, NodeStore, RawCache, ReloadOutcome,
    Utf8Deserializer, Watcher,
};

// Re-export core types used in this crate's public signatures
pub use zkcache_core::{
    CacheConfig, CacheError, CacheResult, EventType, KeeperState, Stat, StoreError, WatchedEvent,
};
