//! Cache configuration.
//!
//! Loaded from environment variables or a TOML fragment, with defaults that
//! suit a long-running service.

use serde::{Deserialize, Serialize};

use crate::error::{CacheResult, ConfigError};

/// Configuration for the node cache and the typed caches built on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Run reload passes on the tokio blocking pool instead of the thread
    /// that delivered the watch event. Falls back to inline dispatch when no
    /// runtime is available.
    pub background_reload: bool,

    /// Cache "node does not exist" results and arm an exists-watch so the
    /// entry is dropped when the node is created.
    pub cache_missing_nodes: bool,

    /// Treat a panicking listener like one that returned an error.
    pub catch_listener_panics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            background_reload: true,
            cache_missing_nodes: true,
            catch_listener_panics: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable background reload dispatch.
    pub fn with_background_reload(mut self, enabled: bool) -> Self {
        self.background_reload = enabled;
        self
    }

    /// Enable or disable caching of missing nodes.
    pub fn with_cache_missing_nodes(mut self, enabled: bool) -> Self {
        self.cache_missing_nodes = enabled;
        self
    }

    /// Enable or disable listener panic isolation.
    pub fn with_catch_listener_panics(mut self, enabled: bool) -> Self {
        self.catch_listener_panics = enabled;
        self
    }

    /// Create a CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `ZKCACHE_BACKGROUND_RELOAD`: "true" or "false" (default: true)
    /// - `ZKCACHE_CACHE_MISSING_NODES`: "true" or "false" (default: true)
    /// - `ZKCACHE_CATCH_LISTENER_PANICS`: "true" or "false" (default: true)
    pub fn from_env() -> CacheResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            background_reload: env_flag("ZKCACHE_BACKGROUND_RELOAD", defaults.background_reload)?,
            cache_missing_nodes: env_flag(
                "ZKCACHE_CACHE_MISSING_NODES",
                defaults.cache_missing_nodes,
            )?,
            catch_listener_panics: env_flag(
                "ZKCACHE_CATCH_LISTENER_PANICS",
                defaults.catch_listener_panics,
            )?,
        })
    }

    /// Parse a CacheConfig from TOML. Missing keys take their defaults.
    pub fn from_toml_str(input: &str) -> CacheResult<Self> {
        toml::from_str(input).map_err(|e| {
            ConfigError::Parse {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

fn env_flag(name: &str, default: bool) -> CacheResult<bool> {
    match std::env::var(name) {
        Ok(value) => parse_flag(name, &value),
        Err(_) => Ok(default),
    }
}

fn parse_flag(field: &str, value: &str) -> CacheResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }
        .into()),
    }
}
