//! Stock deserializers for node payloads.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use zkcache_core::{CacheError, CacheResult};

use super::traits::Deserializer;

/// Decodes node data as JSON into `T`.
pub struct JsonDeserializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDeserializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDeserializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonDeserializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonDeserializer")
    }
}

impl<T: DeserializeOwned> Deserializer<T> for JsonDeserializer<T> {
    fn deserialize(&self, path: &str, content: &[u8]) -> CacheResult<T> {
        serde_json::from_slice(content).map_err(|e| CacheError::deserialize(path, e))
    }
}

/// Decodes node data as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Deserializer;

impl Deserializer<String> for Utf8Deserializer {
    fn deserialize(&self, path: &str, content: &[u8]) -> CacheResult<String> {
        std::str::from_utf8(content)
            .map(str::to_owned)
            .map_err(|e| CacheError::deserialize(path, e))
    }
}
