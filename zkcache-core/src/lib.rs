//! zkcache Core - Shared Types
//!
//! Node metadata, watch events, errors and configuration shared by the
//! cache layer and its tests. No I/O lives here.

pub mod config;
pub mod error;
pub mod stat;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult, ConfigError, StoreError};
pub use stat::{EventType, KeeperState, Stat, WatchedEvent};

// ============================================================================
// PATHS
// ============================================================================

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '/';

/// Check that `path` is a well-formed absolute node path.
///
/// Rules: starts with `/`, no trailing `/` (except the root itself), no empty
/// segments, no `.` or `..` segments, and no NUL characters.
pub fn validate_path(path: &str) -> CacheResult<()> {
    let invalid = |reason: &str| {
        Err(CacheError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        })
    };

    if !path.starts_with(PATH_SEPARATOR) {
        return invalid("path must start with '/'");
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with(PATH_SEPARATOR) {
        return invalid("path must not end with '/'");
    }
    if path.contains('\0') {
        return invalid("path must not contain NUL");
    }
    for segment in path[1..].split(PATH_SEPARATOR) {
        match segment {
            "" => return invalid("empty segment"),
            "." | ".." => return invalid("relative segment"),
            _ => {}
        }
    }
    Ok(())
}

/// Parent of `path`, or `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind(PATH_SEPARATOR) {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
