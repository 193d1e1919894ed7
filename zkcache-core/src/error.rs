//! Error types for zkcache operations

use thiserror::Error;

/// Coordination store errors (network, session, authorization).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Connection to the coordination store was lost")]
    ConnectionLoss,

    #[error("Coordination store session expired")]
    SessionExpired,

    #[error("Operation timed out")]
    OperationTimeout,

    #[error("Not authorized to read {path}")]
    NoAuth { path: String },

    #[error("Node does not exist: {path}")]
    NoNode { path: String },

    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    #[error("Node has children: {path}")]
    NotEmpty { path: String },

    #[error("Store operation failed: {reason}")]
    Other { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all zkcache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to deserialize {path}: {reason}")]
    Deserialize { path: String, reason: String },

    #[error("Listener failed for {path}: {reason}")]
    Listener { path: String, reason: String },

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Lookup of {path} failed: {source}")]
    Lookup {
        path: String,
        #[source]
        source: Box<CacheError>,
    },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CacheError {
    /// Wrap a failure from a blocking lookup of `path`.
    pub fn lookup(path: impl Into<String>, source: CacheError) -> Self {
        Self::Lookup {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Create a deserialization error.
    pub fn deserialize(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Deserialize {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// The innermost error, looking through any `Lookup` wrappers.
    pub fn root_cause(&self) -> &CacheError {
        match self {
            Self::Lookup { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether retrying the same operation later could succeed.
    ///
    /// Transient store failures are retryable; bad bytes and bad paths are not.
    pub fn is_retryable(&self) -> bool {
        match self.root_cause() {
            Self::Store(StoreError::ConnectionLoss)
            | Self::Store(StoreError::SessionExpired)
            | Self::Store(StoreError::OperationTimeout) => true,
            _ => false,
        }
    }
}

/// Result type alias for zkcache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
