//! Intercooperative Network (ICN) datastore
//!
//! Content-addressed block storage for a node: the [`Datastore`] service
//! owns one pluggable backend, serializes every call into it, and tracks the
//! bytes it reports against the configured quota.

use thiserror::Error;

pub mod logging;
pub mod service;

pub use icn_config::{ConfigError, DatastoreConfig, HeapConfig};
pub use icn_storage::{
    AbsoluteTime, Backend, BlockType, Datum, HashCode, PutRequest, PutStatus, Retain, StorageError,
    Uid, UsageStats,
};
pub use service::Datastore;

/// Module version information
pub mod version {
    /// The current version of the datastore library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Errors surfaced by the datastore service
#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for datastore service operations
pub type DatastoreResult<T> = Result<T, DatastoreError>;
