//! Content-addressed datastore backends for the Intercooperative Network
//!
//! This crate provides:
//! - The backend contract every datastore implementation honors
//! - The in-memory heap backend and its selection indices
//! - Backend selection by configuration
//! - Disk-utilization accounting

use std::fmt;

use icn_config::DatastoreConfig;
use thiserror::Error;

pub mod types;
pub mod heap;
pub mod backend;
pub mod quota;

// Re-export commonly used types
pub use types::{
    AbsoluteTime,
    BlockType,
    Datum,
    HashCode,
    PutRequest,
    PutStatus,
    Retain,
    Uid,
};

pub use heap::HeapDatastore;
pub use backend::Backend;
pub use quota::{QuotaManager, UsageStats};

/// Datastore-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Value too large: {size} bytes exceeds limit of {limit}")]
    ValueTooLarge { size: u32, limit: u32 },

    #[error("Size mismatch: declared {declared} bytes, got {actual}")]
    SizeMismatch { declared: u32, actual: usize },

    #[error("Invalid block type: {0}")]
    InvalidType(BlockType),

    #[error("Content not found")]
    NotFound,

    #[error("Unknown uid: {0}")]
    UnknownUid(Uid),

    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Callback told about every change in stored bytes; `0` means "reset to empty"
pub type DiskUtilizationNotifier = Box<dyn FnMut(i64) + Send>;

/// Everything a backend receives when it is loaded
pub struct PluginEnvironment {
    pub config: DatastoreConfig,
    pub duc: DiskUtilizationNotifier,
}

impl PluginEnvironment {
    pub fn new(config: DatastoreConfig, duc: DiskUtilizationNotifier) -> Self {
        Self { config, duc }
    }

    /// Environment whose notifications go nowhere
    pub fn detached(config: DatastoreConfig) -> Self {
        Self::new(config, Box::new(|_: i64| {}))
    }
}

impl fmt::Debug for PluginEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEnvironment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The contract every datastore backend implements.
///
/// Calls are issued one at a time by a single owner. Every get-style
/// operation calls its processor exactly once: with the selected value, or
/// with `None` when nothing matched. A processor returning
/// [`Retain::Remove`] has the value deleted before the call returns.
/// Mutating operations report through a continuation that is likewise
/// called exactly once.
pub trait DatastorePlugin {
    /// Bytes currently stored
    fn estimate_size(&self) -> u64;

    /// Store a value, or merge it into an identical one unless `absent` is set
    fn put<C>(&mut self, request: PutRequest<'_>, cont: C)
    where
        C: FnOnce(&HashCode, u32, StorageResult<PutStatus>);

    /// Look up a value by key, value hash and type.
    ///
    /// Without `random`, the match with the smallest uid `>= cursor` is
    /// selected; with it, an arbitrary match.
    fn get_by_key<P>(
        &mut self,
        cursor: Uid,
        random: bool,
        key: Option<&HashCode>,
        value_hash: Option<&HashCode>,
        block_type: BlockType,
        proc: P,
    ) where
        P: FnOnce(Option<&Datum>) -> Retain;

    /// Select a value for proactive replication
    fn get_for_replication<P>(&mut self, proc: P)
    where
        P: FnOnce(Option<&Datum>) -> Retain;

    /// Select the value that expires first
    fn get_for_expiration<P>(&mut self, proc: P)
    where
        P: FnOnce(Option<&Datum>) -> Retain;

    /// Select the zero-anonymity value of a type with the smallest uid `>= cursor`
    fn get_zero_anonymity<P>(&mut self, cursor: Uid, block_type: BlockType, proc: P)
    where
        P: FnOnce(Option<&Datum>) -> Retain;

    /// Raise priority by `delta` (saturating) and expiration to at least `expire`
    fn update<C>(&mut self, uid: Uid, delta: u32, expire: AbsoluteTime, cont: C)
    where
        C: FnOnce(StorageResult<()>);

    /// Destroy every stored value
    fn drop_all(&mut self);

    /// Report each distinct key with its value count, then `None`
    fn enumerate_keys<F>(&mut self, proc: F)
    where
        F: FnMut(Option<(&HashCode, u32)>);

    /// Delete one value stored under `key` whose payload equals `data`
    fn remove_key<C>(&mut self, key: &HashCode, size: u32, data: &[u8], cont: C)
    where
        C: FnOnce(&HashCode, u32, StorageResult<()>);
}
