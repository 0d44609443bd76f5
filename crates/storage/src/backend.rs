use icn_config::ConfigError;
use tracing::{error, info};

use crate::heap::HeapDatastore;
use crate::types::{AbsoluteTime, BlockType, Datum, HashCode, PutRequest, PutStatus, Retain, Uid};
use crate::{DatastorePlugin, PluginEnvironment, StorageResult};

/// The backends this build can load, selected by name at startup
pub enum Backend {
    Heap(HeapDatastore),
}

impl Backend {
    /// Instantiate the backend named by `env.config.database`
    pub fn load(env: PluginEnvironment) -> Result<Self, ConfigError> {
        let name = match env.config.backend_name() {
            Ok(name) => name.to_string(),
            Err(e) => {
                error!("{}", e);
                return Err(e);
            }
        };
        info!("Loading `{}' datastore plugin", name);
        match name.as_str() {
            "heap" => Ok(Backend::Heap(HeapDatastore::new(env))),
            other => {
                error!("Failed to load datastore plugin for `{}'", other);
                Err(ConfigError::UnsupportedBackend(other.to_string()))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Heap(_) => "heap",
        }
    }
}

impl DatastorePlugin for Backend {
    fn estimate_size(&self) -> u64 {
        match self {
            Backend::Heap(store) => store.estimate_size(),
        }
    }

    fn put<C>(&mut self, request: PutRequest<'_>, cont: C)
    where
        C: FnOnce(&HashCode, u32, StorageResult<PutStatus>),
    {
        match self {
            Backend::Heap(store) => store.put(request, cont),
        }
    }

    fn get_by_key<P>(
        &mut self,
        cursor: Uid,
        random: bool,
        key: Option<&HashCode>,
        value_hash: Option<&HashCode>,
        block_type: BlockType,
        proc: P,
    ) where
        P: FnOnce(Option<&Datum>) -> Retain,
    {
        match self {
            Backend::Heap(store) => {
                store.get_by_key(cursor, random, key, value_hash, block_type, proc)
            }
        }
    }

    fn get_for_replication<P>(&mut self, proc: P)
    where
        P: FnOnce(Option<&Datum>) -> Retain,
    {
        match self {
            Backend::Heap(store) => store.get_for_replication(proc),
        }
    }

    fn get_for_expiration<P>(&mut self, proc: P)
    where
        P: FnOnce(Option<&Datum>) -> Retain,
    {
        match self {
            Backend::Heap(store) => store.get_for_expiration(proc),
        }
    }

    fn get_zero_anonymity<P>(&mut self, cursor: Uid, block_type: BlockType, proc: P)
    where
        P: FnOnce(Option<&Datum>) -> Retain,
    {
        match self {
            Backend::Heap(store) => store.get_zero_anonymity(cursor, block_type, proc),
        }
    }

    fn update<C>(&mut self, uid: Uid, delta: u32, expire: AbsoluteTime, cont: C)
    where
        C: FnOnce(StorageResult<()>),
    {
        match self {
            Backend::Heap(store) => store.update(uid, delta, expire, cont),
        }
    }

    fn drop_all(&mut self) {
        match self {
            Backend::Heap(store) => store.drop_all(),
        }
    }

    fn enumerate_keys<F>(&mut self, proc: F)
    where
        F: FnMut(Option<(&HashCode, u32)>),
    {
        match self {
            Backend::Heap(store) => store.enumerate_keys(proc),
        }
    }

    fn remove_key<C>(&mut self, key: &HashCode, size: u32, data: &[u8], cont: C)
    where
        C: FnOnce(&HashCode, u32, StorageResult<()>),
    {
        match self {
            Backend::Heap(store) => store.remove_key(key, size, data, cont),
        }
    }
}
