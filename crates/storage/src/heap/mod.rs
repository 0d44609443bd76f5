//! In-memory heap backend
//!
//! Storing data on the heap is obviously not persistent; the backend is
//! the reference implementation of the datastore contract and is used for
//! testing and for nodes that do not need their content to survive a
//! restart.

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::types::{AbsoluteTime, BlockType, Datum, HashCode, PutRequest, PutStatus, Retain, Uid};
use crate::{
    DatastorePlugin, DiskUtilizationNotifier, PluginEnvironment, StorageError, StorageResult,
};

pub mod arena;
pub mod expiration;
pub mod replication;
pub mod zero_anon;
pub(crate) mod indexed_heap;

pub use arena::{StoredValue, ValueArena};
pub use expiration::ExpirationIndex;
pub use replication::{ReplicationIndex, ReplicationPick};
pub use zero_anon::ZeroAnonymityIndex;

/// In-memory datastore keeping every value in four cross-referencing structures
pub struct HeapDatastore {
    arena: ValueArena,
    by_expiration: ExpirationIndex,
    by_replication: ReplicationIndex,
    zero_anonymity: ZeroAnonymityIndex,
    max_value_size: u32,
    duc: DiskUtilizationNotifier,
}

impl HeapDatastore {
    pub fn new(env: PluginEnvironment) -> Self {
        let PluginEnvironment { config, duc } = env;
        info!(
            hashmap_size = config.heap.hashmap_size,
            max_value_size = config.max_value_size,
            "Heap database running"
        );
        Self {
            arena: ValueArena::with_capacity(config.heap.hashmap_size),
            by_expiration: ExpirationIndex::new(),
            by_replication: ReplicationIndex::new(),
            zero_anonymity: ZeroAnonymityIndex::new(),
            max_value_size: config.max_value_size,
            duc,
        }
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn arena(&self) -> &ValueArena {
        &self.arena
    }

    pub fn expiration_index(&self) -> &ExpirationIndex {
        &self.by_expiration
    }

    pub fn replication_index(&self) -> &ReplicationIndex {
        &self.by_replication
    }

    pub fn zero_anonymity_index(&self) -> &ZeroAnonymityIndex {
        &self.zero_anonymity
    }

    /// Stored value for `uid`, if live
    pub fn value(&self, uid: Uid) -> Option<&Datum> {
        self.arena.get(uid).map(|stored| &stored.datum)
    }

    fn validate(&self, request: &PutRequest<'_>) -> StorageResult<()> {
        if request.size as usize != request.data.len() {
            return Err(StorageError::SizeMismatch {
                declared: request.size,
                actual: request.data.len(),
            });
        }
        if request.size > self.max_value_size {
            return Err(StorageError::ValueTooLarge {
                size: request.size,
                limit: self.max_value_size,
            });
        }
        if request.block_type.is_any() {
            return Err(StorageError::InvalidType(request.block_type));
        }
        Ok(())
    }

    fn find_identical(&self, key: &HashCode, data: &[u8]) -> Option<Uid> {
        self.arena.uids_for_key(key).iter().copied().find(|&uid| {
            self.arena
                .get(uid)
                .map_or(false, |stored| stored.datum.data == data)
        })
    }

    /// Fold a duplicate put into the existing value
    fn merge(&mut self, uid: Uid, request: &PutRequest<'_>) {
        let (replication, expiration) = match self.arena.get_mut(uid) {
            Some(stored) => {
                let datum = &mut stored.datum;
                datum.priority = datum.priority.saturating_add(request.priority);
                datum.replication = datum.replication.saturating_add(request.replication);
                datum.expiration = datum.expiration.max(request.expiration);
                (datum.replication, datum.expiration)
            }
            None => return,
        };
        self.by_replication.set_level(uid, replication);
        self.by_expiration.update(uid, expiration);
    }

    fn insert(&mut self, request: &PutRequest<'_>) -> Uid {
        let datum = Datum {
            key: request.key,
            data: request.data.to_vec(),
            block_type: request.block_type,
            priority: request.priority,
            anonymity: request.anonymity,
            replication: request.replication,
            expiration: request.expiration,
            uid: 0,
        };
        let uid = self.arena.allocate(datum);
        self.by_expiration.insert(uid, request.expiration);
        self.by_replication.insert(uid, request.replication);
        if request.anonymity == 0 {
            let offset = self.zero_anonymity.insert(request.block_type, uid);
            if let Some(stored) = self.arena.get_mut(uid) {
                stored.zero_anon_offset = Some(offset);
            }
        }
        if request.size > 0 {
            (self.duc)(i64::from(request.size));
        }
        uid
    }

    /// Remove `uid` from every structure and free it.
    ///
    /// Panics if any structure does not hold the value.
    fn delete_value(&mut self, uid: Uid) {
        let stored = self.arena.release(uid);
        assert!(
            self.by_expiration.remove(uid),
            "expiration index out of sync: uid {} missing",
            uid
        );
        assert!(
            self.by_replication.remove(uid),
            "replication index out of sync: uid {} missing",
            uid
        );
        if let Some(offset) = stored.zero_anon_offset {
            if let Some(moved) = self.zero_anonymity.remove(stored.datum.block_type, offset, uid) {
                match self.arena.get_mut(moved) {
                    Some(moved) => moved.zero_anon_offset = Some(offset),
                    None => panic!("zero-anonymity index references freed uid {}", moved),
                }
            }
        }
        let size = stored.datum.size();
        debug!(uid, key = %stored.datum.key, size, "Deleted value");
        if size > 0 {
            (self.duc)(-i64::from(size));
        }
    }

    /// Hand `uid` to `proc` and delete it if the processor declines it
    fn deliver<P>(&mut self, uid: Option<Uid>, proc: P)
    where
        P: FnOnce(Option<&Datum>) -> Retain,
    {
        match uid.and_then(|uid| self.arena.get(uid).map(|stored| (uid, stored))) {
            Some((uid, stored)) => {
                if proc(Some(&stored.datum)) == Retain::Remove {
                    self.delete_value(uid);
                }
            }
            None => {
                proc(None);
            }
        }
    }

    fn matches(
        stored: &StoredValue,
        key: Option<&HashCode>,
        value_hash: Option<&HashCode>,
        block_type: BlockType,
    ) -> bool {
        let datum = &stored.datum;
        datum.block_type.matches(block_type)
            && key.map_or(true, |key| datum.key == *key)
            && value_hash.map_or(true, |hash| datum.value_hash() == *hash)
    }

    fn select_by_key(
        &self,
        cursor: Uid,
        random: bool,
        key: Option<&HashCode>,
        value_hash: Option<&HashCode>,
        block_type: BlockType,
    ) -> Option<Uid> {
        let is_match = |stored: &&StoredValue| Self::matches(stored, key, value_hash, block_type);
        if random {
            let candidates: Vec<Uid> = match key {
                Some(key) => self
                    .arena
                    .uids_for_key(key)
                    .iter()
                    .filter_map(|&uid| self.arena.get(uid))
                    .filter(is_match)
                    .map(|stored| stored.datum.uid)
                    .collect(),
                None => self.arena.iter().filter(is_match).map(|stored| stored.datum.uid).collect(),
            };
            return candidates.choose(&mut rand::thread_rng()).copied();
        }
        match key {
            Some(key) => self
                .arena
                .uids_for_key(key)
                .iter()
                .copied()
                .filter(|&uid| uid >= cursor)
                .filter(|&uid| self.arena.get(uid).map_or(false, |stored| is_match(&stored)))
                .min(),
            None => self
                .arena
                .range_from(cursor)
                .find(is_match)
                .map(|stored| stored.datum.uid),
        }
    }

    /// Check that every cross-reference between the four structures holds
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut zero_anon = 0;
        let mut size = 0u64;
        for stored in self.arena.iter() {
            let datum = &stored.datum;
            let uid = datum.uid;
            size += u64::from(datum.size());
            if self.by_expiration.expiration_of(uid) != Some(datum.expiration) {
                return Err(format!("uid {} has wrong expiration entry", uid));
            }
            if self.by_replication.level_of(uid) != Some(datum.replication) {
                return Err(format!("uid {} has wrong replication entry", uid));
            }
            match (datum.anonymity, stored.zero_anon_offset) {
                (0, Some(offset)) => {
                    let bucket = self.zero_anonymity.bucket(datum.block_type).unwrap_or(&[]);
                    if bucket.get(offset) != Some(&uid) {
                        return Err(format!("uid {} not at recorded offset {}", uid, offset));
                    }
                    zero_anon += 1;
                }
                (0, None) => return Err(format!("uid {} missing zero-anonymity offset", uid)),
                (_, Some(_)) => return Err(format!("uid {} wrongly zero-anonymity indexed", uid)),
                (_, None) => {}
            }
        }
        if self.by_expiration.len() != self.arena.len() {
            return Err("expiration index size differs from arena".to_string());
        }
        if self.by_replication.len() != self.arena.len() {
            return Err("replication index size differs from arena".to_string());
        }
        if self.zero_anonymity.len() != zero_anon {
            return Err("zero-anonymity index size differs from arena".to_string());
        }
        if size != self.arena.size() {
            return Err(format!("size counter {} != sum {}", self.arena.size(), size));
        }
        Ok(())
    }
}

impl DatastorePlugin for HeapDatastore {
    fn estimate_size(&self) -> u64 {
        self.arena.size()
    }

    fn put<C>(&mut self, request: PutRequest<'_>, cont: C)
    where
        C: FnOnce(&HashCode, u32, StorageResult<PutStatus>),
    {
        if let Err(e) = self.validate(&request) {
            warn!(key = %request.key, "Rejected put: {}", e);
            cont(&request.key, request.size, Err(e));
            return;
        }
        if !request.absent {
            if let Some(uid) = self.find_identical(&request.key, request.data) {
                self.merge(uid, &request);
                debug!(uid, key = %request.key, "Merged duplicate put");
                cont(&request.key, request.size, Ok(PutStatus::Merged(uid)));
                return;
            }
        }
        let uid = self.insert(&request);
        debug!(uid, key = %request.key, size = request.size, "Stored value");
        cont(&request.key, request.size, Ok(PutStatus::Stored(uid)));
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
        let uid = self.select_by_key(cursor, random, key, value_hash, block_type);
        self.deliver(uid, proc);
    }

    fn get_for_replication<P>(&mut self, proc: P)
    where
        P: FnOnce(Option<&Datum>) -> Retain,
    {
        let pick = self.by_replication.select();
        if let Some(ReplicationPick::Decayed { uid, remaining }) = pick {
            if let Some(stored) = self.arena.get_mut(uid) {
                stored.datum.replication = remaining;
            }
        }
        self.deliver(pick.map(ReplicationPick::uid), proc);
    }

    fn get_for_expiration<P>(&mut self, proc: P)
    where
        P: FnOnce(Option<&Datum>) -> Retain,
    {
        let uid = self.by_expiration.peek_min();
        self.deliver(uid, proc);
    }

    fn get_zero_anonymity<P>(&mut self, cursor: Uid, block_type: BlockType, proc: P)
    where
        P: FnOnce(Option<&Datum>) -> Retain,
    {
        let uid = self.zero_anonymity.get_by_type(cursor, block_type);
        self.deliver(uid, proc);
    }

    fn update<C>(&mut self, uid: Uid, delta: u32, expire: AbsoluteTime, cont: C)
    where
        C: FnOnce(StorageResult<()>),
    {
        let expiration = match self.arena.get_mut(uid) {
            Some(stored) => {
                let datum = &mut stored.datum;
                datum.priority = datum.priority.saturating_add(delta);
                datum.expiration = datum.expiration.max(expire);
                datum.expiration
            }
            None => {
                cont(Err(StorageError::UnknownUid(uid)));
                return;
            }
        };
        self.by_expiration.update(uid, expiration);
        cont(Ok(()));
    }

    fn drop_all(&mut self) {
        let count = self.arena.len();
        self.arena.clear();
        self.by_expiration.clear();
        self.by_replication.clear();
        self.zero_anonymity.clear();
        (self.duc)(0);
        info!(count, "Dropped heap database");
    }

    fn enumerate_keys<F>(&mut self, mut proc: F)
    where
        F: FnMut(Option<(&HashCode, u32)>),
    {
        for (key, count) in self.arena.key_counts() {
            proc(Some((key, saturating_count(count))));
        }
        proc(None);
    }

    fn remove_key<C>(&mut self, key: &HashCode, size: u32, data: &[u8], cont: C)
    where
        C: FnOnce(&HashCode, u32, StorageResult<()>),
    {
        let found = self
            .arena
            .uids_for_key(key)
            .iter()
            .copied()
            .find(|&uid| {
                self.arena
                    .get(uid)
                    .map_or(false, |stored| {
                        stored.datum.size() == size && stored.datum.data == data
                    })
            });
        match found {
            Some(uid) => {
                self.delete_value(uid);
                cont(key, size, Ok(()));
            }
            None => cont(key, size, Err(StorageError::NotFound)),
        }
    }
}

/// Value count as reported to `enumerate_keys`, capped at `u32::MAX`
fn saturating_count(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}
