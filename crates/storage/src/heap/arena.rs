use std::collections::{BTreeMap, HashMap};

use crate::types::{Datum, HashCode, Uid};

/// A value owned by the arena plus its zero-anonymity bucket offset
#[derive(Debug, Clone)]
pub struct StoredValue {
    pub datum: Datum,
    pub zero_anon_offset: Option<usize>,
}

/// Owner of every stored value.
///
/// Values live in a uid-ordered map so cursor scans are range queries; a
/// key multimap lists the uids stored under each key.
#[derive(Debug)]
pub struct ValueArena {
    values: BTreeMap<Uid, StoredValue>,
    by_key: HashMap<HashCode, Vec<Uid>>,
    next_uid: Uid,
    size: u64,
}

impl ValueArena {
    pub fn with_capacity(hint: usize) -> Self {
        Self {
            values: BTreeMap::new(),
            by_key: HashMap::with_capacity(hint),
            next_uid: 1,
            size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of payload sizes of all live values
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Take ownership of `datum`, assigning it the next uid
    pub fn allocate(&mut self, mut datum: Datum) -> Uid {
        let uid = self.next_uid;
        self.next_uid += 1;
        datum.uid = uid;
        self.size += u64::from(datum.size());
        self.by_key.entry(datum.key).or_default().push(uid);
        self.values.insert(
            uid,
            StoredValue {
                datum,
                zero_anon_offset: None,
            },
        );
        uid
    }

    /// Remove `uid` from the arena and the key multimap.
    ///
    /// Panics if the value is not present in both.
    pub fn release(&mut self, uid: Uid) -> StoredValue {
        let stored = match self.values.remove(&uid) {
            Some(stored) => stored,
            None => panic!("value arena out of sync: uid {} not stored", uid),
        };

        let key = stored.datum.key;
        let removed = match self.by_key.get_mut(&key) {
            Some(uids) => {
                let before = uids.len();
                uids.retain(|&u| u != uid);
                let removed = uids.len() < before;
                if uids.is_empty() {
                    self.by_key.remove(&key);
                }
                removed
            }
            None => false,
        };
        assert!(removed, "key map out of sync: uid {} missing under key {}", uid, key);

        self.size -= u64::from(stored.datum.size());
        stored
    }

    pub fn get(&self, uid: Uid) -> Option<&StoredValue> {
        self.values.get(&uid)
    }

    pub fn get_mut(&mut self, uid: Uid) -> Option<&mut StoredValue> {
        self.values.get_mut(&uid)
    }

    /// Uids stored under `key`, in insertion order
    pub fn uids_for_key(&self, key: &HashCode) -> &[Uid] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Values with uid `>= cursor`, in increasing uid order
    pub fn range_from(&self, cursor: Uid) -> impl Iterator<Item = &StoredValue> + '_ {
        self.values.range(cursor..).map(|(_, stored)| stored)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredValue> + '_ {
        self.values.values()
    }

    /// Each distinct key with the number of values stored under it
    pub fn key_counts(&self) -> impl Iterator<Item = (&HashCode, usize)> + '_ {
        self.by_key.iter().map(|(key, uids)| (key, uids.len()))
    }

    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    /// Free every value; uids keep increasing afterwards
    pub fn clear(&mut self) {
        self.values.clear();
        self.by_key.clear();
        self.size = 0;
    }
}
