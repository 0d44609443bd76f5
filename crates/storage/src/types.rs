use std::fmt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Per-value identifier, assigned at insertion and strictly increasing
pub type Uid = u64;

/// 256-bit content hash used for keys and value hashes
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashCode(pub [u8; 32]);

impl HashCode {
    pub const ZERO: HashCode = HashCode([0u8; 32]);

    /// Hash arbitrary bytes
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        HashCode(hasher.finalize().into())
    }

}

impl fmt::Display for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashCode({})", self)
    }
}

/// Content type tag of a stored block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockType(pub u32);

impl BlockType {
    /// Wildcard used as a lookup filter; never a valid type for stored content
    pub const ANY: BlockType = BlockType(0);

    pub fn is_any(self) -> bool {
        self == Self::ANY
    }

    /// Whether a value of type `self` passes the lookup `filter`
    pub fn matches(self, filter: BlockType) -> bool {
        filter.is_any() || filter == self
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Absolute point in time, microseconds since the UNIX epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AbsoluteTime(u64);

impl AbsoluteTime {
    pub const ZERO: AbsoluteTime = AbsoluteTime(0);
    pub const FOREVER: AbsoluteTime = AbsoluteTime(u64::MAX);

    pub const fn from_micros(micros: u64) -> Self {
        AbsoluteTime(micros)
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }
}

/// A stored value as seen at the backend boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datum {
    pub key: HashCode,
    pub data: Vec<u8>,
    pub block_type: BlockType,
    pub priority: u32,
    pub anonymity: u32,
    pub replication: u32,
    pub expiration: AbsoluteTime,
    pub uid: Uid,
}

impl Datum {
    /// Payload size in bytes
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Hash of the payload, distinguishing values that share a key
    pub fn value_hash(&self) -> HashCode {
        HashCode::of(&self.data)
    }
}

/// Verdict a processor returns for the value it was handed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retain {
    Keep,
    Remove,
}

/// Successful outcome of a put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    /// A new value was stored under the given uid
    Stored(Uid),
    /// An identical value already existed and absorbed the new metadata
    Merged(Uid),
}

impl PutStatus {
    pub fn uid(self) -> Uid {
        match self {
            PutStatus::Stored(uid) | PutStatus::Merged(uid) => uid,
        }
    }
}

/// Arguments of a put
#[derive(Debug, Clone)]
pub struct PutRequest<'a> {
    pub key: HashCode,
    pub size: u32,
    pub data: &'a [u8],
    pub block_type: BlockType,
    pub priority: u32,
    pub anonymity: u32,
    pub replication: u32,
    pub expiration: AbsoluteTime,
    /// Caller guarantees no identical value is stored; skips the duplicate check
    pub absent: bool,
}

impl<'a> PutRequest<'a> {
    /// Request with `size` taken from `data`, zero metadata, never expiring
    pub fn new(key: HashCode, data: &'a [u8], block_type: BlockType) -> Self {
        Self {
            key,
            size: data.len() as u32,
            data,
            block_type,
            priority: 0,
            anonymity: 0,
            replication: 0,
            expiration: AbsoluteTime::FOREVER,
            absent: false,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn anonymity(mut self, anonymity: u32) -> Self {
        self.anonymity = anonymity;
        self
    }

    pub fn replication(mut self, replication: u32) -> Self {
        self.replication = replication;
        self
    }

    pub fn expiration(mut self, expiration: AbsoluteTime) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn absent(mut self, absent: bool) -> Self {
        self.absent = absent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_filter() {
        assert!(BlockType(5).matches(BlockType::ANY));
        assert!(BlockType(5).matches(BlockType(5)));
        assert!(!BlockType(5).matches(BlockType(6)));
    }

    #[test]
    fn test_value_hash_ignores_key() {
        let a = Datum {
            key: HashCode::of(b"a"),
            data: b"payload".to_vec(),
            block_type: BlockType(1),
            priority: 0,
            anonymity: 0,
            replication: 0,
            expiration: AbsoluteTime::ZERO,
            uid: 1,
        };
        let b = Datum { key: HashCode::of(b"b"), uid: 2, ..a.clone() };
        assert_eq!(a.value_hash(), b.value_hash());
        assert_eq!(a.value_hash(), HashCode::of(b"payload"));
        assert_eq!(a.size(), 7);
    }

    #[test]
    fn test_datum_wire_shape() {
        let datum = Datum {
            key: HashCode::ZERO,
            data: vec![1, 2, 3],
            block_type: BlockType(7),
            priority: 1,
            anonymity: 2,
            replication: 3,
            expiration: AbsoluteTime::from_micros(42),
            uid: 9,
        };
        let json = serde_json::to_value(&datum).unwrap();
        assert_eq!(json["block_type"], 7);
        assert_eq!(json["expiration"], 42);
        assert_eq!(json["uid"], 9);
    }
}
