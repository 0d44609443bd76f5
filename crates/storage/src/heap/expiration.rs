use std::cmp::Reverse;

use super::indexed_heap::IndexedHeap;
use crate::types::{AbsoluteTime, Uid};

/// Min-heap of values by expiration time; ties go to the smaller uid
#[derive(Debug, Default)]
pub struct ExpirationIndex {
    heap: IndexedHeap<Reverse<(AbsoluteTime, Uid)>>,
}

impl ExpirationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.heap.contains(uid)
    }

    pub fn insert(&mut self, uid: Uid, expiration: AbsoluteTime) -> bool {
        self.heap.insert(uid, Reverse((expiration, uid)))
    }

    pub fn remove(&mut self, uid: Uid) -> bool {
        self.heap.remove(uid).is_some()
    }

    /// The value that expires first, left in place
    pub fn peek_min(&self) -> Option<Uid> {
        self.heap.peek()
    }

    /// Recorded expiration of `uid`
    pub fn expiration_of(&self, uid: Uid) -> Option<AbsoluteTime> {
        self.heap.key_of(uid).map(|Reverse((expiration, _))| expiration)
    }

    /// Move `uid` to `expiration`; only re-sifts when the time actually changes
    pub fn update(&mut self, uid: Uid, expiration: AbsoluteTime) -> bool {
        match self.expiration_of(uid) {
            Some(current) if current == expiration => true,
            Some(_) => self.heap.update(uid, Reverse((expiration, uid))),
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_min_with_uid_tiebreak() {
        let mut index = ExpirationIndex::new();
        index.insert(3, AbsoluteTime::from_micros(50));
        index.insert(1, AbsoluteTime::from_micros(50));
        index.insert(2, AbsoluteTime::from_micros(70));
        assert_eq!(index.peek_min(), Some(1));

        index.remove(1);
        assert_eq!(index.peek_min(), Some(3));
    }

    #[test]
    fn test_update_resifts() {
        let mut index = ExpirationIndex::new();
        index.insert(1, AbsoluteTime::from_micros(10));
        index.insert(2, AbsoluteTime::from_micros(20));
        assert_eq!(index.peek_min(), Some(1));

        assert!(index.update(1, AbsoluteTime::from_micros(30)));
        assert_eq!(index.peek_min(), Some(2));
        assert_eq!(index.expiration_of(1), Some(AbsoluteTime::from_micros(30)));
        assert!(!index.update(9, AbsoluteTime::ZERO));
    }
}
