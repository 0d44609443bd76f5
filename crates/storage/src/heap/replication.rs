//! Replication ordering.
//!
//! Values are kept in a max-heap by replication level. Selecting a value
//! with a positive level decays it by one; once the root has decayed to
//! zero the heap no longer says anything useful, so selection falls back
//! to a rotating walk over the heap's array layout. The walk position
//! survives across calls and advances one slot per fallback, so repeated
//! selections cycle through every stored value instead of returning the
//! same root forever. This is deliberately not a uniform sample.

use std::cmp::Reverse;

use super::indexed_heap::IndexedHeap;
use crate::types::Uid;

/// Outcome of one replication selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationPick {
    /// The root had a positive level, now lowered to `remaining`
    Decayed { uid: Uid, remaining: u32 },
    /// Every level is zero; `uid` is where the rotating walk landed
    Walked(Uid),
}

impl ReplicationPick {
    pub fn uid(self) -> Uid {
        match self {
            ReplicationPick::Decayed { uid, .. } | ReplicationPick::Walked(uid) => uid,
        }
    }
}

/// Max-heap of values by replication level, oldest first among equals
#[derive(Debug, Default)]
pub struct ReplicationIndex {
    heap: IndexedHeap<(u32, Reverse<Uid>)>,
    walk_pos: usize,
}

impl ReplicationIndex {
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

    pub fn insert(&mut self, uid: Uid, replication: u32) -> bool {
        self.heap.insert(uid, (replication, Reverse(uid)))
    }

    pub fn remove(&mut self, uid: Uid) -> bool {
        self.heap.remove(uid).is_some()
    }

    /// Recorded replication level of `uid`
    pub fn level_of(&self, uid: Uid) -> Option<u32> {
        self.heap.key_of(uid).map(|(level, _)| level)
    }

    pub fn set_level(&mut self, uid: Uid, replication: u32) -> bool {
        self.heap.update(uid, (replication, Reverse(uid)))
    }

    /// Pick the next value to replicate.
    ///
    /// A positive root level is decremented in place. A zero root stays
    /// where it is, so the array layout the walk runs over is unchanged
    /// between fallbacks, and the walk advances one slot instead.
    pub fn select(&mut self) -> Option<ReplicationPick> {
        let uid = self.heap.peek()?;
        let (level, _) = self.heap.key_of(uid)?;
        if level > 0 {
            let remaining = level - 1;
            self.heap.update(uid, (remaining, Reverse(uid)));
            return Some(ReplicationPick::Decayed { uid, remaining });
        }
        self.walk_next().map(ReplicationPick::Walked)
    }

    /// Advance the rotating walk one slot and report what it now points at
    pub fn walk_next(&mut self) -> Option<Uid> {
        let len = self.heap.len();
        if len == 0 {
            return None;
        }
        self.walk_pos = (self.walk_pos + 1) % len;
        self.heap.uid_at(self.walk_pos)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.walk_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_decay_then_walk() {
        let mut index = ReplicationIndex::new();
        index.insert(1, 0);
        index.insert(2, 2);
        index.insert(3, 0);

        assert_eq!(index.select(), Some(ReplicationPick::Decayed { uid: 2, remaining: 1 }));
        assert_eq!(index.select(), Some(ReplicationPick::Decayed { uid: 2, remaining: 0 }));
        assert!(matches!(index.select(), Some(ReplicationPick::Walked(_))));
        assert_eq!(index.level_of(2), Some(0));
    }

    #[test]
    fn test_single_zero_element_terminates() {
        let mut index = ReplicationIndex::new();
        index.insert(7, 0);
        for _ in 0..5 {
            assert_eq!(index.select(), Some(ReplicationPick::Walked(7)));
        }
    }

    #[test]
    fn test_walk_visits_everything() {
        let mut index = ReplicationIndex::new();
        for uid in 1..=6 {
            index.insert(uid, 0);
        }
        let seen: HashSet<Uid> = (0..6).filter_map(|_| index.select()).map(|p| p.uid()).collect();
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_empty_selects_nothing() {
        let mut index = ReplicationIndex::new();
        assert_eq!(index.select(), None);
        assert_eq!(index.walk_next(), None);
    }
}
