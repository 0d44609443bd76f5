//! Array-backed binary max-heap addressable by uid.
//!
//! Every node's position is tracked so arbitrary entries can be removed or
//! re-keyed in O(log n). Min-ordering is obtained by wrapping keys in
//! `std::cmp::Reverse`.

use std::collections::HashMap;

use crate::types::Uid;

#[derive(Debug, Clone)]
struct HeapNode<K> {
    key: K,
    uid: Uid,
}

#[derive(Debug, Clone)]
pub(crate) struct IndexedHeap<K> {
    nodes: Vec<HeapNode<K>>,
    positions: HashMap<Uid, usize>,
}

impl<K: Ord + Copy> IndexedHeap<K> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.positions.contains_key(&uid)
    }

    pub fn key_of(&self, uid: Uid) -> Option<K> {
        self.positions.get(&uid).map(|&pos| self.nodes[pos].key)
    }

    /// Uid stored at array position `pos`
    pub fn uid_at(&self, pos: usize) -> Option<Uid> {
        self.nodes.get(pos).map(|node| node.uid)
    }

    pub fn peek(&self) -> Option<Uid> {
        self.nodes.first().map(|node| node.uid)
    }

    /// Insert `uid`; returns false (and changes nothing) if it is already present
    pub fn insert(&mut self, uid: Uid, key: K) -> bool {
        if self.positions.contains_key(&uid) {
            return false;
        }
        let pos = self.nodes.len();
        self.nodes.push(HeapNode { key, uid });
        self.positions.insert(uid, pos);
        self.sift_up(pos);
        true
    }

    /// Remove `uid`, returning its key if it was present
    pub fn remove(&mut self, uid: Uid) -> Option<K> {
        let pos = self.positions.remove(&uid)?;
        let last = self.nodes.len() - 1;
        if pos != last {
            self.nodes.swap(pos, last);
            self.positions.insert(self.nodes[pos].uid, pos);
        }
        let removed = self.nodes.pop()?;
        if pos < self.nodes.len() {
            self.restore(pos);
        }
        Some(removed.key)
    }

    /// Re-key `uid`; returns false if it is not present
    pub fn update(&mut self, uid: Uid, key: K) -> bool {
        match self.positions.get(&uid) {
            Some(&pos) => {
                self.nodes[pos].key = key;
                self.restore(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.positions.clear();
    }

    fn restore(&mut self, pos: usize) {
        let pos = self.sift_up(pos);
        self.sift_down(pos);
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.nodes[pos].key <= self.nodes[parent].key {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.nodes.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut largest = pos;
            if left < len && self.nodes[left].key > self.nodes[largest].key {
                largest = left;
            }
            if right < len && self.nodes[right].key > self.nodes[largest].key {
                largest = right;
            }
            if largest == pos {
                break;
            }
            self.swap(pos, largest);
            pos = largest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.nodes.swap(a, b);
        self.positions.insert(self.nodes[a].uid, a);
        self.positions.insert(self.nodes[b].uid, b);
    }

    #[cfg(test)]
    pub fn is_valid(&self) -> bool {
        (1..self.nodes.len()).all(|i| self.nodes[i].key <= self.nodes[(i - 1) / 2].key)
            && self.positions.len() == self.nodes.len()
            && self
                .nodes
                .iter()
                .enumerate()
                .all(|(pos, node)| self.positions.get(&node.uid) == Some(&pos))
    }
}

impl<K: Ord + Copy> Default for IndexedHeap<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Reverse;

    #[test]
    fn test_drain_root_in_order() {
        let mut heap = IndexedHeap::new();
        for (uid, key) in [(1, 5), (2, 9), (3, 1), (4, 7), (5, 3)] {
            assert!(heap.insert(uid, key));
        }
        assert!(heap.is_valid());

        let keys: Vec<u32> =
            std::iter::from_fn(|| heap.peek().and_then(|root| heap.remove(root))).collect();
        assert_eq!(keys, vec![9, 7, 5, 3, 1]);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_remove_and_update_keep_heap_valid() {
        let mut heap = IndexedHeap::new();
        for uid in 0..32u64 {
            heap.insert(uid, Reverse((uid * 7) % 13));
        }
        assert_eq!(heap.remove(10), Some(Reverse(5)));
        assert_eq!(heap.remove(10), None);
        assert!(heap.update(3, Reverse(100)));
        assert!(!heap.update(10, Reverse(0)));
        assert!(heap.is_valid());
        assert_eq!(heap.len(), 31);
        assert_eq!(heap.key_of(3), Some(Reverse(100)));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut heap = IndexedHeap::new();
        assert!(heap.insert(1, 1));
        assert!(!heap.insert(1, 2));
        assert_eq!(heap.key_of(1), Some(1));
    }
}
