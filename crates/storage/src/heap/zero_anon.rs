use std::collections::HashMap;

use crate::types::{BlockType, Uid};

/// Zero-anonymity values bucketed by block type.
///
/// Each value records its offset within its bucket; removal swaps the last
/// entry into the hole, so callers must rewrite the moved value's offset.
#[derive(Debug, Default)]
pub struct ZeroAnonymityIndex {
    buckets: HashMap<BlockType, Vec<Uid>>,
}

impl ZeroAnonymityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of indexed values across all buckets
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket(&self, block_type: BlockType) -> Option<&[Uid]> {
        self.buckets.get(&block_type).map(Vec::as_slice)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Append `uid` to the bucket for `block_type`, returning its offset
    pub fn insert(&mut self, block_type: BlockType, uid: Uid) -> usize {
        let bucket = self.buckets.entry(block_type).or_default();
        bucket.push(uid);
        bucket.len() - 1
    }

    /// Remove `uid` from `offset` in its bucket.
    ///
    /// Returns the uid that was moved into `offset`, if any. Panics if
    /// `uid` is not at `offset`, since that means the offsets are corrupt.
    pub fn remove(&mut self, block_type: BlockType, offset: usize, uid: Uid) -> Option<Uid> {
        let bucket = self.buckets.get_mut(&block_type);
        assert!(
            matches!(&bucket, Some(b) if b.get(offset) == Some(&uid)),
            "zero-anonymity index out of sync: uid {} not at offset {} of type {}",
            uid,
            offset,
            block_type
        );
        let bucket = bucket?;
        bucket.swap_remove(offset);
        let moved = bucket.get(offset).copied();
        if bucket.is_empty() {
            self.buckets.remove(&block_type);
        }
        moved
    }

    /// Smallest uid `>= cursor` among buckets matching `filter`
    pub fn get_by_type(&self, cursor: Uid, filter: BlockType) -> Option<Uid> {
        self.buckets
            .iter()
            .filter(|(block_type, _)| block_type.matches(filter))
            .flat_map(|(_, bucket)| bucket.iter().copied())
            .filter(|&uid| uid >= cursor)
            .min()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_delete_moves_last() {
        let mut index = ZeroAnonymityIndex::new();
        assert_eq!(index.insert(BlockType(5), 10), 0);
        assert_eq!(index.insert(BlockType(5), 11), 1);
        assert_eq!(index.insert(BlockType(5), 12), 2);

        assert_eq!(index.remove(BlockType(5), 0, 10), Some(12));
        assert_eq!(index.bucket(BlockType(5)), Some(&[12, 11][..]));

        assert_eq!(index.remove(BlockType(5), 1, 11), None);
        assert_eq!(index.bucket(BlockType(5)), Some(&[12][..]));
    }

    #[test]
    fn test_empty_bucket_is_unlinked() {
        let mut index = ZeroAnonymityIndex::new();
        index.insert(BlockType(1), 1);
        index.insert(BlockType(2), 2);
        assert_eq!(index.bucket_count(), 2);

        index.remove(BlockType(1), 0, 1);
        assert_eq!(index.bucket_count(), 1);
        assert!(index.bucket(BlockType(1)).is_none());
    }

    #[test]
    fn test_get_by_type_cursor() {
        let mut index = ZeroAnonymityIndex::new();
        index.insert(BlockType(1), 4);
        index.insert(BlockType(2), 2);
        index.insert(BlockType(1), 7);

        assert_eq!(index.get_by_type(0, BlockType::ANY), Some(2));
        assert_eq!(index.get_by_type(3, BlockType::ANY), Some(4));
        assert_eq!(index.get_by_type(0, BlockType(1)), Some(4));
        assert_eq!(index.get_by_type(5, BlockType(1)), Some(7));
        assert_eq!(index.get_by_type(8, BlockType::ANY), None);
        assert_eq!(index.get_by_type(0, BlockType(3)), None);
    }

    #[test]
    #[should_panic(expected = "out of sync")]
    fn test_remove_wrong_offset_panics() {
        let mut index = ZeroAnonymityIndex::new();
        index.insert(BlockType(1), 1);
        index.insert(BlockType(1), 2);
        index.remove(BlockType(1), 0, 2);
    }
}
