use sdfs_lib::LocatedBlock;
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Debug)]
pub struct CachedBlock {
    pub data: Vec<u8>,
    pub dirty: bool,
}

/// Bounded, recency-ordered cache of block contents: a lookup index plus an
/// explicit recency queue (front = least recently used). Both read and write
/// accesses promote an entry. The cache never flushes on its own — `pop_lru`
/// hands the evicted entry back so the channel can write it out first.
pub struct BlockCache {
    capacity: usize,
    blocks: HashMap<LocatedBlock, CachedBlock>,
    recency: VecDeque<LocatedBlock>,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            blocks: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.blocks.len() >= self.capacity
    }

    pub fn contains(&self, loc: &LocatedBlock) -> bool {
        self.blocks.contains_key(loc)
    }

    /// Access an entry, promoting it to most recently used.
    pub fn get_mut(&mut self, loc: &LocatedBlock) -> Option<&mut CachedBlock> {
        if !self.blocks.contains_key(loc) {
            return None;
        }
        self.touch(loc);
        self.blocks.get_mut(loc)
    }

    /// Insert or replace. The caller must have made room first; inserting
    /// into a full cache only replaces an existing key.
    pub fn insert(&mut self, loc: LocatedBlock, block: CachedBlock) {
        if self.blocks.insert(loc.clone(), block).is_some() {
            self.touch(&loc);
        } else {
            self.recency.push_back(loc);
        }
    }

    /// Remove and return the least-recently-used entry.
    pub fn pop_lru(&mut self) -> Option<(LocatedBlock, CachedBlock)> {
        let loc = self.recency.pop_front()?;
        let block = self.blocks.remove(&loc)?;
        Some((loc, block))
    }

    /// Drop an entry without surfacing it (used when a block's descriptor
    /// goes away on truncate; its cached bytes are stale, not dirty state).
    pub fn remove(&mut self, loc: &LocatedBlock) -> Option<CachedBlock> {
        let block = self.blocks.remove(loc)?;
        self.recency.retain(|l| l != loc);
        Some(block)
    }

    fn touch(&mut self, loc: &LocatedBlock) {
        if let Some(pos) = self.recency.iter().position(|l| l == loc) {
            self.recency.remove(pos);
        }
        self.recency.push_back(loc.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(n: u64) -> LocatedBlock {
        LocatedBlock::new("127.0.0.1:4341".parse().unwrap(), n)
    }

    fn block(byte: u8) -> CachedBlock {
        CachedBlock {
            data: vec![byte; 4],
            dirty: false,
        }
    }

    #[test]
    fn test_lru_order() {
        let mut cache = BlockCache::new(2);
        cache.insert(loc(0), block(0));
        cache.insert(loc(1), block(1));
        // touch 0 so 1 becomes the eviction candidate
        cache.get_mut(&loc(0)).unwrap();
        assert!(cache.is_full());
        let (evicted, _) = cache.pop_lru().unwrap();
        assert_eq!(evicted, loc(1));
    }

    #[test]
    fn test_write_access_promotes() {
        let mut cache = BlockCache::new(2);
        cache.insert(loc(0), block(0));
        cache.insert(loc(1), block(1));
        cache.get_mut(&loc(0)).unwrap().dirty = true;
        let (evicted, b) = cache.pop_lru().unwrap();
        assert_eq!(evicted, loc(1));
        assert!(!b.dirty);
    }

    #[test]
    fn test_replace_does_not_grow() {
        let mut cache = BlockCache::new(2);
        cache.insert(loc(0), block(0));
        cache.insert(loc(0), block(7));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_mut(&loc(0)).unwrap().data, vec![7; 4]);
    }

    #[test]
    fn test_remove_is_silent() {
        let mut cache = BlockCache::new(2);
        cache.insert(loc(0), block(0));
        cache.insert(loc(1), block(1));
        cache.remove(&loc(0));
        assert_eq!(cache.len(), 1);
        let (evicted, _) = cache.pop_lru().unwrap();
        assert_eq!(evicted, loc(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_pop_until_empty_lru_first() {
        let mut cache = BlockCache::new(3);
        cache.insert(loc(0), block(0));
        cache.insert(loc(1), block(1));
        cache.insert(loc(2), block(2));
        cache.get_mut(&loc(0)).unwrap();
        let mut order = Vec::new();
        while let Some((l, _)) = cache.pop_lru() {
            order.push(l.block_number);
        }
        assert_eq!(order, vec![1, 2, 0]);
        assert!(cache.is_empty());
    }
}
