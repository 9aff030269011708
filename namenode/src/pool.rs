use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reusable block-number allocator. Allocation always takes the smallest
/// recycled id first and only extends the high-water mark when the set is
/// empty. A recycled number's old bytes stay on the datanode until
/// overwritten, so callers must treat freshly allocated blocks as stale.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FreeBlockPool {
    free: BTreeSet<u64>,
    next_block: u64,
}

impl FreeBlockPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> u64 {
        match self.free.iter().next().copied() {
            Some(id) => {
                self.free.remove(&id);
                id
            }
            None => {
                let id = self.next_block;
                self.next_block += 1;
                id
            }
        }
    }

    pub fn recycle(&mut self, block_number: u64) {
        if block_number < self.next_block {
            self.free.insert(block_number);
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn high_water_mark(&self) -> u64 {
        self.next_block
    }
}
