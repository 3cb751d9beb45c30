//! First-fit free list for the guest heap.
//!
//! The list covers the region between the heap base and the current
//! program break as a sorted, contiguous run of blocks. Splitting keeps
//! 8-byte granularity; coalescing is eager, so no two adjacent free
//! blocks ever survive a release. Growth of the underlying region is
//! not decided here: the address space grows the break and hands the
//! new region in through [`FreeList::extend`].

/// One region of the heap, either handed out or available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: u32,
    pub size: u32,
    pub free: bool,
}

/// Minimum block granule; also the split threshold.
pub const MIN_BLOCK: u32 = 8;

#[derive(Debug, Clone, Default)]
pub struct FreeList {
    blocks: Vec<Block>,
}

impl FreeList {
    /// First-fit scan for a free block of at least `need` bytes. The
    /// chosen block is trimmed to `need` when the remainder is big
    /// enough to stand alone. Returns the block's start address.
    pub fn allocate(&mut self, need: u32) -> Option<u32> {
        let index = self
            .blocks
            .iter()
            .position(|block| block.free && block.size >= need)?;
        let remainder = self.blocks[index].size - need;
        if remainder >= MIN_BLOCK {
            let tail = Block {
                start: self.blocks[index].start + need,
                size: remainder,
                free: true,
            };
            self.blocks[index].size = need;
            self.blocks.insert(index + 1, tail);
        }
        self.blocks[index].free = false;
        Some(self.blocks[index].start)
    }

    /// Append a newly grown region as a free block, merging with a free
    /// block already ending at `start`.
    pub fn extend(&mut self, start: u32, size: u32) {
        if let Some(last) = self.blocks.last_mut() {
            if last.free && last.start + last.size == start {
                last.size += size;
                return;
            }
        }
        self.blocks.push(Block {
            start,
            size,
            free: true,
        });
    }

    /// Release the block starting exactly at `ptr`. Pointers that are
    /// not a block start are ignored. Coalesces with the right
    /// neighbour, then the left.
    pub fn release(&mut self, ptr: u32) {
        let Some(index) = self.blocks.iter().position(|block| block.start == ptr) else {
            return;
        };
        self.blocks[index].free = true;
        if index + 1 < self.blocks.len() && self.blocks[index + 1].free {
            self.blocks[index].size += self.blocks[index + 1].size;
            self.blocks.remove(index + 1);
        }
        if index > 0 && self.blocks[index - 1].free {
            self.blocks[index - 1].size += self.blocks[index].size;
            self.blocks.remove(index);
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The block list must stay sorted and contiguous, with no two
    /// adjacent free blocks.
    fn check_invariants(list: &FreeList, base: u32, top: u32) {
        let blocks = list.blocks();
        if blocks.is_empty() {
            assert_eq!(base, top);
            return;
        }
        assert_eq!(blocks[0].start, base);
        for pair in blocks.windows(2) {
            assert_eq!(pair[0].start + pair[0].size, pair[1].start);
            assert!(!(pair[0].free && pair[1].free));
        }
        let last = blocks.last().unwrap();
        assert_eq!(last.start + last.size, top);
    }

    #[test]
    fn check_first_fit_picks_earliest() {
        let mut list = FreeList::default();
        list.extend(0x2000, 4096);
        let p1 = list.allocate(16).unwrap();
        let p2 = list.allocate(16).unwrap();
        assert_eq!(p1, 0x2000);
        assert_eq!(p2, 0x2010);
        list.release(p1);
        // The freed 16-byte block is the first fit for 8
        assert_eq!(list.allocate(8).unwrap(), p1);
        check_invariants(&list, 0x2000, 0x3000);
    }

    #[test]
    fn check_split_threshold() {
        let mut list = FreeList::default();
        list.extend(0x2000, 24);
        // Remainder of 8 splits
        list.allocate(16).unwrap();
        assert_eq!(list.blocks().len(), 2);
        // Remainder below 8 does not split: a 20-byte region serves a
        // 16-byte request whole
        let mut list = FreeList::default();
        list.extend(0x2000, 20);
        list.allocate(16).unwrap();
        assert_eq!(list.blocks().len(), 1);
        assert_eq!(list.blocks()[0].size, 20);
    }

    #[test]
    fn check_coalesce_both_sides() {
        let mut list = FreeList::default();
        list.extend(0x2000, 4096);
        let p1 = list.allocate(32).unwrap();
        let p2 = list.allocate(32).unwrap();
        let p3 = list.allocate(32).unwrap();
        list.release(p1);
        list.release(p3);
        // Freeing the middle block merges left and right in one pass
        list.release(p2);
        assert_eq!(list.blocks().len(), 1);
        assert!(list.blocks()[0].free);
        check_invariants(&list, 0x2000, 0x3000);
    }

    #[test]
    fn check_release_ignores_non_block_start() {
        let mut list = FreeList::default();
        list.extend(0x2000, 4096);
        let p = list.allocate(32).unwrap();
        let before = list.blocks().to_vec();
        list.release(p + 4);
        assert_eq!(list.blocks(), before.as_slice());
    }

    #[test]
    fn check_extend_merges_free_tail() {
        let mut list = FreeList::default();
        list.extend(0x2000, 64);
        list.extend(0x2040, 4096);
        assert_eq!(list.blocks().len(), 1);
        assert_eq!(list.blocks()[0].size, 64 + 4096);
        check_invariants(&list, 0x2000, 0x2000 + 64 + 4096);
    }
}
