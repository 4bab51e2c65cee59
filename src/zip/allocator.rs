//! Buddy-system allocator for the byte ranges of an archive file.
//!
//! The managed extent is always `[0, 2^k)`. Free space is kept as power-of-two
//! blocks, one ordered set of offsets per size class, where class `b` holds
//! blocks of `2^(b + min_shift)` bytes. A block's buddy is the block of the
//! same class whose offset differs only in the bit equal to the block size.
//!
//! Allocation rounds the request up to a class, splitting larger blocks when
//! the class is empty and doubling the extent when nothing large enough is
//! free. Freeing merges a block with its buddy for as long as the buddy is
//! free, so two free buddies never sit in the same class.

use std::collections::BTreeSet;
use tracing::trace;

/// log2 of the smallest block: 32 bytes.
pub const MIN_BLOCK_SHIFT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuddyAllocator {
    min_shift: u32,
    /// Free block offsets per size class, ascending.
    free: Vec<BTreeSet<u64>>,
    /// End of the managed range; zero or a power of two.
    extent: u64,
}

impl Default for BuddyAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BuddyAllocator {
    pub fn new() -> Self {
        Self::with_min_shift(MIN_BLOCK_SHIFT)
    }

    pub fn with_min_shift(min_shift: u32) -> Self {
        Self {
            min_shift: min_shift.min(40),
            free: Vec::new(),
            extent: 0,
        }
    }

    /// Smallest class whose blocks hold `size` bytes.
    pub fn class_of(&self, size: u64) -> usize {
        let mut shift = self.min_shift;
        while (1u64 << shift) < size {
            shift += 1;
        }
        (shift - self.min_shift) as usize
    }

    /// Block size of `class` in bytes.
    pub fn block_size(&self, class: usize) -> u64 {
        1u64 << (class as u32 + self.min_shift)
    }

    /// Size of the block that holds `size` bytes.
    pub fn rounded_size(&self, size: u64) -> u64 {
        self.block_size(self.class_of(size))
    }

    /// End of the managed range.
    pub fn extent(&self) -> u64 {
        self.extent
    }

    /// All free blocks as `(offset, size)`, ordered by offset.
    pub fn free_blocks(&self) -> Vec<(u64, u64)> {
        let mut blocks: Vec<_> = self
            .free
            .iter()
            .enumerate()
            .flat_map(|(class, set)| {
                let size = self.block_size(class);
                set.iter().map(move |&offset| (offset, size))
            })
            .collect();
        blocks.sort_unstable();
        blocks
    }

    pub fn free_bytes(&self) -> u64 {
        self.free
            .iter()
            .enumerate()
            .map(|(class, set)| set.len() as u64 * self.block_size(class))
            .sum()
    }

    /// Reserve a block for `size` bytes and return its offset.
    pub fn allocate(&mut self, size: u64) -> u64 {
        let class = self.class_of(size);
        loop {
            if let Some(from) = (class..self.free.len()).find(|&c| !self.free[c].is_empty()) {
                if let Some(offset) = self.free[from].pop_first() {
                    return self.split_down(offset, from, class, offset);
                }
            }
            self.grow(class);
        }
    }

    /// Reserve the block for `size` bytes that starts exactly at `offset`.
    ///
    /// Returns `false` when `offset` is not aligned to the block size or the
    /// range is already (partly) in use.
    pub fn allocate_at(&mut self, size: u64, offset: u64) -> bool {
        let class = self.class_of(size);
        let block = self.block_size(class);
        if offset % block != 0 {
            return false;
        }
        while self.extent < offset + block {
            self.grow(class);
        }

        for from in class..self.free.len() {
            let base = offset & !(self.block_size(from) - 1);
            if self.free[from].remove(&base) {
                self.split_down(base, from, class, offset);
                return true;
            }
        }
        false
    }

    /// Reserve a block for `size` bytes starting at or after `threshold`,
    /// choosing the lowest such position.
    pub fn allocate_after(&mut self, size: u64, threshold: u64) -> u64 {
        let class = self.class_of(size);
        let block = self.block_size(class);
        let wanted = threshold.div_ceil(block) * block;

        loop {
            // (position, containing block offset, containing block class)
            let mut best: Option<(u64, u64, usize)> = None;
            for from in class..self.free.len() {
                let from_size = self.block_size(from);
                let containing = self.free[from].range(..=wanted).next_back().copied();
                let following = self.free[from].range(wanted..).next().copied();

                let candidate = match containing {
                    Some(base) if base + from_size > wanted => Some((wanted, base)),
                    _ => following.map(|base| (base, base)),
                };
                if let Some((position, base)) = candidate {
                    if best.is_none_or(|(p, _, _)| position < p) {
                        best = Some((position, base, from));
                    }
                }
            }

            if let Some((position, base, from)) = best {
                self.free[from].remove(&base);
                return self.split_down(base, from, class, position);
            }
            self.grow(class);
        }
    }

    /// Return the block at `offset` that was reserved for `size` bytes.
    pub fn free(&mut self, offset: u64, size: u64) {
        let mut class = self.class_of(size);
        let mut offset = offset;
        loop {
            self.ensure_class(class);
            let block = self.block_size(class);
            let buddy = offset ^ block;
            if block < self.extent && self.free[class].remove(&buddy) {
                offset = offset.min(buddy);
                class += 1;
            } else {
                self.free[class].insert(offset);
                return;
            }
        }
    }

    fn ensure_class(&mut self, class: usize) {
        while self.free.len() <= class {
            self.free.push(BTreeSet::new());
        }
    }

    /// Split the block `(offset, from)` down to class `to`, keeping the
    /// sub-block that contains `keep` and freeing the other halves.
    fn split_down(&mut self, offset: u64, from: usize, to: usize, keep: u64) -> u64 {
        let mut offset = offset;
        for class in (to..from).rev() {
            let half = self.block_size(class);
            let upper = offset + half;
            if keep >= upper {
                self.free[class].insert(offset);
                offset = upper;
            } else {
                self.free[class].insert(upper);
            }
        }
        offset
    }

    /// Double the managed range by freeing the buddy of the whole current
    /// extent. An empty allocator starts with a single block of `class`.
    fn grow(&mut self, class: usize) {
        if self.extent == 0 {
            self.ensure_class(class);
            self.extent = self.block_size(class);
            self.free[class].insert(0);
        } else {
            let added = self.extent;
            self.extent *= 2;
            self.free(added, added);
        }
        trace!(extent = self.extent, "grew allocator");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_of() {
        let alloc = BuddyAllocator::new();
        assert_eq!(alloc.class_of(0), 0);
        assert_eq!(alloc.class_of(1), 0);
        assert_eq!(alloc.class_of(32), 0);
        assert_eq!(alloc.class_of(33), 1);
        assert_eq!(alloc.class_of(64), 1);
        assert_eq!(alloc.class_of(1000), 5);
        assert_eq!(alloc.block_size(5), 1024);
        assert_eq!(alloc.rounded_size(100), 128);
    }

    #[test]
    fn test_first_allocation_sets_extent() {
        let mut alloc = BuddyAllocator::new();
        assert_eq!(alloc.allocate(100), 0);
        assert_eq!(alloc.extent(), 128);
        assert!(alloc.free_blocks().is_empty());
    }

    #[test]
    fn test_allocation_splits_larger_block() {
        let mut alloc = BuddyAllocator::new();
        assert_eq!(alloc.allocate(1000), 0);
        alloc.free(0, 1000);
        assert_eq!(alloc.free_blocks(), vec![(0, 1024)]);

        assert_eq!(alloc.allocate(32), 0);
        assert_eq!(
            alloc.free_blocks(),
            vec![(32, 32), (64, 64), (128, 128), (256, 256), (512, 512)]
        );
        assert_eq!(alloc.allocate(32), 32);
        assert_eq!(alloc.allocate(64), 64);
    }

    #[test]
    fn test_growth_doubles_extent() {
        let mut alloc = BuddyAllocator::new();
        assert_eq!(alloc.allocate(32), 0);
        assert_eq!(alloc.allocate(32), 32);
        assert_eq!(alloc.extent(), 64);
        assert_eq!(alloc.allocate(200), 256);
        assert_eq!(alloc.extent(), 512);
        assert_eq!(alloc.free_blocks(), vec![(64, 64), (128, 128)]);
    }

    #[test]
    fn test_buddies_coalesce() {
        let mut alloc = BuddyAllocator::new();
        let a = alloc.allocate(32);
        let b = alloc.allocate(32);
        assert_eq!(a ^ 32, b);

        alloc.free(a, 32);
        assert_eq!(alloc.free_blocks(), vec![(a, 32)]);
        alloc.free(b, 32);
        assert_eq!(alloc.free_blocks(), vec![(0, 64)]);
    }

    #[test]
    fn test_coalescing_cascades_upward() {
        let mut alloc = BuddyAllocator::new();
        let offsets: Vec<u64> = (0..8).map(|_| alloc.allocate(32)).collect();
        assert_eq!(alloc.extent(), 256);
        for offset in offsets {
            alloc.free(offset, 32);
        }
        assert_eq!(alloc.free_blocks(), vec![(0, 256)]);
    }

    #[test]
    fn test_non_buddies_do_not_merge() {
        let mut alloc = BuddyAllocator::new();
        let offsets: Vec<u64> = (0..4).map(|_| alloc.allocate(32)).collect();
        // 32 and 64 are adjacent but not buddies.
        alloc.free(offsets[1], 32);
        alloc.free(offsets[2], 32);
        assert_eq!(alloc.free_blocks(), vec![(32, 32), (64, 32)]);
    }

    #[test]
    fn test_allocate_at_exact_offset() {
        let mut alloc = BuddyAllocator::new();
        assert!(alloc.allocate_at(64, 192));
        assert_eq!(alloc.extent(), 256);
        assert_eq!(alloc.free_blocks(), vec![(0, 128), (128, 64)]);

        assert!(!alloc.allocate_at(64, 192));
        assert!(!alloc.allocate_at(64, 100));
        assert!(alloc.allocate_at(32, 160));
        assert_eq!(alloc.free_blocks(), vec![(0, 128), (128, 32)]);
    }

    #[test]
    fn test_allocate_at_inside_used_block_fails() {
        let mut alloc = BuddyAllocator::new();
        assert!(alloc.allocate_at(128, 0));
        assert!(!alloc.allocate_at(32, 64));
        assert!(alloc.allocate_at(32, 128));
    }

    #[test]
    fn test_allocate_after_threshold() {
        let mut alloc = BuddyAllocator::new();
        assert_eq!(alloc.allocate(256), 0);
        alloc.free(0, 256);

        assert_eq!(alloc.allocate_after(32, 70), 96);
        assert_eq!(alloc.allocate_after(32, 0), 0);
        assert_eq!(alloc.allocate_after(64, 96), 128);
        assert_eq!(alloc.allocate_after(64, 200), 256);
        assert_eq!(alloc.extent(), 512);
    }

    #[test]
    fn test_allocate_after_prefers_nearest_block() {
        let mut alloc = BuddyAllocator::new();
        let offsets: Vec<u64> = (0..8).map(|_| alloc.allocate(32)).collect();
        alloc.free(offsets[7], 32);
        alloc.free(offsets[2], 32);
        assert_eq!(alloc.allocate_after(32, 40), 64);
        assert_eq!(alloc.allocate_after(32, 40), 224);
    }

    #[test]
    fn test_allocate_then_free_all_restores_state() {
        let mut alloc = BuddyAllocator::new();
        let first = alloc.allocate(1024);
        alloc.free(first, 1024);
        let initial = alloc.free_blocks();

        let offsets: Vec<u64> = (0..16).map(|_| alloc.allocate(50)).collect();
        for offset in offsets.into_iter().rev() {
            alloc.free(offset, 50);
        }
        assert_eq!(alloc.free_blocks(), initial);
        assert_eq!(alloc.free_bytes(), 1024);
    }

    #[test]
    fn test_custom_min_shift() {
        let mut alloc = BuddyAllocator::with_min_shift(9);
        assert_eq!(alloc.block_size(0), 512);
        assert_eq!(alloc.allocate(10), 0);
        assert_eq!(alloc.allocate(10), 512);
    }
}
