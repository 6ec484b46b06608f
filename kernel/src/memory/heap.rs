//! # The heap allocator
//!
//! Explicit block chain over a borrowed arena. The chain starts at `head`
//! and threads through every block in physical order; `heap_ptr` is the
//! high-water mark past the last block, from which the bump path carves new
//! blocks once no existing free block fits.
//!
//! After `init` the single initial block already reaches the end of the
//! initialized region, so the bump path only serves chains whose tail was
//! left short of `size`.

use super::block::{BlockHeader, BlockInfo, BlockOffset, HEADER_SIZE, MIN_BLOCK_SIZE};
use super::{align_up, HeapError};
use crate::config::ALIGNMENT;

/// Payload handle returned by the allocator
///
/// An offset from the start of the arena, never a raw address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr(usize);

impl HeapPtr {
    /// Wrap an arbitrary arena offset
    ///
    /// Only handles produced by [`Heap::allocate`] are accepted by
    /// [`Heap::free`]; anything else is rejected there.
    pub const fn from_offset(offset: usize) -> Self {
        HeapPtr(offset)
    }

    pub const fn offset(self) -> usize {
        self.0
    }

    fn for_block(block: BlockOffset) -> Self {
        HeapPtr(block.payload())
    }
}

/// Snapshot of heap utilization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes in used blocks, headers included
    pub total_allocated: usize,
    /// Bytes in free blocks, headers included
    pub total_free: usize,
    /// Size of the largest free block
    pub max_free_block: usize,
    /// Number of blocks in the chain
    pub block_count: usize,
}

/// First-fit heap over a fixed arena
pub struct Heap<'a> {
    arena: &'a mut [u8],
    /// Bytes handed to `init`
    size: usize,
    head: Option<BlockOffset>,
    heap_ptr: usize,
    initialized: bool,
}

impl<'a> Heap<'a> {
    /// Wrap an arena; nothing is usable until [`Heap::init`] succeeds
    pub fn new(arena: &'a mut [u8]) -> Self {
        Self {
            arena,
            size: 0,
            head: None,
            heap_ptr: 0,
            initialized: false,
        }
    }

    /// Physical capacity of the arena
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Bytes managed since `init`, zero before
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// High-water mark of the bump path
    pub fn heap_ptr(&self) -> usize {
        self.heap_ptr
    }

    /// Turn the first `size` bytes of the arena into one free block
    ///
    /// A region too small to hold a single header counts as an invalid size.
    /// The managed size is rounded down so the payload of the first block is
    /// a whole number of alignment units; the few trailing bytes are unused.
    pub fn init(&mut self, size: usize) -> Result<(), HeapError> {
        if self.initialized {
            return Err(HeapError::AlreadyInitialized);
        }
        if size == 0 || size > self.arena.len() || size < MIN_BLOCK_SIZE {
            return Err(HeapError::InvalidSize);
        }
        let size = HEADER_SIZE + ((size - HEADER_SIZE) & !(ALIGNMENT - 1));

        let first = BlockOffset(0);
        BlockHeader::new(size, None, true).write(self.arena, first);

        self.size = size;
        self.head = Some(first);
        self.heap_ptr = size;
        self.initialized = true;
        Ok(())
    }

    /// Allocate `size` payload bytes, first fit
    pub fn allocate(&mut self, size: usize) -> Result<HeapPtr, HeapError> {
        if !self.initialized {
            return Err(HeapError::NotInitialized);
        }

        let total = align_up(size)
            .and_then(|aligned| aligned.checked_add(HEADER_SIZE))
            .ok_or(HeapError::OutOfMemory)?;

        let mut tail = None;
        let mut cursor = self.head;
        while let Some(at) = cursor {
            let mut header = self.header(at);
            if header.is_free() && header.size >= total {
                let remaining = header.size - total;
                if remaining >= HEADER_SIZE + MIN_BLOCK_SIZE {
                    let split = BlockOffset(at.0 + total);
                    BlockHeader::new(remaining, header.next, true).write(self.arena, split);
                    header.size = total;
                    header.next = Some(split);
                }
                header.set_free(false);
                header.write(self.arena, at);
                return Ok(HeapPtr::for_block(at));
            }
            tail = Some(at);
            cursor = header.next;
        }

        self.bump(total, tail)
    }

    /// Carve a used block from the untouched tail and append it to the chain
    fn bump(&mut self, total: usize, tail: Option<BlockOffset>) -> Result<HeapPtr, HeapError> {
        if total > self.size - self.heap_ptr {
            return Err(HeapError::OutOfMemory);
        }

        let at = BlockOffset(self.heap_ptr);
        BlockHeader::new(total, None, false).write(self.arena, at);
        self.heap_ptr += total;

        match tail {
            Some(last) => {
                let mut header = self.header(last);
                header.next = Some(at);
                header.write(self.arena, last);
            }
            None => self.head = Some(at),
        }

        Ok(HeapPtr::for_block(at))
    }

    /// Return a block to the heap and merge it with free chain neighbours
    pub fn free(&mut self, ptr: HeapPtr) -> Result<(), HeapError> {
        if !self.initialized {
            return Err(HeapError::NotInitialized);
        }
        if ptr.0 < HEADER_SIZE || ptr.0 >= self.size {
            return Err(HeapError::InvalidPointer);
        }

        let at = BlockOffset(ptr.0 - HEADER_SIZE);
        let (previous, mut header) = self.locate(at).ok_or(HeapError::InvalidPointer)?;
        if header.is_free() {
            return Err(HeapError::DoubleFree);
        }
        header.set_free(true);

        // Forward: absorb the successor
        if let Some(next_at) = header.next {
            let next = self.header(next_at);
            if next.is_free() {
                header.size += next.size;
                header.next = next.next;
            }
        }
        header.write(self.arena, at);

        // Backward: fold into the predecessor
        if let Some(prev_at) = previous {
            let mut prev = self.header(prev_at);
            if prev.is_free() {
                prev.size += header.size;
                prev.next = header.next;
                prev.write(self.arena, prev_at);
            }
        }

        Ok(())
    }

    /// Allocate `size` bytes starting on an `alignment` boundary
    ///
    /// The returned handle points inside a larger block and is not a block
    /// payload start, so [`Heap::free`] rejects it.
    pub fn allocate_aligned(&mut self, size: usize, alignment: usize) -> Result<HeapPtr, HeapError> {
        if !alignment.is_power_of_two() {
            return Err(HeapError::InvalidAlignment);
        }

        let padded = size
            .checked_add(alignment - 1)
            .and_then(|n| n.checked_add(HEADER_SIZE))
            .ok_or(HeapError::OutOfMemory)?;
        let raw = self.allocate(padded)?;

        let aligned = (raw.0 + HEADER_SIZE + alignment - 1) & !(alignment - 1);
        Ok(HeapPtr(aligned))
    }

    /// Walk the chain once and summarize it
    pub fn stats(&self) -> HeapStats {
        self.blocks().fold(HeapStats::default(), |mut stats, block| {
            if block.free {
                stats.total_free += block.size;
                stats.max_free_block = stats.max_free_block.max(block.size);
            } else {
                stats.total_allocated += block.size;
            }
            stats.block_count += 1;
            stats
        })
    }

    /// Iterate the block chain from the head
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            arena: self.arena,
            cursor: self.head,
        }
    }

    /// Payload bytes of a used block
    pub fn payload(&self, ptr: HeapPtr) -> Option<&[u8]> {
        let range = self.payload_range(ptr)?;
        Some(&self.arena[range])
    }

    /// Mutable payload bytes of a used block
    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        let range = self.payload_range(ptr)?;
        Some(&mut self.arena[range])
    }

    fn payload_range(&self, ptr: HeapPtr) -> Option<core::ops::Range<usize>> {
        if !self.initialized || ptr.0 < HEADER_SIZE || ptr.0 >= self.size {
            return None;
        }
        let at = BlockOffset(ptr.0 - HEADER_SIZE);
        let (_, header) = self.locate(at)?;
        if header.is_free() {
            return None;
        }
        Some(ptr.0..at.0 + header.size)
    }

    fn header(&self, at: BlockOffset) -> BlockHeader {
        BlockHeader::read(self.arena, at)
    }

    /// Find the block at `at` in the chain, with its predecessor
    fn locate(&self, at: BlockOffset) -> Option<(Option<BlockOffset>, BlockHeader)> {
        let mut previous = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            let header = self.header(current);
            if current == at {
                return Some((previous, header));
            }
            if current > at {
                return None;
            }
            previous = Some(current);
            cursor = header.next;
        }
        None
    }
}

/// Iterator over the block chain
pub struct Blocks<'h> {
    arena: &'h [u8],
    cursor: Option<BlockOffset>,
}

impl<'h> Iterator for Blocks<'h> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let at = self.cursor?;
        let header = BlockHeader::read(self.arena, at);
        self.cursor = header.next;
        Some(BlockInfo {
            offset: at,
            size: header.size,
            free: header.is_free(),
        })
    }
}

/// Assert coverage, contiguity, capacity and the size floor of the chain
#[cfg(test)]
pub(crate) fn assert_chain_invariants(heap: &Heap) {
    let mut expected_start = 0;
    let mut total = 0;
    for block in heap.blocks() {
        assert_eq!(block.offset.0, expected_start, "gap or overlap at {:#x}", block.offset.0);
        assert!(block.size >= MIN_BLOCK_SIZE, "block at {:#x} below the floor", block.offset.0);
        assert_eq!((block.size - HEADER_SIZE) % ALIGNMENT, 0);
        expected_start = block.end();
        total += block.size;
    }
    assert_eq!(total, heap.heap_ptr());
    assert_eq!(total, heap.size());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(len: usize) -> Vec<u8> {
        vec![0u8; len]
    }

    #[test]
    fn test_init_creates_single_free_block() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        assert!(heap.init(1024).is_ok());

        let blocks: Vec<BlockInfo> = heap.blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].offset, BlockOffset(0));
        assert_eq!(blocks[0].size, 1024);
        assert!(blocks[0].free);
        assert_chain_invariants(&heap);
    }

    #[test]
    fn test_double_init_is_rejected() {
        let mut bytes = arena(2048);
        let mut heap = Heap::new(&mut bytes);
        heap.init(1024).unwrap();
        let first = heap.allocate(64).unwrap();
        let before = heap.stats();

        assert_eq!(heap.init(2048), Err(HeapError::AlreadyInitialized));
        assert_eq!(heap.size(), 1024);
        assert_eq!(heap.stats(), before);
        assert!(heap.payload(first).is_some());
    }

    #[test]
    fn test_init_rejects_bad_sizes() {
        let mut bytes = arena(512);
        let mut heap = Heap::new(&mut bytes);
        assert_eq!(heap.init(0), Err(HeapError::InvalidSize));
        assert_eq!(heap.init(513), Err(HeapError::InvalidSize));
        assert_eq!(heap.init(HEADER_SIZE - 1), Err(HeapError::InvalidSize));
        assert!(!heap.is_initialized());
        assert!(heap.init(512).is_ok());
    }

    #[test]
    fn test_init_rounds_unaligned_size_down() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        heap.init(1001).unwrap();
        assert_eq!(heap.size(), 1000);
        assert_chain_invariants(&heap);

        heap.allocate(64).unwrap();
        heap.allocate(100).unwrap();
        assert_chain_invariants(&heap);
        assert_eq!(heap.stats().total_allocated + heap.stats().total_free, 1000);
    }

    #[test]
    fn test_use_before_init() {
        let mut bytes = arena(256);
        let mut heap = Heap::new(&mut bytes);
        assert_eq!(heap.allocate(8), Err(HeapError::NotInitialized));
        assert_eq!(heap.free(HeapPtr::from_offset(HEADER_SIZE)), Err(HeapError::NotInitialized));
        assert_eq!(heap.stats(), HeapStats::default());
    }

    #[test]
    fn test_allocate_splits_first_fit() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        heap.init(1024).unwrap();

        let ptr = heap.allocate(10).unwrap();
        assert_eq!(ptr.offset(), HEADER_SIZE);

        let blocks: Vec<BlockInfo> = heap.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].size, 16 + HEADER_SIZE);
        assert!(!blocks[0].free);
        assert_eq!(blocks[1].size, 1024 - 16 - HEADER_SIZE);
        assert!(blocks[1].free);
        assert_chain_invariants(&heap);
    }

    #[test]
    fn test_small_remainder_is_not_split() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        // 64 + header, plus a remainder one byte short of a split
        let size = 64 + HEADER_SIZE + 2 * HEADER_SIZE - 8;
        heap.init(size).unwrap();

        heap.allocate(64).unwrap();
        let blocks: Vec<BlockInfo> = heap.blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].size, size);
        assert!(!blocks[0].free);
    }

    #[test]
    fn test_zero_sized_allocation() {
        let mut bytes = arena(256);
        let mut heap = Heap::new(&mut bytes);
        heap.init(256).unwrap();
        let ptr = heap.allocate(0).unwrap();
        assert_eq!(heap.payload(ptr).map(|p| p.len()), Some(0));
        assert_chain_invariants(&heap);
        assert!(heap.free(ptr).is_ok());
    }

    #[test]
    fn test_capacity_invariant_holds_through_churn() {
        let mut bytes = arena(4096);
        let mut heap = Heap::new(&mut bytes);
        heap.init(4096).unwrap();

        let mut live = Vec::new();
        for (i, size) in [24usize, 1, 300, 64, 7, 128, 512, 33].iter().enumerate() {
            live.push(heap.allocate(*size).unwrap());
            assert_chain_invariants(&heap);
            if i % 3 == 2 {
                let victim = live.remove(0);
                heap.free(victim).unwrap();
                assert_chain_invariants(&heap);
            }
        }
        while let Some(ptr) = live.pop() {
            heap.free(ptr).unwrap();
            assert_chain_invariants(&heap);
        }

        let stats = heap.stats();
        assert_eq!(stats.block_count, 1);
        assert_eq!(stats.total_free, 4096);
        assert_eq!(stats.total_allocated, 0);
    }

    #[test]
    fn test_out_of_memory() {
        let mut bytes = arena(256);
        let mut heap = Heap::new(&mut bytes);
        heap.init(256).unwrap();
        let before = heap.stats();

        assert_eq!(heap.allocate(256), Err(HeapError::OutOfMemory));
        assert_eq!(heap.allocate(usize::MAX), Err(HeapError::OutOfMemory));
        assert_eq!(heap.stats(), before);
        assert!(heap.allocate(256 - HEADER_SIZE).is_ok());
    }

    #[test]
    fn test_reuse_after_free() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        heap.init(1024).unwrap();

        let first = heap.allocate(64).unwrap();
        heap.free(first).unwrap();
        let second = heap.allocate(64).unwrap();
        assert_eq!(first, second);
        assert_eq!(heap.stats().block_count, 2);
    }

    #[test]
    fn test_scenario_64_128_free_64() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        heap.init(1024).unwrap();

        let first = heap.allocate(64).unwrap();
        let second = heap.allocate(128).unwrap();
        // Disjoint payload regions
        assert!(first.offset() + 64 <= second.offset() - HEADER_SIZE);

        heap.free(first).unwrap();
        let again = heap.allocate(64).unwrap();
        assert_eq!(again, first);
        assert_chain_invariants(&heap);
    }

    #[test]
    fn test_double_free_is_rejected() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        heap.init(1024).unwrap();

        let a = heap.allocate(32).unwrap();
        let _b = heap.allocate(32).unwrap();
        heap.free(a).unwrap();
        let after_first: Vec<BlockInfo> = heap.blocks().collect();

        assert_eq!(heap.free(a), Err(HeapError::DoubleFree));
        let after_second: Vec<BlockInfo> = heap.blocks().collect();
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_free_rejects_foreign_pointers() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        heap.init(512).unwrap();
        let a = heap.allocate(64).unwrap();

        assert_eq!(heap.free(HeapPtr::from_offset(0)), Err(HeapError::InvalidPointer));
        assert_eq!(heap.free(HeapPtr::from_offset(512)), Err(HeapError::InvalidPointer));
        assert_eq!(heap.free(HeapPtr::from_offset(900)), Err(HeapError::InvalidPointer));
        // Inside a payload, not at its start
        assert_eq!(
            heap.free(HeapPtr::from_offset(a.offset() + 8)),
            Err(HeapError::InvalidPointer)
        );
        assert!(heap.payload(a).is_some());
    }

    fn three_used_blocks(heap: &mut Heap) -> (HeapPtr, HeapPtr, HeapPtr) {
        heap.init(3 * (64 + HEADER_SIZE)).unwrap();
        let a = heap.allocate(64).unwrap();
        let b = heap.allocate(64).unwrap();
        let c = heap.allocate(64).unwrap();
        assert!(heap.blocks().all(|block| !block.free));
        (a, b, c)
    }

    #[test]
    fn test_coalesce_forward() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        let (a, b, _guard) = three_used_blocks(&mut heap);

        heap.free(b).unwrap();
        heap.free(a).unwrap();

        let blocks: Vec<BlockInfo> = heap.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].free);
        assert_eq!(blocks[0].offset.0, a.offset() - HEADER_SIZE);
        assert_eq!(blocks[0].size, 2 * (64 + HEADER_SIZE));
        assert!(!blocks[1].free);
        assert_chain_invariants(&heap);

        // The reclaimed header is usable payload
        let merged = heap.allocate(2 * 64 + HEADER_SIZE).unwrap();
        assert_eq!(merged, a);
    }

    #[test]
    fn test_coalesce_backward() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        let (a, b, _guard) = three_used_blocks(&mut heap);

        heap.free(a).unwrap();
        heap.free(b).unwrap();

        let blocks: Vec<BlockInfo> = heap.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].free);
        assert_eq!(blocks[0].size, 2 * (64 + HEADER_SIZE));
        assert!(!blocks[1].free);
        assert_chain_invariants(&heap);
    }

    #[test]
    fn test_coalesce_both_sides() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        let (a, b, c) = three_used_blocks(&mut heap);

        heap.free(a).unwrap();
        heap.free(c).unwrap();
        heap.free(b).unwrap();

        let stats = heap.stats();
        assert_eq!(stats.block_count, 1);
        assert_eq!(stats.max_free_block, 3 * (64 + HEADER_SIZE));
        assert_chain_invariants(&heap);
    }

    #[test]
    fn test_bump_path_extends_short_chain() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        heap.init(1024).unwrap();

        // A used chain ending short of the initialized size
        BlockHeader::new(512, None, false).write(heap.arena, BlockOffset(0));
        heap.heap_ptr = 512;

        let tail = heap.allocate(200).unwrap();
        assert_eq!(tail.offset(), 512 + HEADER_SIZE);
        assert_eq!(heap.heap_ptr(), 512 + 200 + HEADER_SIZE);

        let blocks: Vec<BlockInfo> = heap.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].offset, BlockOffset(512));
        assert_eq!(blocks[1].size, 200 + HEADER_SIZE);
        assert!(!blocks[1].free);

        assert_eq!(heap.allocate(512), Err(HeapError::OutOfMemory));
    }

    #[test]
    fn test_allocate_aligned() {
        let mut bytes = arena(4096);
        let mut heap = Heap::new(&mut bytes);
        heap.init(4096).unwrap();

        heap.allocate(8).unwrap();
        for alignment in [1usize, 8, 16, 64, 256] {
            let ptr = heap.allocate_aligned(100, alignment).unwrap();
            assert_eq!(ptr.offset() % alignment, 0);
            // The aligned window lies inside the backing block
            let owner = heap
                .blocks()
                .find(|b| b.offset.0 < ptr.offset() && ptr.offset() < b.end())
                .unwrap();
            assert!(!owner.free);
            assert!(ptr.offset() + 100 <= owner.end());
        }
        assert_chain_invariants(&heap);
    }

    #[test]
    fn test_allocate_aligned_rejects_bad_alignment() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        heap.init(1024).unwrap();
        let before = heap.stats();

        assert_eq!(heap.allocate_aligned(16, 0), Err(HeapError::InvalidAlignment));
        assert_eq!(heap.allocate_aligned(16, 24), Err(HeapError::InvalidAlignment));
        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn test_aligned_pointer_is_not_freeable() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        heap.init(1024).unwrap();
        let ptr = heap.allocate_aligned(32, 64).unwrap();
        assert_eq!(heap.free(ptr), Err(HeapError::InvalidPointer));
    }

    #[test]
    fn test_stats() {
        let mut bytes = arena(1024);
        let mut heap = Heap::new(&mut bytes);
        heap.init(1024).unwrap();
        let a = heap.allocate(64).unwrap();
        heap.allocate(128).unwrap();
        heap.free(a).unwrap();

        let stats = heap.stats();
        assert_eq!(stats.block_count, 3);
        assert_eq!(stats.total_allocated, 128 + HEADER_SIZE);
        assert_eq!(stats.total_free, 1024 - 128 - HEADER_SIZE);
        assert_eq!(stats.max_free_block, 1024 - 64 - 128 - 2 * HEADER_SIZE);
    }

    #[test]
    fn test_payload_access() {
        let mut bytes = arena(512);
        let mut heap = Heap::new(&mut bytes);
        heap.init(512).unwrap();
        let ptr = heap.allocate(16).unwrap();

        heap.payload_mut(ptr).unwrap().copy_from_slice(b"round-robin-task");
        assert_eq!(heap.payload(ptr).unwrap(), b"round-robin-task");

        heap.free(ptr).unwrap();
        assert!(heap.payload(ptr).is_none());
    }
}
