//! In-band block headers
//!
//! Header layout (24 bytes, little-endian words):
//! ```text
//! +0   size   total bytes of the block, header included
//! +8   next   offset of the next block in the chain, u64::MAX for none
//! +16  flags  BlockFlags
//! ```

use super::{read_u64, write_u64};

/// Bytes occupied by a block header
pub const HEADER_SIZE: usize = 24;

/// No block is ever smaller than its own header
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE;

const SIZE_FIELD: usize = 0;
const NEXT_FIELD: usize = 8;
const FLAGS_FIELD: usize = 16;

/// Encoded "end of chain"
const NO_NEXT: u64 = u64::MAX;

bitflags::bitflags! {
    /// State bits stored in a block header
    pub struct BlockFlags: u64 {
        const FREE = 0b0001;
    }
}

/// Offset of a block header from the start of the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockOffset(pub usize);

impl BlockOffset {
    /// Offset of the first payload byte
    pub fn payload(self) -> usize {
        self.0 + HEADER_SIZE
    }
}

/// Decoded block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub size: usize,
    pub next: Option<BlockOffset>,
    pub flags: BlockFlags,
}

impl BlockHeader {
    pub fn new(size: usize, next: Option<BlockOffset>, free: bool) -> Self {
        let flags = if free { BlockFlags::FREE } else { BlockFlags::empty() };
        Self { size, next, flags }
    }

    pub fn is_free(&self) -> bool {
        self.flags.contains(BlockFlags::FREE)
    }

    pub fn set_free(&mut self, free: bool) {
        self.flags.set(BlockFlags::FREE, free);
    }

    /// Decode the header stored at `at`
    ///
    /// `at + HEADER_SIZE` must lie inside `arena`.
    pub fn read(arena: &[u8], at: BlockOffset) -> Self {
        let base = at.0;
        let next = match read_u64(arena, base + NEXT_FIELD) {
            NO_NEXT => None,
            offset => Some(BlockOffset(offset as usize)),
        };

        Self {
            size: read_u64(arena, base + SIZE_FIELD) as usize,
            next,
            flags: BlockFlags::from_bits_truncate(read_u64(arena, base + FLAGS_FIELD)),
        }
    }

    /// Encode this header at `at`
    pub fn write(&self, arena: &mut [u8], at: BlockOffset) {
        let base = at.0;
        let next = self.next.map_or(NO_NEXT, |n| n.0 as u64);
        write_u64(arena, base + SIZE_FIELD, self.size as u64);
        write_u64(arena, base + NEXT_FIELD, next);
        write_u64(arena, base + FLAGS_FIELD, self.flags.bits());
    }
}

/// Read-only view of one block, as yielded by [`super::Heap::blocks`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub offset: BlockOffset,
    pub size: usize,
    pub free: bool,
}

impl BlockInfo {
    /// One past the last byte of the block
    pub fn end(&self) -> usize {
        self.offset.0 + self.size
    }
}
