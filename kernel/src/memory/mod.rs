//! # Memory - the kernel heap
//!
//! A single fixed arena carved into a singly linked chain of blocks.
//! Every block starts with an in-band header (`block`), and the heap
//! (`heap`) serves first-fit allocation with splitting, immediate-neighbour
//! coalescing on free, aligned over-allocation and utilization statistics.
//!
//! Blocks and payloads are addressed by offsets into the arena, never by raw
//! pointers, so every header access is a bounds-checked slice operation.

pub mod block;
pub mod heap;

pub use block::{BlockFlags, BlockHeader, BlockInfo, BlockOffset, HEADER_SIZE, MIN_BLOCK_SIZE};
pub use heap::{Blocks, Heap, HeapPtr, HeapStats};

use core::fmt;

use crate::config::ALIGNMENT;

/// Round `size` up to the heap alignment unit
///
/// Returns `None` when the rounded value does not fit in a `usize`.
#[inline]
pub const fn align_up(size: usize) -> Option<usize> {
    match size.checked_add(ALIGNMENT - 1) {
        Some(n) => Some(n & !(ALIGNMENT - 1)),
        None => None,
    }
}

/// Read a little-endian 64-bit word at `at`
#[inline]
pub(crate) fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

/// Write a little-endian 64-bit word at `at`
#[inline]
pub(crate) fn write_u64(bytes: &mut [u8], at: usize, value: u64) {
    bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// Recoverable heap failures
///
/// None of these abort anything: the operation is a no-op and the caller
/// gets the error back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    AlreadyInitialized,
    InvalidSize,
    NotInitialized,
    InvalidPointer,
    DoubleFree,
    InvalidAlignment,
    OutOfMemory,
    /// The block is a task's stack or descriptor
    OwnedByTask,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            HeapError::AlreadyInitialized => "Heap initialized more than once.",
            HeapError::InvalidSize => "Invalid heap size specified.",
            HeapError::NotInitialized => "Heap used before initialization.",
            HeapError::InvalidPointer => "Invalid pointer passed to free.",
            HeapError::DoubleFree => "Double free detected.",
            HeapError::InvalidAlignment => "Alignment must be a power of 2.",
            HeapError::OutOfMemory => "Not enough memory for allocation.",
            HeapError::OwnedByTask => "Block belongs to a task.",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), Some(0));
        assert_eq!(align_up(1), Some(8));
        assert_eq!(align_up(8), Some(8));
        assert_eq!(align_up(9), Some(16));
        assert_eq!(align_up(1023), Some(1024));
        assert_eq!(align_up(usize::MAX), None);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", HeapError::DoubleFree), "Double free detected.");
        assert_eq!(format!("{}", HeapError::OutOfMemory), "Not enough memory for allocation.");
    }

    #[test]
    fn test_word_codec() {
        let mut bytes = [0u8; 16];
        write_u64(&mut bytes, 8, 0xDEAD_BEEF_0000_0001);
        assert_eq!(read_u64(&bytes, 8), 0xDEAD_BEEF_0000_0001);
        assert_eq!(read_u64(&bytes, 0), 0);
        assert_eq!(bytes[8], 0x01);
    }
}
