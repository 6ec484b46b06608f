//! # Task stacks
//!
//! Every task owns one fixed-size stack carved from the kernel heap. A fresh
//! stack is seeded with a synthetic frame so that a restore-to-stack
//! sequence would begin executing the task's entry point:
//!
//! ```text
//! top - 1 word   entry point address
//! top - 2 words  initial flags
//! top - 3 words  dummy return address   <- seeded stack pointer
//! ```
//!
//! Stack pointers are arena offsets, like every other heap handle.

use core::mem::size_of;

use crate::memory::{Heap, HeapError, HeapPtr};

/// Bytes in one stack slot
pub const WORD: usize = size_of::<usize>();

/// Words pushed by [`TaskStack::seed`]
pub const INITIAL_FRAME_WORDS: usize = 3;

/// A task's stack allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStack {
    base: HeapPtr,
    size: usize,
}

impl TaskStack {
    /// Allocate a stack of `size` bytes from the heap
    pub fn allocate(heap: &mut Heap, size: usize) -> Result<Self, HeapError> {
        let base = heap.allocate(size)?;
        Ok(Self { base, size })
    }

    /// Rebuild a stack record from a stored descriptor
    pub(crate) fn from_parts(base: HeapPtr, size: usize) -> Self {
        Self { base, size }
    }

    /// The heap handle of the lowest stack byte
    pub fn base(&self) -> HeapPtr {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// One past the highest stack byte (arena offset)
    pub fn top(&self) -> usize {
        self.base.offset() + self.size
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.base.offset() && offset < self.top()
    }

    /// Write the initial frame and return the seeded stack pointer
    ///
    /// Returns `None` if the stack's block is no longer a live allocation or
    /// too small for the frame.
    pub fn seed(&self, heap: &mut Heap, entry: usize, flags: usize) -> Option<usize> {
        let frame = INITIAL_FRAME_WORDS * WORD;
        if self.size < frame {
            return None;
        }

        let bytes = heap.payload_mut(self.base)?.get_mut(..self.size)?;
        let mut slot = self.size;
        for word in [entry, flags, 0] {
            slot -= WORD;
            bytes[slot..slot + WORD].copy_from_slice(&word.to_le_bytes());
        }

        Some(self.top() - frame)
    }

    /// Read the word stored at arena offset `at` inside this stack
    pub fn word_at(&self, heap: &Heap, at: usize) -> Option<usize> {
        if !self.contains(at) || at + WORD > self.top() {
            return None;
        }
        let bytes = heap.payload(self.base)?;
        let start = at - self.base.offset();
        let mut word = [0u8; WORD];
        word.copy_from_slice(bytes.get(start..start + WORD)?);
        Some(usize::from_le_bytes(word))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{INITIAL_FLAGS, TASK_STACK_SIZE};

    #[test]
    fn test_seeded_frame() {
        let mut bytes = vec![0u8; 4096];
        let mut heap = Heap::new(&mut bytes);
        heap.init(4096).unwrap();

        let stack = TaskStack::allocate(&mut heap, TASK_STACK_SIZE).unwrap();
        let sp = stack.seed(&mut heap, 0xC0DE, INITIAL_FLAGS).unwrap();

        assert_eq!(sp, stack.top() - 3 * WORD);
        assert_eq!(stack.word_at(&heap, sp), Some(0));
        assert_eq!(stack.word_at(&heap, sp + WORD), Some(INITIAL_FLAGS));
        assert_eq!(stack.word_at(&heap, sp + 2 * WORD), Some(0xC0DE));
        assert_eq!(stack.word_at(&heap, stack.top()), None);
    }

    #[test]
    fn test_stack_bounds() {
        let mut bytes = vec![0u8; 2048];
        let mut heap = Heap::new(&mut bytes);
        heap.init(2048).unwrap();

        let stack = TaskStack::allocate(&mut heap, TASK_STACK_SIZE).unwrap();
        assert_eq!(stack.size(), TASK_STACK_SIZE);
        assert!(stack.contains(stack.base().offset()));
        assert!(stack.contains(stack.top() - 1));
        assert!(!stack.contains(stack.top()));
    }

    #[test]
    fn test_stack_exhaustion() {
        let mut bytes = vec![0u8; 512];
        let mut heap = Heap::new(&mut bytes);
        heap.init(512).unwrap();
        assert_eq!(
            TaskStack::allocate(&mut heap, TASK_STACK_SIZE),
            Err(HeapError::OutOfMemory)
        );
    }

    #[test]
    fn test_seed_freed_stack() {
        let mut bytes = vec![0u8; 2048];
        let mut heap = Heap::new(&mut bytes);
        heap.init(2048).unwrap();

        let stack = TaskStack::allocate(&mut heap, 64).unwrap();
        heap.free(stack.base()).unwrap();
        assert_eq!(stack.seed(&mut heap, 1, 2), None);
    }
}
