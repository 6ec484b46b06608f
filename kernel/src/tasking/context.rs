//! # Register snapshots
//!
//! The state a tick preserves for a task: a fixed set of general purpose
//! registers and the stack pointer. There is no instruction pointer field,
//! see the module docs of [`crate::tasking`].

use crate::memory::{read_u64, write_u64};

/// Number of general purpose registers in a snapshot
///
/// In capture order: rax, rbx, rcx, rdx, rsi, rdi, rbp.
pub const GENERAL_REGISTERS: usize = 7;

/// Encoded size of a snapshot
pub(crate) const SNAPSHOT_SIZE: usize = (GENERAL_REGISTERS + 1) * 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub general: [usize; GENERAL_REGISTERS],
    pub stack_pointer: usize,
}

impl RegisterSnapshot {
    pub const fn empty() -> Self {
        Self {
            general: [0; GENERAL_REGISTERS],
            stack_pointer: 0,
        }
    }

    /// Snapshot of a task that has never run: zeroed registers on a seeded stack
    pub const fn initial(stack_pointer: usize) -> Self {
        Self {
            general: [0; GENERAL_REGISTERS],
            stack_pointer,
        }
    }

    pub(crate) fn encode(&self, bytes: &mut [u8]) {
        for (i, value) in self.general.iter().enumerate() {
            write_u64(bytes, i * 8, *value as u64);
        }
        write_u64(bytes, GENERAL_REGISTERS * 8, self.stack_pointer as u64);
    }

    pub(crate) fn decode(bytes: &[u8]) -> Self {
        let mut general = [0; GENERAL_REGISTERS];
        for (i, value) in general.iter_mut().enumerate() {
            *value = read_u64(bytes, i * 8) as usize;
        }
        Self {
            general,
            stack_pointer: read_u64(bytes, GENERAL_REGISTERS * 8) as usize,
        }
    }
}
