//! Task descriptors and their heap encoding
//!
//! Layout (little-endian 64-bit words):
//! ```text
//! +0    id
//! +8    state
//! +16   next descriptor handle, u64::MAX for end of list
//! +24   entry point address
//! +32   stack base handle
//! +40   stack size
//! +48   register snapshot (7 general registers, then the stack pointer)
//! ```

use super::context::{RegisterSnapshot, SNAPSHOT_SIZE};
use super::stack::TaskStack;
use super::{TaskId, TaskState};
use crate::memory::{read_u64, write_u64, HeapPtr};

const ID_FIELD: usize = 0;
const STATE_FIELD: usize = 8;
const NEXT_FIELD: usize = 16;
const ENTRY_FIELD: usize = 24;
const STACK_BASE_FIELD: usize = 32;
const STACK_SIZE_FIELD: usize = 40;
const REGISTERS_FIELD: usize = 48;

/// Bytes allocated from the heap for one descriptor
pub const TASK_DESCRIPTOR_SIZE: usize = REGISTERS_FIELD + SNAPSHOT_SIZE;

const NO_TASK: u64 = u64::MAX;

/// One schedulable task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub id: TaskId,
    pub state: TaskState,
    /// Next descriptor in creation order
    pub next: Option<HeapPtr>,
    /// Entry point address, kept for inspection
    pub entry: usize,
    pub stack: TaskStack,
    /// Registers captured at the last tick that switched away from this task
    pub registers: RegisterSnapshot,
}

impl TaskDescriptor {
    pub fn new(id: TaskId, entry: usize, stack: TaskStack, stack_pointer: usize) -> Self {
        Self {
            id,
            state: TaskState::Ready,
            next: None,
            entry,
            stack,
            registers: RegisterSnapshot::initial(stack_pointer),
        }
    }

    /// Decode a descriptor, `None` if the bytes do not hold one
    pub fn read(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < TASK_DESCRIPTOR_SIZE {
            return None;
        }

        let state = TaskState::from_code(read_u64(bytes, STATE_FIELD))?;
        let next = match read_u64(bytes, NEXT_FIELD) {
            NO_TASK => None,
            offset => Some(HeapPtr::from_offset(offset as usize)),
        };
        let stack = TaskStack::from_parts(
            HeapPtr::from_offset(read_u64(bytes, STACK_BASE_FIELD) as usize),
            read_u64(bytes, STACK_SIZE_FIELD) as usize,
        );

        Some(Self {
            id: TaskId(read_u64(bytes, ID_FIELD)),
            state,
            next,
            entry: read_u64(bytes, ENTRY_FIELD) as usize,
            stack,
            registers: RegisterSnapshot::decode(&bytes[REGISTERS_FIELD..TASK_DESCRIPTOR_SIZE]),
        })
    }

    /// Encode into `bytes`; returns `false` if they are too short
    pub fn write(&self, bytes: &mut [u8]) -> bool {
        if bytes.len() < TASK_DESCRIPTOR_SIZE {
            return false;
        }

        let next = self.next.map_or(NO_TASK, |ptr| ptr.offset() as u64);
        write_u64(bytes, ID_FIELD, self.id.0);
        write_u64(bytes, STATE_FIELD, self.state.code());
        write_u64(bytes, NEXT_FIELD, next);
        write_u64(bytes, ENTRY_FIELD, self.entry as u64);
        write_u64(bytes, STACK_BASE_FIELD, self.stack.base().offset() as u64);
        write_u64(bytes, STACK_SIZE_FIELD, self.stack.size() as u64);
        self.registers.encode(&mut bytes[REGISTERS_FIELD..TASK_DESCRIPTOR_SIZE]);
        true
    }
}
