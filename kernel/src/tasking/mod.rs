//! # Tasking - the cooperative round-robin scheduler
//!
//! Tasks form a singly linked list headed by the idle task. Every other
//! descriptor, and every stack, lives in a heap block; the list links are
//! heap handles rather than addresses.
//!
//! ## Switching model
//! A tick snapshots the outgoing task's registers and hands the incoming
//! task's snapshot to the platform. The instruction pointer is not part of
//! the snapshot, so a tick rotates the logical "current task" without
//! transferring control. Tasks are still written as `fn() -> !` entry points
//! and their stacks are seeded so a real switch could resume them.

pub mod context;
pub mod idle;
pub mod scheduler;
pub mod stack;
pub mod task;

pub use context::{RegisterSnapshot, GENERAL_REGISTERS};
pub use scheduler::{Scheduler, TaskSwitch, Tasks};
pub use stack::TaskStack;
pub use task::{TaskDescriptor, TASK_DESCRIPTOR_SIZE};

use core::fmt;

use crate::memory::HeapPtr;

/// Entry point of a task
pub type TaskEntry = fn() -> !;

/// A unique, never reused task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The state of a task in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible for selection by the next tick
    Ready,
    /// The current task
    Running,
    /// Skipped by every tick until made ready again
    Waiting,
    /// Never selected again
    Terminated,
}

impl TaskState {
    pub(crate) const fn code(self) -> u64 {
        match self {
            TaskState::Ready => 0,
            TaskState::Running => 1,
            TaskState::Waiting => 2,
            TaskState::Terminated => 3,
        }
    }

    pub(crate) const fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(TaskState::Ready),
            1 => Some(TaskState::Running),
            2 => Some(TaskState::Waiting),
            3 => Some(TaskState::Terminated),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Ready => "READY",
            TaskState::Running => "RUNNING",
            TaskState::Waiting => "WAITING",
            TaskState::Terminated => "TERMINATED",
        };
        f.pad(name)
    }
}

/// Where a task descriptor lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskHandle {
    /// The idle descriptor, held by the scheduler itself
    Idle,
    /// A descriptor stored in a heap block
    Heap(HeapPtr),
}

/// Errors that can occur in the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    NotInitialized,
    AlreadyInitialized,
    DescriptorAllocationFailed,
    StackAllocationFailed,
    TaskNotFound,
    InvalidTransition,
    /// A descriptor handle no longer resolves to a decodable heap block
    DescriptorLost,
    NoTasks,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TaskError::NotInitialized => "Multitasking not initialized.",
            TaskError::AlreadyInitialized => "Multitasking initialized more than once.",
            TaskError::DescriptorAllocationFailed => "Failed to allocate memory for new task.",
            TaskError::StackAllocationFailed => "Failed to allocate stack for new task.",
            TaskError::TaskNotFound => "No such task.",
            TaskError::InvalidTransition => "Invalid task state transition.",
            TaskError::DescriptorLost => "Task descriptor lost.",
            TaskError::NoTasks => "No tasks to schedule.",
        };
        f.write_str(msg)
    }
}
