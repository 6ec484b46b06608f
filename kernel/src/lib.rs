//! # memeOS kernel core
//!
//! A freestanding heap allocator and a cooperative round-robin scheduler
//! that allocates its task stacks from that heap.
//!
//! - [`memory`]: first-fit block chain with splitting and coalescing
//! - [`tasking`]: task descriptors, stack seeding and the tick
//! - [`kernel`]: the context object tying both to a [`Platform`]
//!
//! The core never touches hardware directly; everything machine-specific
//! sits behind [`platform::Platform`], implemented for bare-metal x86_64 in
//! [`arch`].

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod boot;
pub mod config;
pub mod interrupt_lock;
pub mod kernel;
pub mod memory;
pub mod platform;
pub mod tasking;

#[cfg(target_arch = "x86_64")]
pub mod drivers;
#[cfg(target_arch = "x86_64")]
pub mod vga_buffer;

pub use interrupt_lock::InterruptSafeLock;
pub use kernel::Kernel;
pub use memory::{Heap, HeapError, HeapPtr, HeapStats};
pub use platform::Platform;
pub use tasking::{Scheduler, TaskError, TaskId, TaskState};
