//! Compile-time kernel configuration
//!
//! Sizes and seed values shared by the heap and the scheduler, plus the
//! boot-time knobs the entry point hands to [`crate::boot::kernel_main`].

/// Physical capacity of the heap arena (1 MiB)
pub const HEAP_CAPACITY: usize = 0x100000;

/// Payload alignment unit of the heap
pub const ALIGNMENT: usize = 8;

/// Size of every task stack, idle included
pub const TASK_STACK_SIZE: usize = 1024;

/// Flags word seeded into a fresh task's initial stack frame
pub const INITIAL_FLAGS: usize = 0x10;

/// Boot-time configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Bytes of the arena handed to the heap (must not exceed `HEAP_CAPACITY`)
    pub heap_size: usize,
    /// Number of demo tasks created after the idle task
    pub demo_tasks: usize,
    /// Number of scheduler ticks to drive, `None` for forever
    pub ticks: Option<usize>,
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            heap_size: HEAP_CAPACITY,
            demo_tasks: 3,
            ticks: None,
        }
    }

    /// Same configuration with a bounded tick loop
    pub const fn with_ticks(mut self, ticks: usize) -> Self {
        self.ticks = Some(ticks);
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.heap_size, HEAP_CAPACITY);
        assert_eq!(config.demo_tasks, 3);
        assert_eq!(config.ticks, None);
        assert_eq!(config.with_ticks(8).ticks, Some(8));
    }

    #[test]
    fn test_alignment_is_power_of_two() {
        assert!(ALIGNMENT.is_power_of_two());
        assert_eq!(TASK_STACK_SIZE % ALIGNMENT, 0);
    }
}
