//! # The kernel context
//!
//! One object owning the heap, the scheduler and the platform. Every
//! operation is forwarded to the subsystem, its failure is reported on the
//! platform's text sink, and the `Result` is handed back to the caller.
//!
//! The single fatal path is the idle task: without room for its stack the
//! scheduler has nothing to fall back to, so the context panics and halts.

use core::fmt;

use crate::kprintln;
use crate::memory::{Heap, HeapError, HeapPtr, HeapStats};
use crate::platform::Platform;
use crate::tasking::{Scheduler, TaskEntry, TaskError, TaskId, TaskState, TaskSwitch};

pub struct Kernel<'a, P: Platform> {
    heap: Heap<'a>,
    scheduler: Scheduler,
    platform: P,
}

impl<'a, P: Platform> Kernel<'a, P> {
    /// Build a context over `arena`; nothing is initialized yet
    pub fn new(arena: &'a mut [u8], platform: P) -> Self {
        Self {
            heap: Heap::new(arena),
            scheduler: Scheduler::new(),
            platform,
        }
    }

    pub fn heap(&self) -> &Heap<'a> {
        &self.heap
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    // --- Heap ---

    pub fn init_heap(&mut self, size: usize) -> Result<(), HeapError> {
        let result = self.heap.init(size);
        match result {
            Ok(()) => kprintln!(&mut self.platform, "Heap initialized successfully."),
            Err(err) => self.report(err),
        }
        result
    }

    pub fn allocate(&mut self, size: usize) -> Result<HeapPtr, HeapError> {
        let result = self.heap.allocate(size);
        self.check(result)
    }

    /// Free an allocation; task stacks and descriptors are refused
    pub fn free(&mut self, ptr: HeapPtr) -> Result<(), HeapError> {
        let result = if self.scheduler.owns(&self.heap, ptr) {
            Err(HeapError::OwnedByTask)
        } else {
            self.heap.free(ptr)
        };
        self.check(result)
    }

    pub fn allocate_aligned(&mut self, size: usize, alignment: usize) -> Result<HeapPtr, HeapError> {
        let result = self.heap.allocate_aligned(size, alignment);
        self.check(result)
    }

    /// Payload bytes of a live allocation
    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        self.heap.payload_mut(ptr)
    }

    /// Print the heap statistics and return them
    pub fn report_memory_stats(&mut self) -> HeapStats {
        let stats = self.heap.stats();
        let out = &mut self.platform;
        kprintln!(out, "Heap statistics:");
        kprintln!(out, "  allocated:          {} bytes", stats.total_allocated);
        kprintln!(out, "  free:               {} bytes", stats.total_free);
        kprintln!(out, "  largest free block: {} bytes", stats.max_free_block);
        kprintln!(out, "  blocks:             {}", stats.block_count);
        stats
    }

    /// Print every block in chain order, then the free/used totals
    pub fn dump_heap(&mut self) {
        let mut free = 0;
        let mut used = 0;

        kprintln!(&mut self.platform, "Heap blocks:");
        for block in self.heap.blocks() {
            let kind = if block.free { "free" } else { "used" };
            kprintln!(
                &mut self.platform,
                "  {:#010x}  {}  {} bytes",
                block.offset.0,
                kind,
                block.size
            );
            if block.free {
                free += block.size;
            } else {
                used += block.size;
            }
        }
        kprintln!(&mut self.platform, "  free space: {} bytes, used space: {} bytes", free, used);
    }

    // --- Tasks ---

    /// Create the idle task; halts if its stack cannot be allocated
    pub fn init_scheduler(&mut self) -> Result<TaskId, TaskError> {
        kprintln!(&mut self.platform, "Initializing multitasking...");
        match self.scheduler.init(&mut self.heap) {
            Ok(id) => {
                kprintln!(&mut self.platform, "Idle task created.");
                Ok(id)
            }
            Err(TaskError::StackAllocationFailed) => {
                self.panic(format_args!("Failed to allocate stack for idle task."))
            }
            Err(err) => {
                self.report(err);
                Err(err)
            }
        }
    }

    pub fn create_task(&mut self, entry: TaskEntry) -> Result<TaskId, TaskError> {
        let result = self.scheduler.create_task(&mut self.heap, entry);
        if result.is_ok() {
            kprintln!(&mut self.platform, "New task created.");
        }
        self.check(result)
    }

    /// Run one scheduling decision
    pub fn tick(&mut self) -> Result<TaskSwitch, TaskError> {
        match self.scheduler.tick(&mut self.heap, &mut self.platform) {
            Ok(switch) => {
                #[cfg(feature = "trace-scheduler")]
                kprintln!(
                    &mut self.platform,
                    "[sched] task {} -> task {}",
                    switch.outgoing,
                    switch.incoming
                );
                Ok(switch)
            }
            Err(TaskError::NoTasks) => {
                kprintln!(&mut self.platform, "{}", TaskError::NoTasks);
                Err(TaskError::NoTasks)
            }
            Err(err) => {
                self.report(err);
                Err(err)
            }
        }
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.scheduler.current_task(&self.heap)
    }

    pub fn set_task_state(&mut self, id: TaskId, state: TaskState) -> Result<(), TaskError> {
        let result = self.scheduler.set_state(&mut self.heap, id, state);
        self.check(result)
    }

    /// Print one line per task in list order
    pub fn dump_tasks(&mut self) {
        kprintln!(&mut self.platform, "Tasks:");
        for task in self.scheduler.tasks(&self.heap) {
            kprintln!(
                &mut self.platform,
                "  task {:>3}  {:<10}  stack {:#010x}  sp {:#010x}",
                task.id,
                task.state,
                task.stack.base().offset(),
                task.registers.stack_pointer
            );
        }
    }

    /// Report a fatal condition and stop for good
    pub fn panic(&mut self, msg: fmt::Arguments) -> ! {
        kprintln!(&mut self.platform, "Kernel Panic: {}", msg);
        self.platform.halt()
    }

    fn check<T, E: fmt::Display + Copy>(&mut self, result: Result<T, E>) -> Result<T, E> {
        if let Err(err) = &result {
            self.report(*err);
        }
        result
    }

    fn report<E: fmt::Display>(&mut self, err: E) {
        kprintln!(&mut self.platform, "Error: {}", err);
    }
}
