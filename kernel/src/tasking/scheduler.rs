//! # The Scheduler
//!
//! Round-robin over the task list in creation order. Each tick walks forward
//! from the current task's successor to the first READY task and falls back
//! to the idle task when the walk runs off the end of the list. The idle
//! task heads the list, so falling back also wraps the rotation around.
//!
//! The outgoing task is demoted from RUNNING to READY once the incoming task
//! is known, so exactly one task is RUNNING after every tick and every READY
//! task is revisited. A descriptor that can no longer be read ends the walk
//! like the end of the list does.

use super::idle::idle_task;
use super::stack::TaskStack;
use super::task::{TaskDescriptor, TASK_DESCRIPTOR_SIZE};
use super::{TaskEntry, TaskError, TaskHandle, TaskId, TaskState};
use crate::config::{INITIAL_FLAGS, TASK_STACK_SIZE};
use crate::memory::{Heap, HeapPtr};
use crate::platform::Platform;

/// The outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSwitch {
    pub outgoing: TaskId,
    pub incoming: TaskId,
}

pub struct Scheduler {
    /// The idle descriptor, `None` until `init`
    idle: Option<TaskDescriptor>,
    current: Option<TaskHandle>,
    next_id: u64,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            idle: None,
            current: None,
            next_id: 1,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.idle.is_some()
    }

    /// Create the idle task and make it current
    pub fn init(&mut self, heap: &mut Heap) -> Result<TaskId, TaskError> {
        if self.idle.is_some() {
            return Err(TaskError::AlreadyInitialized);
        }

        let (stack, stack_pointer) = Self::new_stack(heap, idle_task)?;
        let idle = TaskDescriptor::new(self.allocate_id(), idle_task as usize, stack, stack_pointer);
        let id = idle.id;

        self.idle = Some(idle);
        self.current = Some(TaskHandle::Idle);
        Ok(id)
    }

    /// Create a READY task and append it to the list
    ///
    /// Either the task is fully linked in or every block it took is
    /// released again and its id stays unused.
    pub fn create_task(&mut self, heap: &mut Heap, entry: TaskEntry) -> Result<TaskId, TaskError> {
        if self.idle.is_none() {
            return Err(TaskError::NotInitialized);
        }

        let slot = heap
            .allocate(TASK_DESCRIPTOR_SIZE)
            .map_err(|_| TaskError::DescriptorAllocationFailed)?;

        let (stack, stack_pointer) = match Self::new_stack(heap, entry) {
            Ok(stack) => stack,
            Err(err) => {
                release(heap, slot);
                return Err(err);
            }
        };

        let task = TaskDescriptor::new(TaskId(self.next_id), entry as usize, stack, stack_pointer);
        if let Err(err) = self.append(heap, slot, &task) {
            release(heap, stack.base());
            release(heap, slot);
            return Err(err);
        }

        self.allocate_id();
        Ok(task.id)
    }

    /// Rotate to the next READY task, or to idle
    ///
    /// The walk stops at a lost link and falls back to idle. A lost current
    /// descriptor hands the CPU to idle and reports the loss.
    pub fn tick<P: Platform>(&mut self, heap: &mut Heap, platform: &mut P) -> Result<TaskSwitch, TaskError> {
        let outgoing_handle = self.current.ok_or(TaskError::NoTasks)?;
        let registers = platform.capture_registers();

        let mut outgoing = match self.load(heap, outgoing_handle) {
            Ok(task) => task,
            Err(err) => {
                self.switch_to(heap, platform, TaskHandle::Idle)?;
                return Err(err);
            }
        };

        let mut selected = TaskHandle::Idle;
        let mut cursor = outgoing.next;
        while let Some(ptr) = cursor {
            let Ok(candidate) = self.load(heap, TaskHandle::Heap(ptr)) else {
                break;
            };
            if candidate.state == TaskState::Ready {
                selected = TaskHandle::Heap(ptr);
                break;
            }
            cursor = candidate.next;
        }

        outgoing.registers = registers;
        if outgoing.state == TaskState::Running {
            outgoing.state = TaskState::Ready;
        }
        self.store(heap, outgoing_handle, &outgoing)?;
        let incoming = self.switch_to(heap, platform, selected)?;

        Ok(TaskSwitch {
            outgoing: outgoing.id,
            incoming: incoming.id,
        })
    }

    /// Id of the current task
    pub fn current_task(&self, heap: &Heap) -> Option<TaskId> {
        let handle = self.current?;
        self.load(heap, handle).ok().map(|task| task.id)
    }

    pub fn current_handle(&self) -> Option<TaskHandle> {
        self.current
    }

    pub fn idle_id(&self) -> Option<TaskId> {
        self.idle.map(|idle| idle.id)
    }

    /// Look a task up by id
    pub fn task(&self, heap: &Heap, id: TaskId) -> Result<TaskDescriptor, TaskError> {
        self.find(heap, id).map(|(_, task)| task)
    }

    /// Move a non-idle task between READY, WAITING and TERMINATED
    ///
    /// RUNNING is only ever entered and left through a tick, so the current
    /// task cannot be changed here. TERMINATED is final.
    pub fn set_state(&mut self, heap: &mut Heap, id: TaskId, state: TaskState) -> Result<(), TaskError> {
        let (handle, mut task) = self.find(heap, id)?;
        if handle == TaskHandle::Idle
            || Some(handle) == self.current
            || state == TaskState::Running
            || task.state == TaskState::Terminated
        {
            return Err(TaskError::InvalidTransition);
        }

        task.state = state;
        self.store(heap, handle, &task)
    }

    /// Whether `ptr` is a descriptor slot or a stack base of a listed task
    pub fn owns(&self, heap: &Heap, ptr: HeapPtr) -> bool {
        let Some(idle) = self.idle else {
            return false;
        };
        if idle.stack.base() == ptr {
            return true;
        }

        let mut cursor = idle.next;
        while let Some(slot) = cursor {
            if slot == ptr {
                return true;
            }
            match self.load(heap, TaskHandle::Heap(slot)) {
                Ok(task) if task.stack.base() == ptr => return true,
                Ok(task) => cursor = task.next,
                Err(_) => return false,
            }
        }
        false
    }

    /// Iterate descriptors in list order, idle first
    pub fn tasks<'s>(&'s self, heap: &'s Heap<'_>) -> Tasks<'s> {
        Tasks {
            scheduler: self,
            heap,
            cursor: self.idle.map(|_| TaskHandle::Idle),
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        id
    }

    fn new_stack(heap: &mut Heap, entry: TaskEntry) -> Result<(TaskStack, usize), TaskError> {
        let stack = TaskStack::allocate(heap, TASK_STACK_SIZE)
            .map_err(|_| TaskError::StackAllocationFailed)?;
        match stack.seed(heap, entry as usize, INITIAL_FLAGS) {
            Some(stack_pointer) => Ok((stack, stack_pointer)),
            None => {
                release(heap, stack.base());
                Err(TaskError::StackAllocationFailed)
            }
        }
    }

    /// Make `handle` the RUNNING current task and load its registers
    fn switch_to<P: Platform>(
        &mut self,
        heap: &mut Heap,
        platform: &mut P,
        handle: TaskHandle,
    ) -> Result<TaskDescriptor, TaskError> {
        let mut incoming = self.load(heap, handle)?;
        incoming.state = TaskState::Running;
        self.store(heap, handle, &incoming)?;
        self.current = Some(handle);
        platform.restore_registers(&incoming.registers);
        Ok(incoming)
    }

    fn append(&mut self, heap: &mut Heap, slot: HeapPtr, task: &TaskDescriptor) -> Result<(), TaskError> {
        let tail = self.tail(heap)?;
        let mut last = self.load(heap, tail)?;
        self.store(heap, TaskHandle::Heap(slot), task)?;
        last.next = Some(slot);
        self.store(heap, tail, &last)
    }

    fn load(&self, heap: &Heap, handle: TaskHandle) -> Result<TaskDescriptor, TaskError> {
        match handle {
            TaskHandle::Idle => self.idle.ok_or(TaskError::NotInitialized),
            TaskHandle::Heap(ptr) => heap
                .payload(ptr)
                .and_then(TaskDescriptor::read)
                .ok_or(TaskError::DescriptorLost),
        }
    }

    fn store(&mut self, heap: &mut Heap, handle: TaskHandle, task: &TaskDescriptor) -> Result<(), TaskError> {
        match handle {
            TaskHandle::Idle => {
                self.idle = Some(*task);
                Ok(())
            }
            TaskHandle::Heap(ptr) => {
                let bytes = heap.payload_mut(ptr).ok_or(TaskError::DescriptorLost)?;
                if task.write(bytes) {
                    Ok(())
                } else {
                    Err(TaskError::DescriptorLost)
                }
            }
        }
    }

    fn tail(&self, heap: &Heap) -> Result<TaskHandle, TaskError> {
        let mut handle = TaskHandle::Idle;
        let mut task = self.load(heap, handle)?;
        while let Some(next) = task.next {
            handle = TaskHandle::Heap(next);
            task = self.load(heap, handle)?;
        }
        Ok(handle)
    }

    fn find(&self, heap: &Heap, id: TaskId) -> Result<(TaskHandle, TaskDescriptor), TaskError> {
        let mut handle = TaskHandle::Idle;
        let mut task = self.load(heap, handle)?;
        loop {
            if task.id == id {
                return Ok((handle, task));
            }
            let next = task.next.ok_or(TaskError::TaskNotFound)?;
            handle = TaskHandle::Heap(next);
            task = self.load(heap, handle)?;
        }
    }
}

/// Give back a block the scheduler took but never linked in
fn release(heap: &mut Heap, ptr: HeapPtr) {
    let released = heap.free(ptr);
    debug_assert!(released.is_ok(), "unlinked task block {:#x} not freeable", ptr.offset());
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the task list
pub struct Tasks<'s> {
    scheduler: &'s Scheduler,
    heap: &'s Heap<'s>,
    cursor: Option<TaskHandle>,
}

impl Iterator for Tasks<'_> {
    type Item = TaskDescriptor;

    fn next(&mut self) -> Option<TaskDescriptor> {
        let handle = self.cursor.take()?;
        let task = self.scheduler.load(self.heap, handle).ok()?;
        self.cursor = task.next.map(TaskHandle::Heap);
        Some(task)
    }
}
