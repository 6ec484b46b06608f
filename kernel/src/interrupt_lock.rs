//! # Interrupt-Safe Locking
//!
//! A spinlock that masks interrupts for as long as it is held. The kernel
//! context lives behind one of these on bare metal, which gives every heap
//! and scheduler operation the single coarse exclusion an interrupt-driven
//! caller needs.

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

pub struct InterruptSafeLock<T> {
    inner: Mutex<T>,
    /// Name reported when the lock is found contended
    debug_name: &'static str,
}

impl<T> InterruptSafeLock<T> {
    pub const fn new(data: T, debug_name: &'static str) -> Self {
        Self {
            inner: Mutex::new(data),
            debug_name,
        }
    }

    /// Acquire the lock, returning a guard that restores interrupt state on drop
    pub fn lock(&self) -> InterruptSafeLockGuard<'_, T> {
        let restore_interrupts = cpu::disable_interrupts();
        InterruptSafeLockGuard {
            guard: ManuallyDrop::new(self.inner.lock()),
            restore_interrupts,
        }
    }

    /// Acquire the lock only if nobody holds it
    pub fn try_lock(&self) -> Option<InterruptSafeLockGuard<'_, T>> {
        let restore_interrupts = cpu::disable_interrupts();
        match self.inner.try_lock() {
            Some(guard) => Some(InterruptSafeLockGuard {
                guard: ManuallyDrop::new(guard),
                restore_interrupts,
            }),
            None => {
                if restore_interrupts {
                    cpu::enable_interrupts();
                }
                None
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn debug_name(&self) -> &'static str {
        self.debug_name
    }
}

pub struct InterruptSafeLockGuard<'a, T> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
    restore_interrupts: bool,
}

impl<T> Drop for InterruptSafeLockGuard<'_, T> {
    fn drop(&mut self) {
        // Release before unmasking interrupts
        // SAFETY: the guard is dropped exactly once, here, and never used again
        unsafe { ManuallyDrop::drop(&mut self.guard) };

        if self.restore_interrupts {
            cpu::enable_interrupts();
        }
    }
}

impl<T> Deref for InterruptSafeLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for InterruptSafeLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod cpu {
    use x86_64::instructions::interrupts;

    /// Mask interrupts, returning whether they were enabled
    pub fn disable_interrupts() -> bool {
        let enabled = interrupts::are_enabled();
        interrupts::disable();
        enabled
    }

    pub fn enable_interrupts() {
        interrupts::enable();
    }
}

// Hosted builds run in user mode where interrupt flags are not ours to touch
#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod cpu {
    pub fn disable_interrupts() -> bool {
        false
    }

    pub fn enable_interrupts() {}
}
