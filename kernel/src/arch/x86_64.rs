//! # Bare-metal x86_64 platform
//!
//! Console text goes to the VGA buffer and is mirrored to COM1. Register
//! capture reads the live general purpose registers and stack pointer.
//! Restore only records the snapshot: loading a foreign stack pointer
//! without its instruction pointer would return into nowhere, so switching
//! stays logical.

use core::arch::asm;

use ::x86_64::instructions::{hlt, interrupts};

use crate::drivers::serial;
use crate::platform::Platform;
use crate::tasking::RegisterSnapshot;
use crate::vga_buffer::WRITER;

pub struct BareMetal {
    last_restored: Option<RegisterSnapshot>,
}

impl BareMetal {
    pub const fn new() -> Self {
        Self { last_restored: None }
    }

    /// The snapshot the last tick handed over
    pub fn last_restored(&self) -> Option<&RegisterSnapshot> {
        self.last_restored.as_ref()
    }
}

impl Default for BareMetal {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for BareMetal {
    fn write_text(&mut self, text: &str) {
        WRITER.lock().write_string(text);
        serial::write_str(text);
    }

    fn capture_registers(&mut self) -> RegisterSnapshot {
        let mut snapshot = RegisterSnapshot::empty();
        let general = snapshot.general.as_mut_ptr();
        let stack_pointer: usize;

        // SAFETY: `general` points at seven writable usize slots. It is held
        // in r8, outside the captured set, so no stored value is clobbered.
        unsafe {
            asm!(
                "mov [r8], rax",
                "mov [r8 + 8], rbx",
                "mov [r8 + 16], rcx",
                "mov [r8 + 24], rdx",
                "mov [r8 + 32], rsi",
                "mov [r8 + 40], rdi",
                "mov [r8 + 48], rbp",
                in("r8") general,
                options(nostack, preserves_flags),
            );
            asm!("mov {}, rsp", out(reg) stack_pointer, options(nomem, nostack, preserves_flags));
        }

        snapshot.stack_pointer = stack_pointer;
        snapshot
    }

    fn restore_registers(&mut self, snapshot: &RegisterSnapshot) {
        self.last_restored = Some(*snapshot);
    }

    fn halt(&mut self) -> ! {
        interrupts::disable();
        loop {
            hlt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_reads_live_stack_pointer() {
        let mut platform = BareMetal::new();
        let marker = 0u64;
        let snapshot = platform.capture_registers();

        let here = &marker as *const u64 as usize;
        assert_ne!(snapshot.stack_pointer, 0);
        assert!(snapshot.stack_pointer.abs_diff(here) < 64 * 1024);
    }

    #[test]
    fn test_restore_is_recorded() {
        let mut platform = BareMetal::new();
        assert!(platform.last_restored().is_none());

        let mut snapshot = RegisterSnapshot::empty();
        snapshot.stack_pointer = 0x4b8;
        platform.restore_registers(&snapshot);
        assert_eq!(platform.last_restored(), Some(&snapshot));
    }
}
