//! # Platform - what the kernel core needs from the machine
//!
//! The heap and scheduler never touch hardware. Diagnostics, register
//! snapshots and the final halt all go through one [`Platform`]
//! implementation: the bare-metal one in `arch`, a stdout one in the hosted
//! binary, and a recording one for tests.

use core::fmt;

use crate::tasking::RegisterSnapshot;

#[cfg(test)]
pub mod mock;

pub trait Platform {
    /// Emit diagnostic text
    fn write_text(&mut self, text: &str);

    /// Read the general purpose registers and the stack pointer
    fn capture_registers(&mut self) -> RegisterSnapshot;

    /// Load a snapshot back into the execution context
    fn restore_registers(&mut self, snapshot: &RegisterSnapshot);

    /// Stop the execution context permanently
    fn halt(&mut self) -> !;
}

/// `core::fmt` adapter over a platform's text sink
pub struct KernelWriter<'p, P: Platform + ?Sized> {
    platform: &'p mut P,
}

impl<'p, P: Platform + ?Sized> KernelWriter<'p, P> {
    pub fn new(platform: &'p mut P) -> Self {
        Self { platform }
    }
}

impl<P: Platform + ?Sized> fmt::Write for KernelWriter<'_, P> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.platform.write_text(s);
        Ok(())
    }
}

/// Format a line to a platform
#[macro_export]
macro_rules! kprintln {
    ($platform:expr) => {
        $crate::platform::Platform::write_text($platform, "\n")
    };
    ($platform:expr, $($arg:tt)*) => {{
        use core::fmt::Write as _;
        let _ = writeln!($crate::platform::KernelWriter::new($platform), $($arg)*);
    }};
}

/// Format text to a platform, no newline
#[macro_export]
macro_rules! kprint {
    ($platform:expr, $($arg:tt)*) => {{
        use core::fmt::Write as _;
        let _ = write!($crate::platform::KernelWriter::new($platform), $($arg)*);
    }};
}
