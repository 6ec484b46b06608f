//! # memeOS entry point
//!
//! Freestanding (`target_os = "none"`): `_start` brings up the consoles and
//! runs the boot sequence forever on a static 1 MiB arena. The loader must
//! enter in 64-bit mode with the VGA text buffer identity-mapped.
//!
//! Hosted: the same boot sequence against stdout for a bounded number of
//! ticks, `memeos-kernel [TICKS]`.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod bare_metal {
    use core::panic::PanicInfo;

    use memeos_kernel::arch::x86_64::BareMetal;
    use memeos_kernel::config::{KernelConfig, HEAP_CAPACITY};
    use memeos_kernel::{boot, drivers, println, serial_println, vga_buffer};
    use memeos_kernel::{InterruptSafeLock, Kernel, Platform};
    use spin::Once;

    #[repr(C, align(4096))]
    struct Arena([u8; HEAP_CAPACITY]);

    static mut ARENA: Arena = Arena([0; HEAP_CAPACITY]);

    static KERNEL: Once<InterruptSafeLock<Kernel<'static, BareMetal>>> = Once::new();

    #[no_mangle]
    pub extern "C" fn _start() -> ! {
        // SAFETY: first thing on the boot CPU, before anything else uses COM1
        unsafe { drivers::serial::init() };
        vga_buffer::WRITER.lock().clear_screen();

        let kernel = KERNEL.call_once(|| {
            // SAFETY: `call_once` runs this exactly once, so this is the only
            // reference to the arena ever created
            let arena = unsafe { &mut (*core::ptr::addr_of_mut!(ARENA)).0 };
            InterruptSafeLock::new(Kernel::new(arena, BareMetal::new()), "KERNEL")
        });

        boot::kernel_main(&mut kernel.lock(), &KernelConfig::new());

        // Only reached with a bounded tick count
        BareMetal::new().halt()
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        println!("{}", info);
        serial_println!("{}", info);
        BareMetal::new().halt()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    use std::io::Write;

    use memeos_kernel::boot;
    use memeos_kernel::config::{KernelConfig, HEAP_CAPACITY};
    use memeos_kernel::tasking::RegisterSnapshot;
    use memeos_kernel::{Kernel, Platform};

    const DEFAULT_TICKS: usize = 8;

    /// Stdout console with a simulated register file
    struct HostPlatform {
        registers: RegisterSnapshot,
    }

    impl Platform for HostPlatform {
        fn write_text(&mut self, text: &str) {
            let _ = std::io::stdout().write_all(text.as_bytes());
        }

        fn capture_registers(&mut self) -> RegisterSnapshot {
            self.registers
        }

        fn restore_registers(&mut self, snapshot: &RegisterSnapshot) {
            self.registers = *snapshot;
        }

        fn halt(&mut self) -> ! {
            let _ = std::io::stdout().flush();
            std::process::exit(1)
        }
    }

    let ticks = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_TICKS);

    let mut arena = vec![0u8; HEAP_CAPACITY];
    let platform = HostPlatform {
        registers: RegisterSnapshot::empty(),
    };
    let mut kernel = Kernel::new(&mut arena, platform);
    boot::kernel_main(&mut kernel, &KernelConfig::new().with_ticks(ticks));
}
