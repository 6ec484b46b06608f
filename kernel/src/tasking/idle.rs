//! # The idle task
//!
//! The fallback every tick can select when no other task is ready. It owns
//! a stack like any task but its descriptor is held by the scheduler and it
//! never leaves the READY/RUNNING pair.

/// Idle entry point: wait for the next event, forever
pub fn idle_task() -> ! {
    loop {
        wait_for_event();
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
fn wait_for_event() {
    x86_64::instructions::hlt();
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
fn wait_for_event() {
    core::hint::spin_loop();
}
