//! # Boot sequence
//!
//! Heap, heap self-test, scheduler, demo tasks, then the tick loop. The
//! same sequence runs on bare metal and in the hosted binary; only the
//! platform and the tick bound differ.

use crate::config::KernelConfig;
use crate::kernel::Kernel;
use crate::kprintln;
use crate::platform::Platform;

/// Bring the kernel up and drive the scheduler
///
/// Returns after `config.ticks` ticks, or never when unbounded.
pub fn kernel_main<P: Platform>(kernel: &mut Kernel<'_, P>, config: &KernelConfig) {
    let _ = kernel.init_heap(config.heap_size);
    heap_self_test(kernel);
    kernel.report_memory_stats();

    let _ = kernel.init_scheduler();
    for _ in 0..config.demo_tasks {
        if kernel.create_task(demo_task).is_err() {
            break;
        }
    }
    kernel.report_memory_stats();

    match config.ticks {
        Some(ticks) => {
            for _ in 0..ticks {
                let _ = kernel.tick();
            }
            kernel.dump_tasks();
            kernel.dump_heap();
        }
        None => loop {
            let _ = kernel.tick();
        },
    }
}

/// Allocate 64 and 128 bytes, free the first, allocate 64 again
///
/// Returns whether the re-allocation reused the first block. Everything the
/// test allocated is released again before returning.
pub fn heap_self_test<P: Platform>(kernel: &mut Kernel<'_, P>) -> bool {
    kprintln!(kernel.platform_mut(), "Testing heap allocation...");

    let first = kernel.allocate(64);
    announce(kernel, first.is_ok(), "Allocated 64 bytes");
    let second = kernel.allocate(128);
    announce(kernel, second.is_ok(), "Allocated 128 bytes");

    if let Ok(ptr) = first {
        if kernel.free(ptr).is_ok() {
            kprintln!(kernel.platform_mut(), "Freed 64 bytes");
        }
    }

    let again = kernel.allocate(64);
    announce(kernel, again.is_ok(), "Re-allocated 64 bytes");

    let reused = matches!((first, again), (Ok(a), Ok(b)) if a == b);
    if again.is_ok() {
        let verdict = if reused { "reused" } else { "NOT reused" };
        kprintln!(kernel.platform_mut(), "First block {}", verdict);
    }

    for ptr in [again, second].into_iter().flatten() {
        let _ = kernel.free(ptr);
    }
    reused
}

fn announce<P: Platform>(kernel: &mut Kernel<'_, P>, ok: bool, what: &str) {
    if ok {
        kprintln!(kernel.platform_mut(), "{}", what);
    } else {
        kprintln!(kernel.platform_mut(), "Allocation failed");
    }
}

/// Body of the demo tasks the boot sequence creates
fn demo_task() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
