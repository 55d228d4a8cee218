//! Process-wide heavy memory barrier for Apple platforms.
//!
//! macOS and iOS have no `membarrier` syscall and no `FlushProcessWriteBuffers`.
//! This crate synthesizes one: it walks every thread of the process and asks
//! the Mach kernel for its registers, which interrupts the CPU running that
//! thread and drains its store buffer. No cooperation from the target threads
//! is needed.
//!
//! Paired with [`light_barrier`] on the reader side, [`heavy_barrier`] lets hot
//! paths get away with a compiler fence while the cold path pays for the IPI.
//!
//! ---
//!
//! Apple 平台上的进程级重型内存屏障。通过读取进程内每个线程的寄存器，
//! 迫使内核中断对应 CPU 并清空其存储缓冲区。

mod error;
mod probe;
mod sys;

#[cfg_attr(not(any(target_os = "macos", target_os = "ios")), allow(dead_code))]
mod executor;

#[cfg(any(target_os = "macos", target_os = "ios"))]
mod mach;

pub use error::{Error, KernReturn};
pub use probe::{ThreadStateFlavor, is_supported};

/// **Heavy Barrier**
///
/// Used for the cold path (Writer).
///
/// * **Best Case**: Forces every thread of the process through a hardware fence via Mach register inspection.
/// * **Fallback**: Degrades to `fence(Ordering::SeqCst)` on targets without an IPI path.
///
/// # Panics
///
/// On accelerated targets, if the barrier still fails after a few retries.
///
/// ---
///
/// **重型屏障 (Heavy Barrier)**
///
/// 用于冷路径（Writer）。
///
/// * **最佳情况**：通过 Mach 寄存器读取，强制进程内每个线程执行硬件屏障。
/// * **回退情况**：在没有 IPI 路径的目标上退化为 `fence(Ordering::SeqCst)`。
#[inline]
pub fn heavy_barrier() {
    sys::heavy_barrier_impl();
}

/// **Light Barrier**
///
/// Used for the hot path (Reader).
///
/// * **Best Case**: Generates only a `compiler_fence(SeqCst)`. Runtime overhead is practically zero.
/// * **Fallback**: If the heavy barrier is not accelerated, it must degrade to `fence(Ordering::SeqCst)` for safety.
///
/// ---
///
/// **轻型屏障 (Light Barrier)**
///
/// 用于热路径（Reader）。
///
/// * **最佳情况**：仅产生一个 `compiler_fence(SeqCst)`。运行时开销几乎为 0。
/// * **回退情况**：如果重型屏障没有加速，必须退化为 `fence(Ordering::SeqCst)` 以保证安全。
#[inline]
pub fn light_barrier() {
    sys::light_barrier_impl();
}

/// Returns whether [`heavy_barrier`] forces remote fences (so [`light_barrier`] is only a compiler fence).
/// 返回重型屏障是否使用 OS 加速。
#[inline]
pub fn is_accelerated() -> bool {
    sys::is_accelerated_impl()
}

/// **Barrier Executor**
///
/// Forces every thread of the calling process that is alive at call entry
/// through at least one full hardware fence before returning `Ok`.
///
/// Threads created while the call runs are not covered. Any `Err` means the
/// barrier is not guaranteed to have happened; retry the whole call.
///
/// Check [`is_supported`] first: on other architectures this returns
/// [`Error::ArchitectureUnsupported`] without touching any thread.
///
/// ---
///
/// **屏障执行器**
///
/// 返回 `Ok` 前，保证调用时存活的每个线程都至少执行过一次完整的硬件屏障。
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn flush_process_write_buffers() -> Result<(), Error> {
    mach::flush_process_write_buffers()
}
