use cfg_if::cfg_if;

// ============================================================================
// 1. Loom Simulation Implementation
// 1. Loom 模拟实现
// ============================================================================
cfg_if! {
    if #[cfg(feature = "loom")] {
        #[inline]
        pub(crate) fn heavy_barrier_impl() {
            // Loom cannot simulate IPIs, so both sides fall back to SeqCst fences
            // to give the model a Happens-Before edge.
            //
            // Loom 无法模拟 IPI，两端都退化为 SeqCst fence 以建立 Happens-Before 关系。
            loom::sync::atomic::fence(loom::sync::atomic::Ordering::SeqCst);
        }

        #[inline]
        pub(crate) fn light_barrier_impl() {
            loom::sync::atomic::fence(loom::sync::atomic::Ordering::SeqCst);
        }

        #[inline]
        pub(crate) fn is_accelerated_impl() -> bool {
            false
        }
    }

// ============================================================================
// 2. Apple Real Implementation (Mach register inspection)
// 2. Apple 真实实现 (Mach 寄存器读取)
// ============================================================================
    else if #[cfg(all(
        any(target_os = "macos", target_os = "ios"),
        any(target_arch = "x86_64", target_arch = "aarch64"),
    ))] {
        use std::sync::atomic::{compiler_fence, Ordering};

        /// Total attempts before a failing heavy barrier panics.
        const HEAVY_BARRIER_ATTEMPTS: usize = 3;

        #[inline]
        pub(crate) fn heavy_barrier_impl() {
            let mut attempt = 1;
            loop {
                match crate::mach::flush_process_write_buffers() {
                    Ok(()) => break,
                    Err(err) if err.is_retryable() && attempt < HEAVY_BARRIER_ATTEMPTS => {
                        log::warn!("heavy barrier attempt {attempt} failed: {err}; retrying");
                        attempt += 1;
                    }
                    // Readers only issue compiler fences here, so a silent
                    // fallback to `fence(SeqCst)` would not order anything.
                    //
                    // 读端只有编译器屏障，静默回退到 `fence(SeqCst)` 无法保证顺序。
                    Err(err) => panic!("heavy barrier failed: {err}"),
                }
            }
            // Prevent compiler reordering locally
            // 防止本地编译器重排
            compiler_fence(Ordering::SeqCst);
        }

        #[inline]
        pub(crate) fn light_barrier_impl() {
            // Every heavy barrier forces a hardware fence on this thread remotely.
            // 每次重型屏障都会远程强制本线程执行硬件屏障。
            compiler_fence(Ordering::SeqCst);
        }

        #[inline]
        pub(crate) fn is_accelerated_impl() -> bool {
            true
        }
    }

// ============================================================================
// 3. Other Platforms / Fallback
// 3. 其他平台 / Fallback
// ============================================================================
    else {
        use std::sync::atomic::{fence, Ordering};

        #[inline]
        pub(crate) fn heavy_barrier_impl() {
            fence(Ordering::SeqCst);
        }

        #[inline]
        pub(crate) fn light_barrier_impl() {
            // No OS acceleration, both Reader and Writer must use heavy barriers.
            // 没有 OS 加速，读写两端都必须是重屏障
            fence(Ordering::SeqCst);
        }

        #[inline]
        pub(crate) fn is_accelerated_impl() -> bool {
            false
        }
    }
}
