/// Native thread-state accessor of a supported architecture.
///
/// The set of architectures is closed and fixed at build time; the one for
/// the current target is [`ThreadStateFlavor::NATIVE`].
///
/// 受支持架构的原生线程状态访问器。架构集合在编译期固定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStateFlavor {
    /// `x86_THREAD_STATE64`
    X86_64,
    /// `ARM_THREAD_STATE64`
    Aarch64,
}

impl ThreadStateFlavor {
    /// Accessor for the build target, or `None` if the target has no fence path.
    pub const NATIVE: Option<Self> = if cfg!(target_arch = "x86_64") {
        Some(ThreadStateFlavor::X86_64)
    } else if cfg!(target_arch = "aarch64") {
        Some(ThreadStateFlavor::Aarch64)
    } else {
        None
    };

    /// Flavor constant passed to `thread_get_state` (from `<mach/thread_status.h>`).
    pub const fn flavor(self) -> i32 {
        match self {
            ThreadStateFlavor::X86_64 => 4,
            ThreadStateFlavor::Aarch64 => 6,
        }
    }

    /// State size in `natural_t` words, i.e. `x86_THREAD_STATE64_COUNT` / `ARM_THREAD_STATE64_COUNT`.
    pub const fn count(self) -> u32 {
        match self {
            // 21 u64 registers.
            ThreadStateFlavor::X86_64 => 42,
            // x0..x28, fp, lr, sp, pc as u64, then cpsr and padding as u32.
            ThreadStateFlavor::Aarch64 => 68,
        }
    }

    /// Largest [`count`](Self::count) of any flavor.
    pub const MAX_COUNT: usize = 68;
}

/// **Capability Probe**
///
/// Whether the interrupt-based heavy barrier is implementable on this CPU
/// architecture. Only x86_64 and AArch64 have one.
///
/// ---
///
/// **能力探测**
///
/// 基于处理器间中断的重型屏障是否可在当前 CPU 架构上实现。仅 x86_64 与 AArch64 支持。
#[inline]
pub const fn is_supported() -> bool {
    ThreadStateFlavor::NATIVE.is_some()
}
