/// Raw Mach kernel return code (`kern_return_t`).
/// Mach 内核返回码 (`kern_return_t`)。
pub type KernReturn = i32;

/// Failure of a single [`flush_process_write_buffers`](crate::flush_process_write_buffers) call.
///
/// Every variant means the barrier is **not** guaranteed to have happened.
/// There is no partial success: retry the whole call, fall back to another
/// barrier, or abort.
///
/// ---
///
/// 单次屏障调用的失败。任何变体都意味着屏障**未必**已经发生，不存在部分成功。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The kernel rejected the thread-listing request.
    #[error("failed to enumerate the threads of the current task (kern_return_t {0})")]
    EnumerationFailed(KernReturn),

    /// No thread-state accessor exists for this CPU architecture.
    /// Calling the executor here is a caller bug: check [`is_supported`](crate::is_supported) first.
    #[error("no fence path exists for this architecture")]
    ArchitectureUnsupported,

    /// Inspecting the registers of one thread failed.
    #[error("register inspection of a thread failed (kern_return_t {0})")]
    PerThreadFenceFailed(KernReturn),

    /// A thread port right could not be released.
    #[error("failed to release a thread port right (kern_return_t {0})")]
    HandleReleaseFailed(KernReturn),

    /// The thread list returned by the enumeration could not be freed.
    #[error("failed to deallocate the thread list (kern_return_t {0})")]
    ListDeallocationFailed(KernReturn),
}

impl Error {
    /// Numeric status code of this failure. Success is `0`; every failure is negative.
    ///
    /// 数值状态码。成功为 `0`，所有失败均为负数。
    pub const fn status(&self) -> i32 {
        match self {
            Error::EnumerationFailed(_) => -1,
            Error::ArchitectureUnsupported => -2,
            Error::PerThreadFenceFailed(_) => -3,
            Error::HandleReleaseFailed(_) => -4,
            Error::ListDeallocationFailed(_) => -5,
        }
    }

    /// Whether retrying the whole call can succeed.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Error::ArchitectureUnsupported)
    }

    /// The kernel return code behind this failure, if a kernel call produced it.
    pub const fn kern_return(&self) -> Option<KernReturn> {
        match *self {
            Error::EnumerationFailed(kr)
            | Error::PerThreadFenceFailed(kr)
            | Error::HandleReleaseFailed(kr)
            | Error::ListDeallocationFailed(kr) => Some(kr),
            Error::ArchitectureUnsupported => None,
        }
    }
}
