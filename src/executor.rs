//! Barrier executor.
//!
//! Walks every thread of the current task and asks the kernel for its
//! registers. To answer, the kernel interrupts the CPU running that thread
//! (IPI), which drains its store buffer: once the walk finishes, every thread
//! that existed at enumeration time has passed a full hardware fence.
//!
//! Threads created after enumeration are not covered by that call.
//!
//! ---
//!
//! 遍历当前任务的所有线程并向内核请求其寄存器。内核为此会中断运行该线程的 CPU (IPI)，
//! 从而清空其存储缓冲区。枚举之后创建的线程不在本次调用的覆盖范围内。

use crate::error::{Error, KernReturn};
use crate::probe::ThreadStateFlavor;

/// Kernel calls the executor is built on.
///
/// The Mach implementation lives in `crate::mach`; tests substitute a counting mock.
pub(crate) trait Kernel {
    /// Per-thread handle (a send right on Mach).
    type Thread: Copy;
    /// Thread list returned by an enumeration, owned by the caller until released.
    type List;

    /// Snapshots the threads of the current task.
    fn task_threads(&self) -> Result<Self::List, KernReturn>;

    /// Handles contained in `list`, in enumeration order.
    fn threads<'l>(&self, list: &'l Self::List) -> &'l [Self::Thread];

    /// Whether the preferred accessor (`thread_get_register_pointer_values`) exists on this OS build.
    fn has_register_pointer_values(&self) -> bool;

    /// Reads the register pointer values of `thread`.
    fn register_pointer_values(&self, thread: Self::Thread) -> Result<(), KernReturn>;

    /// Reads the full register state of `thread` with the given accessor.
    fn thread_state(&self, thread: Self::Thread, flavor: ThreadStateFlavor)
    -> Result<(), KernReturn>;

    /// Drops one reference to the handle of `thread`.
    fn release_thread(&self, thread: Self::Thread) -> Result<(), KernReturn>;

    /// Frees the memory backing `list`.
    fn release_list(&self, list: Self::List) -> Result<(), KernReturn>;
}

/// How a single thread is forced through a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// `thread_get_register_pointer_values` (macOS 10.14+, iOS 12+).
    RegisterPointerValues,
    /// `thread_get_state` with the native flavor, for older OS builds.
    ThreadState(ThreadStateFlavor),
}

impl Strategy {
    /// Picks the fence path for this invocation.
    ///
    /// Fails before any kernel resource is touched when `native` is `None`.
    pub(crate) fn select<K: Kernel>(
        kernel: &K,
        native: Option<ThreadStateFlavor>,
    ) -> Result<Self, Error> {
        let flavor = native.ok_or(Error::ArchitectureUnsupported)?;
        if kernel.has_register_pointer_values() {
            Ok(Strategy::RegisterPointerValues)
        } else {
            Ok(Strategy::ThreadState(flavor))
        }
    }

    #[inline]
    fn fence<K: Kernel>(self, kernel: &K, thread: K::Thread) -> Result<(), KernReturn> {
        match self {
            Strategy::RegisterPointerValues => kernel.register_pointer_values(thread),
            Strategy::ThreadState(flavor) => kernel.thread_state(thread, flavor),
        }
    }
}

/// Scoped ownership of an enumerated thread list.
///
/// Handles before `released` have been given back to the kernel. Dropping the
/// guard early releases the rest and the list itself.
struct ThreadList<'k, K: Kernel> {
    kernel: &'k K,
    list: Option<K::List>,
    released: usize,
}

impl<'k, K: Kernel> ThreadList<'k, K> {
    fn new(kernel: &'k K, list: K::List) -> Self {
        Self {
            kernel,
            list: Some(list),
            released: 0,
        }
    }

    /// Next handle not yet released.
    fn pending(&self) -> Option<K::Thread> {
        let list = self.list.as_ref()?;
        self.kernel.threads(list).get(self.released).copied()
    }

    /// Frees the list on the success path, reporting the outcome.
    fn finish(mut self) -> Result<(), Error> {
        match self.list.take() {
            Some(list) => self
                .kernel
                .release_list(list)
                .map_err(Error::ListDeallocationFailed),
            None => Ok(()),
        }
    }
}

impl<K: Kernel> Drop for ThreadList<'_, K> {
    fn drop(&mut self) {
        let Some(list) = self.list.take() else {
            return;
        };

        // Early abort: an error is already on its way to the caller, so
        // failures here have nowhere better to go.
        for &thread in &self.kernel.threads(&list)[self.released..] {
            let _ = self.kernel.release_thread(thread);
        }
        let _ = self.kernel.release_list(list);
    }
}

/// Runs one heavy barrier against `kernel`.
///
/// All-or-nothing: the first failing kernel call aborts the walk. Every handle
/// and the list are released on every exit path (except a handle whose own
/// release failed).
pub(crate) fn flush<K: Kernel>(kernel: &K, native: Option<ThreadStateFlavor>) -> Result<(), Error> {
    let strategy = Strategy::select(kernel, native)?;

    let list = kernel.task_threads().map_err(Error::EnumerationFailed)?;
    let mut threads = ThreadList::new(kernel, list);

    while let Some(thread) = threads.pending() {
        let fenced = strategy.fence(kernel, thread);
        let released = kernel.release_thread(thread);
        // A failed release is not retried: the right may already be gone.
        threads.released += 1;

        fenced.map_err(Error::PerThreadFenceFailed)?;
        released.map_err(Error::HandleReleaseFailed)?;
    }

    threads.finish()
}
