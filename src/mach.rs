//! Mach implementation of the executor's kernel calls.

#![allow(non_camel_case_types)]

use std::ffi::c_void;
use std::mem;
use std::ptr;
use std::slice;
use std::sync::OnceLock;

use libc::{c_int, c_uint, size_t, uintptr_t};

use crate::error::{Error, KernReturn};
use crate::executor::{self, Kernel};
use crate::probe::ThreadStateFlavor;

type kern_return_t = c_int;
type mach_port_t = c_uint;
type thread_act_t = mach_port_t;
type natural_t = c_uint;
type mach_msg_type_number_t = natural_t;
type vm_address_t = usize;
type vm_size_t = usize;

const KERN_SUCCESS: kern_return_t = 0;
const KERN_NOT_SUPPORTED: kern_return_t = 46;

/// Number of pointer-sized register slots handed to the preferred accessor.
const REGISTER_SLOTS: usize = 128;

unsafe extern "C" {
    static mach_task_self_: mach_port_t;

    fn task_threads(
        target_task: mach_port_t,
        act_list: *mut *mut thread_act_t,
        act_list_cnt: *mut mach_msg_type_number_t,
    ) -> kern_return_t;

    fn thread_get_state(
        target_act: thread_act_t,
        flavor: c_int,
        old_state: *mut natural_t,
        old_state_cnt: *mut mach_msg_type_number_t,
    ) -> kern_return_t;

    fn mach_port_deallocate(task: mach_port_t, name: mach_port_t) -> kern_return_t;

    fn vm_deallocate(
        target_task: mach_port_t,
        address: vm_address_t,
        size: vm_size_t,
    ) -> kern_return_t;
}

/// `thread_get_register_pointer_values`, only present on macOS 10.14+ / iOS 12+.
type RegisterPointerValuesFn = unsafe extern "C" fn(
    thread: thread_act_t,
    sp: *mut uintptr_t,
    length: *mut size_t,
    values: *mut uintptr_t,
) -> kern_return_t;

/// Resolved once: the OS build cannot change under a running process.
/// 只解析一次：运行中的进程其系统版本不会改变。
static REGISTER_POINTER_VALUES: OnceLock<Option<RegisterPointerValuesFn>> = OnceLock::new();

fn resolve_register_pointer_values() -> Option<RegisterPointerValuesFn> {
    *REGISTER_POINTER_VALUES.get_or_init(|| {
        // SAFETY: `dlsym` with `RTLD_DEFAULT` and a NUL-terminated name has no other requirements.
        let sym = unsafe {
            libc::dlsym(
                libc::RTLD_DEFAULT,
                c"thread_get_register_pointer_values".as_ptr(),
            )
        };
        if sym.is_null() {
            log::debug!("thread_get_register_pointer_values unavailable, using thread_get_state");
            None
        } else {
            log::debug!("using thread_get_register_pointer_values for heavy barriers");
            // SAFETY: the symbol has exactly this C signature in `<mach/thread_act.h>`.
            Some(unsafe { mem::transmute::<*mut c_void, RegisterPointerValuesFn>(sym) })
        }
    })
}

#[inline]
fn check(kr: kern_return_t) -> Result<(), KernReturn> {
    if kr == KERN_SUCCESS { Ok(()) } else { Err(kr) }
}

/// Thread array allocated by `task_threads` in our address space.
pub(crate) struct MachThreadList {
    acts: *mut thread_act_t,
    count: mach_msg_type_number_t,
}

/// The current task, seen through the Mach thread APIs.
pub(crate) struct MachKernel {
    task: mach_port_t,
    register_pointer_values: Option<RegisterPointerValuesFn>,
}

impl MachKernel {
    pub(crate) fn current() -> Self {
        Self {
            // SAFETY: `mach_task_self_` is initialised by libSystem before any user code runs.
            task: unsafe { mach_task_self_ },
            register_pointer_values: resolve_register_pointer_values(),
        }
    }
}

impl Kernel for MachKernel {
    type Thread = thread_act_t;
    type List = MachThreadList;

    fn task_threads(&self) -> Result<MachThreadList, KernReturn> {
        let mut acts: *mut thread_act_t = ptr::null_mut();
        let mut count: mach_msg_type_number_t = 0;
        // SAFETY: both out-pointers are valid for writes.
        check(unsafe { task_threads(self.task, &mut acts, &mut count) })?;
        Ok(MachThreadList { acts, count })
    }

    fn threads<'l>(&self, list: &'l MachThreadList) -> &'l [thread_act_t] {
        if list.acts.is_null() || list.count == 0 {
            return &[];
        }
        // SAFETY: `task_threads` returned `count` initialised entries at `acts`,
        // which stay mapped until `release_list`.
        unsafe { slice::from_raw_parts(list.acts, list.count as usize) }
    }

    fn has_register_pointer_values(&self) -> bool {
        self.register_pointer_values.is_some()
    }

    fn register_pointer_values(&self, thread: thread_act_t) -> Result<(), KernReturn> {
        let Some(get_values) = self.register_pointer_values else {
            // Strategy selection never picks this path without the symbol.
            return Err(KERN_NOT_SUPPORTED);
        };
        let mut sp: uintptr_t = 0;
        let mut length: size_t = REGISTER_SLOTS;
        let mut values = [0 as uintptr_t; REGISTER_SLOTS];
        // SAFETY: `values` holds `length` slots and every out-pointer is valid.
        check(unsafe { get_values(thread, &mut sp, &mut length, values.as_mut_ptr()) })
    }

    fn thread_state(&self, thread: thread_act_t, flavor: ThreadStateFlavor) -> Result<(), KernReturn> {
        let mut state = [0 as natural_t; ThreadStateFlavor::MAX_COUNT];
        let mut count: mach_msg_type_number_t = flavor.count();
        // SAFETY: `state` holds at least `count` words for this flavor.
        check(unsafe { thread_get_state(thread, flavor.flavor(), state.as_mut_ptr(), &mut count) })
    }

    fn release_thread(&self, thread: thread_act_t) -> Result<(), KernReturn> {
        // SAFETY: `thread` is a send right obtained from `task_threads` and released once.
        check(unsafe { mach_port_deallocate(self.task, thread) })
    }

    fn release_list(&self, list: MachThreadList) -> Result<(), KernReturn> {
        if list.acts.is_null() {
            return Ok(());
        }
        let size = list.count as usize * mem::size_of::<thread_act_t>();
        // SAFETY: the region was allocated by `task_threads` and is freed once.
        check(unsafe { vm_deallocate(self.task, list.acts as vm_address_t, size) })
    }
}

/// Runs the heavy barrier over every thread of the current process.
pub(crate) fn flush_process_write_buffers() -> Result<(), Error> {
    executor::flush(&MachKernel::current(), ThreadStateFlavor::NATIVE)
}
