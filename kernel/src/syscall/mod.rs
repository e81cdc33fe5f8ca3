//! Syscall dispatch.
//!
//! [`dispatch`] runs one syscall on behalf of the trapping thread: `exit`
//! and `exit_thread` are handled before the process's big lock is taken,
//! everything else runs under it, `fork` and `sigreturn` with direct access
//! to the saved registers and the rest through the [`SYSCALL_TABLE`].
//!
//! Handlers are plain functions taking a [`SyscallContext`] and up to three
//! typed arguments; `#[syscall_handler]` generates the raw table entry.

pub mod error;
mod futex;
mod process;
pub mod registry;
mod signal;
pub mod syscall_num;

use core::cell::RefCell;

use alloc::sync::Arc;

use crate::kernel::Kernel;
use crate::sync::blocking::MutexGuard;
use crate::sync::wait_queue::WaitQueue;
use crate::task::{BlockResult, InterruptReason, Process, Thread};
use crate::trap::RegisterState;

pub use error::Errno;
pub use registry::{SyscallHandler, SyscallSlot, SyscallTable, SYSCALL_TABLE};
pub use syscall_num::Syscall;

pub type SyscallResult = Result<usize, Errno>;

pub fn init() {
    registry::init();
}

/// Conversion of a handler's return value into the signed ABI result.
pub trait IntoSyscallReturn {
    fn into_syscall_return(self) -> isize;
}

impl IntoSyscallReturn for isize {
    fn into_syscall_return(self) -> isize {
        self
    }
}

impl IntoSyscallReturn for usize {
    fn into_syscall_return(self) -> isize {
        self as isize
    }
}

impl IntoSyscallReturn for i32 {
    fn into_syscall_return(self) -> isize {
        self as isize
    }
}

impl IntoSyscallReturn for u32 {
    fn into_syscall_return(self) -> isize {
        self as isize
    }
}

impl IntoSyscallReturn for () {
    fn into_syscall_return(self) -> isize {
        0
    }
}

impl<T: IntoSyscallReturn> IntoSyscallReturn for Result<T, Errno> {
    fn into_syscall_return(self) -> isize {
        match self {
            Ok(value) => value.into_syscall_return(),
            Err(errno) => errno.to_neg(),
        }
    }
}

/// Outcome of one dispatched syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Store the value in the result register
    Return(isize),
    /// The handler rewrote the registers, leave them untouched
    Redirected,
    /// The thread must not return to user space
    Dying,
}

/// What a handler sees of the world.
///
/// Owns the big-lock guard of the calling process while the handler runs so
/// that blocking helpers can drop it for the duration of a sleep.
pub struct SyscallContext<'a> {
    kernel: &'a Kernel,
    thread: &'a Arc<Thread>,
    process: &'a Arc<Process>,
    big_lock: RefCell<Option<MutexGuard<'a, ()>>>,
}

impl<'a> SyscallContext<'a> {
    pub fn new(kernel: &'a Kernel, thread: &'a Arc<Thread>, process: &'a Arc<Process>) -> Self {
        Self {
            kernel,
            thread,
            process,
            big_lock: RefCell::new(None),
        }
    }

    pub fn kernel(&self) -> &'a Kernel {
        self.kernel
    }

    pub fn thread(&self) -> &'a Arc<Thread> {
        self.thread
    }

    pub fn process(&self) -> &'a Arc<Process> {
        self.process
    }

    pub fn holds_big_lock(&self) -> bool {
        self.big_lock.borrow().is_some()
    }

    pub(crate) fn acquire_big_lock(&self) {
        debug_assert!(!self.holds_big_lock());
        let guard = self.process.big_lock().lock(self.thread);
        *self.big_lock.borrow_mut() = Some(guard);
    }

    pub(crate) fn release_big_lock(&self) {
        let guard = self.big_lock.borrow_mut().take();
        drop(guard);
    }

    fn reacquire_after(&self, result: BlockResult) -> BlockResult {
        // A dying thread unwinds without touching the lock again
        if result != BlockResult::Interrupted(InterruptReason::Death) {
            self.acquire_big_lock();
        }
        result
    }

    /// Sleeps on `queue` with the big lock dropped.
    ///
    /// The thread is queued before the lock is released, so a wake issued
    /// under the lock right after cannot be missed. After an interruption by
    /// death the lock is not taken again and the handler must return at once.
    pub fn block_on(&self, queue: &WaitQueue) -> BlockResult {
        queue.enqueue(self.thread);
        self.release_big_lock();
        let result = self.thread.suspend(queue, true);
        self.reacquire_after(result)
    }

    /// Sleeps on `queue` until `condition` holds, dropping the big lock while
    /// asleep.
    ///
    /// The condition is re-checked after enqueueing: it may be changed by
    /// threads that never take this process's big lock.
    pub fn block_until(&self, queue: &WaitQueue, mut condition: impl FnMut() -> bool) -> BlockResult {
        loop {
            if condition() {
                return BlockResult::Woken;
            }
            queue.enqueue(self.thread);
            if condition() {
                self.thread.cancel_wait(queue);
                return BlockResult::Woken;
            }
            self.release_big_lock();
            let result = self.thread.suspend(queue, true);
            match self.reacquire_after(result) {
                BlockResult::Woken => continue,
                interrupted => return interrupted,
            }
        }
    }
}

/// Dispatches the syscall described by `regs`.
///
/// The caller has validated the trap and advanced `sepc` past the `ecall`.
/// The big lock is held around every handler and is released before this
/// returns, on every path.
pub fn dispatch(ctx: &SyscallContext<'_>, regs: &mut RegisterState) -> Disposition {
    let function = regs.syscall_number();
    let [arg1, arg2, arg3] = regs.syscall_args();
    log::debug!(
        "thread {}: syscall {} ({:#x}, {:#x}, {:#x})",
        ctx.thread().tid(),
        function,
        arg1,
        arg2,
        arg3
    );

    let syscall = Syscall::from_repr(function);
    match syscall {
        Some(Syscall::Exit) => return process::sys_exit(ctx, arg1 as i32),
        Some(Syscall::ExitThread) => return process::sys_exit_thread(ctx),
        _ => {}
    }

    ctx.acquire_big_lock();
    let disposition = match syscall {
        Some(Syscall::Fork) => Disposition::Return(process::sys_fork(ctx, regs).into_syscall_return()),
        Some(Syscall::Sigreturn) => signal::sys_sigreturn(ctx, regs),
        _ => Disposition::Return(
            ctx.kernel()
                .syscall_table()
                .invoke(ctx, function, arg1, arg2, arg3),
        ),
    };
    ctx.release_big_lock();

    disposition
}
