use kernel_macros::syscall_handler;

use crate::task::{Pid, Termination};
use crate::trap::RegisterState;

use super::{Disposition, Errno, SyscallContext, SyscallResult};

/// `waitpid` option: return 0 instead of blocking
pub const WNOHANG: usize = 1;

#[syscall_handler]
pub fn sys_yield(ctx: &SyscallContext<'_>) -> SyscallResult {
    ctx.process().scheduler().yield_now();
    Ok(0)
}

#[syscall_handler]
pub fn sys_getpid(ctx: &SyscallContext<'_>) -> SyscallResult {
    Ok(ctx.process().pid().into())
}

/// 0 once the parent is gone.
#[syscall_handler]
pub fn sys_getppid(ctx: &SyscallContext<'_>) -> SyscallResult {
    Ok(ctx.process().parent().map_or(0, |parent| parent.pid().into()))
}

/// Normally answered by the trap fast path.
#[syscall_handler]
pub fn sys_gettid(ctx: &SyscallContext<'_>) -> SyscallResult {
    Ok(ctx.thread().tid().into())
}

/// Terminates the whole process. Runs without the big lock.
pub fn sys_exit(ctx: &SyscallContext<'_>, status: i32) -> Disposition {
    log::debug!("process {} exit({})", ctx.process().pid(), status);
    ctx.process().terminate(Termination::Exited(status));
    ctx.thread().set_dying();
    Disposition::Dying
}

/// Terminates the calling thread; the last live thread takes the process
/// down with status 0. Runs without the big lock.
pub fn sys_exit_thread(ctx: &SyscallContext<'_>) -> Disposition {
    ctx.thread().set_dying();
    if ctx.process().live_threads() == 0 {
        ctx.process().terminate(Termination::Exited(0));
    }
    Disposition::Dying
}

/// Duplicates the process with the calling thread as its only thread. The
/// child resumes after the `ecall` with 0 in `a0`.
pub fn sys_fork(ctx: &SyscallContext<'_>, regs: &RegisterState) -> SyscallResult {
    let child = ctx.kernel().fork_process(ctx.process(), ctx.thread(), regs);
    Ok(child.pid().into())
}

/// Waits for child `pid` to terminate, reaps it and returns its wait status.
#[syscall_handler]
pub fn sys_waitpid(ctx: &SyscallContext<'_>, pid: usize, options: usize) -> SyscallResult {
    let pid = Pid::from_raw(pid);
    let child = ctx.process().find_child(pid).ok_or(Errno::ECHILD)?;

    if options & WNOHANG != 0 {
        if !child.is_reapable() {
            return Ok(0);
        }
    } else if ctx
        .block_until(ctx.process().child_events(), || child.is_reapable())
        .was_interrupted()
    {
        return Err(Errno::EINTR);
    }

    let termination = ctx.kernel().reap(pid).map_err(|_| Errno::ECHILD)?;
    Ok(termination.wait_status())
}
