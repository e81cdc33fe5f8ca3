use kernel_macros::syscall_handler;

use crate::task::{Pid, Signal, SignalAction, SignalSet};
use crate::trap::RegisterState;

use super::{Disposition, Errno, SyscallContext, SyscallResult};

pub const SIG_BLOCK: usize = 0;
pub const SIG_UNBLOCK: usize = 1;
pub const SIG_SETMASK: usize = 2;

/// Sends `signal` to process `pid`. Signal 0 only checks that `pid` exists.
#[syscall_handler]
pub fn sys_kill(ctx: &SyscallContext<'_>, pid: usize, signal: u32) -> SyscallResult {
    let pid = Pid::from_raw(pid);
    if signal == 0 {
        return ctx.kernel().process(pid).map(|_| 0).ok_or(Errno::ESRCH);
    }
    let signal = Signal::try_from(signal)?;
    ctx.kernel().kill(pid, signal)?;
    Ok(0)
}

/// Updates the calling thread's blocked set, returning the previous one.
#[syscall_handler]
pub fn sys_sigprocmask(ctx: &SyscallContext<'_>, how: usize, set: u32) -> SyscallResult {
    let thread = ctx.thread();
    let set = SignalSet::from_bits_truncate(set);
    let old = thread.signal_mask();
    let new = match how {
        SIG_BLOCK => old.union(set),
        SIG_UNBLOCK => old.difference(set),
        SIG_SETMASK => set,
        _ => return Err(Errno::EINVAL),
    };
    thread.set_signal_mask(new);
    Ok(old.bits() as usize)
}

/// Installs a disposition for `signal` and returns the previous handler word.
///
/// `handler` is `SIG_DFL` (0), `SIG_IGN` (1) or a user address; the handler
/// returns through `restorer`.
#[syscall_handler]
pub fn sys_sigaction(
    ctx: &SyscallContext<'_>,
    signal: u32,
    handler: usize,
    restorer: usize,
) -> SyscallResult {
    let signal = Signal::try_from(signal)?;
    let old = ctx
        .process()
        .set_signal_action(signal, SignalAction::from_user(handler, restorer))?;
    Ok(old.to_user())
}

/// Returns from a signal handler to the context it interrupted.
pub fn sys_sigreturn(ctx: &SyscallContext<'_>, regs: &mut RegisterState) -> Disposition {
    let thread = ctx.thread();
    match thread.pop_signal_frame() {
        Some(frame) => {
            *regs = frame.regs;
            thread.set_signal_mask(frame.mask);
            log::trace!("thread {}: sigreturn to {:#x}", thread.tid(), regs.ip());
            Disposition::Redirected
        }
        None => {
            log::warn!("thread {}: sigreturn without a signal frame", thread.tid());
            Disposition::Return(Errno::EINVAL.to_neg())
        }
    }
}
