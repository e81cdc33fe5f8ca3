//! Syscall trap entry.
//!
//! The platform trap shim saves the user registers, looks up the current
//! thread and calls [`syscall_handler`] once per `ecall` from U-mode. The
//! handler:
//! 1. Runs the hardening hooks and moves onto a jittered stack frame
//! 2. Answers `gettid` without touching the process
//! 3. Validates the trapping context (user stack, executable code region)
//! 4. Skips the `ecall` and dispatches the syscall under the big lock
//! 5. Delivers at most one pending signal on the way out
//!
//! The returned [`TrapExit`] tells the shim whether the frame may be restored.

mod context;
pub mod hardening;

use alloc::sync::Arc;

use crate::arch;
use crate::config::SYSCALL_VECTOR;
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, VirtAddr};
use crate::processor::get_current_processor;
use crate::syscall::{self, Disposition, Syscall, SyscallContext};
use crate::task::{Process, Signal, Termination, Thread, TracePhase};

pub use context::{RegisterState, TrapFrame};

/// What the trap shim does once the handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapExit {
    /// Restore the frame and `sret` to user space
    ResumeUser,
    /// The thread must never run user code again; hand it to the exit path
    Dying,
}

/// Routes syscall traps to the gate.
pub fn init() {
    arch::current().bind_syscall_vector(SYSCALL_VECTOR);
}

/// Entry point for one syscall trap of `thread`.
pub fn syscall_handler(kernel: &Kernel, thread: &Arc<Thread>, mut frame: TrapFrame<'_>) -> TrapExit {
    let offset = hardening::on_kernel_entry(&kernel.config().hardening);
    get_current_processor().record_syscall_trap(offset);

    hardening::with_stack_jitter(offset, || handle_syscall(kernel, thread, frame.regs_mut()))
}

fn handle_syscall(kernel: &Kernel, thread: &Arc<Thread>, regs: &mut RegisterState) -> TrapExit {
    let Some(process) = thread.process() else {
        log::warn!("thread {} trapped without a process", thread.tid());
        thread.set_dying();
        return TrapExit::Dying;
    };
    if thread.die_if_needed() {
        process.notify_parent();
        return TrapExit::Dying;
    }

    if regs.syscall_number() == Syscall::Gettid.number() {
        regs.advance_past_syscall();
        regs.set_result(usize::from(thread.tid()) as isize);
        thread.did_syscall();
        return TrapExit::ResumeUser;
    }

    thread.begin_syscall();
    thread.syscall_trace_stop(regs, TracePhase::Entry);

    if let Err(signal) = validate_context(process.address_space().as_ref(), regs) {
        return handle_crash(thread, &process, regs, signal);
    }
    regs.advance_past_syscall();

    let disposition = {
        let ctx = SyscallContext::new(kernel, thread, &process);
        syscall::dispatch(&ctx, regs)
    };
    thread.did_syscall();

    match disposition {
        Disposition::Return(value) => regs.set_result(value),
        Disposition::Redirected => {}
        Disposition::Dying => {
            thread.end_syscall();
            process.notify_parent();
            return TrapExit::Dying;
        }
    }

    thread.syscall_trace_stop(regs, TracePhase::Exit);
    thread.end_syscall();

    if leave_if_dying(thread, &process) {
        return TrapExit::Dying;
    }
    if thread.has_unmasked_pending_signals() {
        thread.dispatch_signal(&process, regs);
        if leave_if_dying(thread, &process) {
            return TrapExit::Dying;
        }
    }
    TrapExit::ResumeUser
}

fn leave_if_dying(thread: &Thread, process: &Process) -> bool {
    if thread.die_if_needed() {
        process.notify_parent();
        true
    } else {
        false
    }
}

/// Checks the user context the `ecall` came from.
fn validate_context(space: &dyn AddressSpace, regs: &RegisterState) -> Result<(), Signal> {
    let sp = VirtAddr(regs.user_sp());
    if !space.validate_user_stack(sp) {
        log::error!("Invalid stack pointer {} at syscall", sp);
        return Err(Signal::SIGSTKFLT);
    }

    let ip = VirtAddr(regs.ip());
    let Some(region) = space.region_from_vaddr(ip) else {
        log::error!("Syscall from unmapped address {}", ip);
        return Err(Signal::SIGSEGV);
    };
    if !region.is_user() {
        log::error!("Syscall from kernel region {:?}", region);
        return Err(Signal::SIGSEGV);
    }
    if region.is_writable() {
        log::error!("Syscall from writable region {:?}", region);
        return Err(Signal::SIGSEGV);
    }
    Ok(())
}

/// Kills the process of a thread that trapped from a corrupt context.
fn handle_crash(
    thread: &Thread,
    process: &Process,
    regs: &RegisterState,
    signal: Signal,
) -> TrapExit {
    log::error!(
        "Crash: {} in thread {} of process {} ({})",
        signal,
        thread.tid(),
        process.pid(),
        process.name()
    );
    log::error!("{:?}", regs);

    process.terminate(Termination::Signaled(signal));
    thread.end_syscall();
    thread.set_dying();
    process.notify_parent();
    TrapExit::Dying
}
