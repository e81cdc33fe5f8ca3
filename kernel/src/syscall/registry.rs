//! The syscall table.
//!
//! Built once at init from an explicit list binding every [`Syscall`] to a
//! [`SyscallSlot`]. The list must name every syscall exactly once, so a new
//! number without a slot, a slot bound twice, or a gate-dispatched syscall
//! bound to a handler fails the build of the table at boot.

use core::fmt;

use lazy_static::lazy_static;
use strum::EnumCount;

use super::error::Errno;
use super::syscall_num::Syscall;
use super::{futex, process, signal, SyscallContext};

/// Table entry point: the dispatch context plus the three raw argument words.
pub type SyscallHandler = fn(&SyscallContext<'_>, usize, usize, usize) -> isize;

#[derive(Clone, Copy)]
pub enum SyscallSlot {
    Handler(SyscallHandler),
    /// Dispatched by the gate before or instead of the table
    Special,
    /// Number kept for stability, answers `ENOSYS`
    Removed,
}

impl fmt::Debug for SyscallSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyscallSlot::Handler(handler) => write!(f, "Handler({:p})", *handler as *const ()),
            SyscallSlot::Special => f.write_str("Special"),
            SyscallSlot::Removed => f.write_str("Removed"),
        }
    }
}

/// Every syscall and what answers it.
pub const SYSCALL_LIST: &[(Syscall, SyscallSlot)] = &[
    (Syscall::Yield, SyscallSlot::Handler(process::sys_yield_wrapper)),
    (Syscall::Getpid, SyscallSlot::Handler(process::sys_getpid_wrapper)),
    (Syscall::Getppid, SyscallSlot::Handler(process::sys_getppid_wrapper)),
    (Syscall::Gettid, SyscallSlot::Handler(process::sys_gettid_wrapper)),
    (Syscall::Exit, SyscallSlot::Special),
    (Syscall::ExitThread, SyscallSlot::Special),
    (Syscall::Fork, SyscallSlot::Special),
    (Syscall::Sigreturn, SyscallSlot::Special),
    (Syscall::Kill, SyscallSlot::Handler(signal::sys_kill_wrapper)),
    (Syscall::Sigprocmask, SyscallSlot::Handler(signal::sys_sigprocmask_wrapper)),
    (Syscall::Sigaction, SyscallSlot::Handler(signal::sys_sigaction_wrapper)),
    (Syscall::Waitpid, SyscallSlot::Handler(process::sys_waitpid_wrapper)),
    (Syscall::Futex, SyscallSlot::Handler(futex::sys_futex_wrapper)),
    (Syscall::Donate, SyscallSlot::Removed),
    (Syscall::GetKernelInfoPage, SyscallSlot::Removed),
];

lazy_static! {
    /// Global system call dispatch table.
    pub static ref SYSCALL_TABLE: SyscallTable = SyscallTable::build(SYSCALL_LIST);
}

/// Builds the global table. Must run before the first syscall trap.
pub fn init() {
    lazy_static::initialize(&SYSCALL_TABLE);
    log::info!(
        "syscall table ready: {} slots, {} removed",
        SYSCALL_TABLE.len(),
        SYSCALL_TABLE.removed_count()
    );
}

/// Dense table indexed by syscall number.
pub struct SyscallTable {
    slots: [SyscallSlot; Syscall::COUNT],
}

impl SyscallTable {
    /// # Panics
    /// If `entries` misses a syscall, binds one twice, or binds a special
    /// syscall as an ordinary handler (or vice versa).
    pub fn build(entries: &[(Syscall, SyscallSlot)]) -> Self {
        let mut bound: [Option<SyscallSlot>; Syscall::COUNT] = [None; Syscall::COUNT];

        for (syscall, slot) in entries {
            let entry = &mut bound[syscall.number()];
            if entry.is_some() {
                panic!("syscall {} is bound twice", syscall);
            }
            match (syscall.is_special(), slot) {
                (true, SyscallSlot::Special) | (false, SyscallSlot::Handler(_) | SyscallSlot::Removed) => {}
                (true, _) => panic!("syscall {} must be dispatched by the gate", syscall),
                (false, SyscallSlot::Special) => panic!("syscall {} is not a special syscall", syscall),
            }
            *entry = Some(*slot);
        }

        let mut slots = [SyscallSlot::Removed; Syscall::COUNT];
        for (number, entry) in bound.iter().enumerate() {
            match entry {
                Some(slot) => slots[number] = *slot,
                None => panic!("syscall number {} has no slot", number),
            }
        }
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `None` past the end of the table.
    pub fn slot(&self, function: usize) -> Option<SyscallSlot> {
        self.slots.get(function).copied()
    }

    pub fn removed_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, SyscallSlot::Removed))
            .count()
    }

    /// Runs the handler bound to `function`.
    ///
    /// Unknown and removed numbers answer `ENOSYS`. Special syscalls never
    /// reach the table.
    pub fn invoke(
        &self,
        ctx: &SyscallContext<'_>,
        function: usize,
        arg1: usize,
        arg2: usize,
        arg3: usize,
    ) -> isize {
        match self.slot(function) {
            None => {
                log::warn!(
                    "Unknown syscall {} requested ({:#x}, {:#x}, {:#x})",
                    function,
                    arg1,
                    arg2,
                    arg3
                );
                Errno::ENOSYS.to_neg()
            }
            Some(SyscallSlot::Removed) => {
                let name = Syscall::from_repr(function).map_or("?", |s| s.name());
                log::warn!("Removed syscall {} ({}) requested", name, function);
                Errno::ENOSYS.to_neg()
            }
            Some(SyscallSlot::Special) => {
                unreachable!("special syscall {} reached the syscall table", function)
            }
            Some(SyscallSlot::Handler(handler)) => handler(ctx, arg1, arg2, arg3),
        }
    }
}
