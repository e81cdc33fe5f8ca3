//! Signal numbers, sets and per-process dispositions.

use core::fmt;

use strum_macros::{FromRepr, IntoStaticStr};

use crate::trap::RegisterState;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
pub enum Signal {
    /// 1 - Terminal hangup or controlling process died
    SIGHUP = 1,
    /// 2 - Keyboard interrupt (Ctrl+C)
    SIGINT = 2,
    /// 3 - Keyboard quit (Ctrl+\)
    SIGQUIT = 3,
    /// 4 - Illegal instruction
    SIGILL = 4,
    /// 5 - Trace/breakpoint trap
    SIGTRAP = 5,
    /// 6 - Abnormal termination (e.g. failed assert)
    SIGABRT = 6,
    /// 7 - Bus error
    SIGBUS = 7,
    /// 8 - Arithmetic exception
    SIGFPE = 8,
    /// 9 - Immediate forced termination (unmaskable!)
    SIGKILL = 9,
    /// 10 - User-defined signal 1
    SIGUSR1 = 10,
    /// 11 - Invalid memory access, also raised for syscalls from bad code regions
    SIGSEGV = 11,
    /// 12 - User-defined signal 2
    SIGUSR2 = 12,
    /// 13 - Write to a pipe with no reader
    SIGPIPE = 13,
    /// 14 - Timer expired (alarm/setitimer)
    SIGALRM = 14,
    /// 15 - Graceful termination request (kill default)
    SIGTERM = 15,
    /// 16 - Stack fault, raised for syscalls with a bad user stack
    SIGSTKFLT = 16,
    /// 17 - Child status changed
    SIGCHLD = 17,
    /// 18 - Continue if stopped
    SIGCONT = 18,
    /// 19 - Stop process execution (unmaskable!)
    SIGSTOP = 19,
    /// 20 - Terminal stop request (Ctrl+Z)
    SIGTSTP = 20,
}

impl Signal {
    /// Signals that can be neither blocked, caught nor ignored.
    pub fn is_unmaskable(&self) -> bool {
        matches!(self, Signal::SIGKILL | Signal::SIGSTOP)
    }

    /// Whether the default action terminates the process.
    ///
    /// Job control is not implemented, so the stop and continue signals
    /// default to being discarded.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Signal::SIGCHLD | Signal::SIGCONT | Signal::SIGSTOP | Signal::SIGTSTP
        )
    }

    pub fn number(&self) -> u32 {
        *self as u32
    }

    /// Compatible with strsignal(3)
    pub fn description(&self) -> &'static str {
        match self {
            Signal::SIGHUP => "Hangup",
            Signal::SIGINT => "Interrupt",
            Signal::SIGQUIT => "Quit (core dumped)",
            Signal::SIGILL => "Illegal instruction",
            Signal::SIGTRAP => "Trace/breakpoint trap",
            Signal::SIGABRT => "Aborted",
            Signal::SIGBUS => "Bus error",
            Signal::SIGFPE => "Floating point exception",
            Signal::SIGKILL => "Killed",
            Signal::SIGUSR1 => "User defined signal 1",
            Signal::SIGSEGV => "Segmentation fault",
            Signal::SIGUSR2 => "User defined signal 2",
            Signal::SIGPIPE => "Broken pipe",
            Signal::SIGALRM => "Alarm clock",
            Signal::SIGTERM => "Terminated",
            Signal::SIGSTKFLT => "Stack fault",
            Signal::SIGCHLD => "Child status changed",
            Signal::SIGCONT => "Continued",
            Signal::SIGSTOP => "Stopped (signal)",
            Signal::SIGTSTP => "Stopped (user)",
        }
    }
}

impl TryFrom<u32> for Signal {
    type Error = SignalError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Signal::from_repr(value).ok_or(SignalError::InvalidSignal(value))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// Number outside the supported signal range
    InvalidSignal(u32),
    /// Tried to catch, ignore or block SIGKILL/SIGSTOP
    Unmaskable(Signal),
}

/// A set of signals, bit `n` standing for signal number `n`.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalSet(u32);

impl SignalSet {
    pub const EMPTY: SignalSet = SignalSet(0);

    /// SIGKILL and SIGSTOP, which no mask may contain
    pub const UNMASKABLE: SignalSet =
        SignalSet((1 << Signal::SIGKILL as u32) | (1 << Signal::SIGSTOP as u32));

    /// Accepts a raw user mask, dropping bits that name no signal.
    pub fn from_bits_truncate(bits: u32) -> Self {
        let valid = (1..=Signal::SIGTSTP as u32).fold(0u32, |acc, n| acc | (1 << n));
        SignalSet(bits & valid)
    }

    pub fn single(signal: Signal) -> Self {
        SignalSet(1 << signal.number())
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, signal: Signal) -> bool {
        self.0 & (1 << signal.number()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: SignalSet) -> SignalSet {
        SignalSet(self.0 | other.0)
    }

    pub fn difference(self, other: SignalSet) -> SignalSet {
        SignalSet(self.0 & !other.0)
    }

    /// Lowest-numbered member.
    pub fn first(&self) -> Option<Signal> {
        if self.0 == 0 {
            return None;
        }
        Signal::from_repr(self.0.trailing_zeros())
    }
}

impl fmt::Debug for SignalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignalSet({:#x})", self.0)
    }
}

/// What a process does when a signal is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalAction {
    #[default]
    Default,
    Ignore,
    /// Run the user handler at `handler`, returning through `restorer`,
    /// which is expected to issue `sigreturn`.
    Handler { handler: usize, restorer: usize },
}

impl SignalAction {
    /// User encoding of `SIG_DFL`
    pub const SIG_DFL: usize = 0;
    /// User encoding of `SIG_IGN`
    pub const SIG_IGN: usize = 1;

    pub fn from_user(handler: usize, restorer: usize) -> Self {
        match handler {
            Self::SIG_DFL => SignalAction::Default,
            Self::SIG_IGN => SignalAction::Ignore,
            handler => SignalAction::Handler { handler, restorer },
        }
    }

    /// The handler word reported back to user space.
    pub fn to_user(&self) -> usize {
        match self {
            SignalAction::Default => Self::SIG_DFL,
            SignalAction::Ignore => Self::SIG_IGN,
            SignalAction::Handler { handler, .. } => *handler,
        }
    }
}

/// Interrupted user context saved while a handler runs.
#[derive(Debug, Clone, Copy)]
pub struct SignalFrame {
    pub regs: RegisterState,
    /// Mask to restore on `sigreturn`
    pub mask: SignalSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_macros::kernel_test;

    #[kernel_test]
    fn sets_pick_lowest_signal() {
        let set = SignalSet::single(Signal::SIGTERM).union(SignalSet::single(Signal::SIGUSR1));
        assert_eq!(set.first(), Some(Signal::SIGUSR1));
        assert!(set.contains(Signal::SIGTERM));
        assert_eq!(set.difference(SignalSet::single(Signal::SIGUSR1)).first(), Some(Signal::SIGTERM));
        assert_eq!(SignalSet::EMPTY.first(), None);
    }

    #[kernel_test]
    fn raw_masks_are_truncated() {
        let set = SignalSet::from_bits_truncate(u32::MAX);
        assert!(set.contains(Signal::SIGKILL));
        assert_eq!(set.bits() & 1, 0);
        assert_eq!(Signal::try_from(0), Err(SignalError::InvalidSignal(0)));
        assert_eq!(Signal::try_from(16), Ok(Signal::SIGSTKFLT));
    }

    #[kernel_test]
    fn user_encoding_of_actions() {
        assert_eq!(SignalAction::from_user(0, 0), SignalAction::Default);
        assert_eq!(SignalAction::from_user(1, 0), SignalAction::Ignore);
        let action = SignalAction::from_user(0x4000, 0x5000);
        assert_eq!(action.to_user(), 0x4000);
        assert_eq!(Signal::SIGSEGV.to_string(), "SIGSEGV");
    }
}
