use strum_macros::{Display, EnumCount, FromRepr, IntoStaticStr};

/// Syscall numbers.
///
/// Numbering is dense and stable across kernel versions: a syscall that is
/// removed keeps its number and is answered with `ENOSYS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr, EnumCount, Display)]
#[repr(usize)]
#[strum(serialize_all = "snake_case")]
pub enum Syscall {
    Yield = 0,
    Getpid = 1,
    Getppid = 2,
    Gettid = 3,
    Exit = 4,
    ExitThread = 5,
    Fork = 6,
    Sigreturn = 7,
    Kill = 8,
    Sigprocmask = 9,
    Sigaction = 10,
    Waitpid = 11,
    Futex = 12,
    Donate = 13,
    GetKernelInfoPage = 14,
}

impl Syscall {
    pub fn number(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Syscalls dispatched by the gate itself rather than through the table.
    pub fn is_special(&self) -> bool {
        matches!(
            self,
            Syscall::Exit | Syscall::ExitThread | Syscall::Fork | Syscall::Sigreturn
        )
    }
}
