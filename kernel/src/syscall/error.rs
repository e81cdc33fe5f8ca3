//! Error numbers returned to user space, negated, in `a0`.

use strum_macros::{Display, EnumString, FromRepr, IntoStaticStr};

use crate::mm::MemoryError;
use crate::task::SignalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, FromRepr, IntoStaticStr)]
#[repr(i32)]
pub enum Errno {
    #[strum(serialize = "Operation not permitted")]
    EPERM = 1,
    #[strum(serialize = "No such file or directory")]
    ENOENT = 2,
    #[strum(serialize = "No such process")]
    ESRCH = 3,
    #[strum(serialize = "Interrupted system call")]
    EINTR = 4,
    #[strum(serialize = "No child processes")]
    ECHILD = 10,
    #[strum(serialize = "Resource temporarily unavailable")]
    EAGAIN = 11,
    #[strum(serialize = "Bad address")]
    EFAULT = 14,
    #[strum(serialize = "Invalid argument")]
    EINVAL = 22,
    #[strum(serialize = "Function not implemented")]
    ENOSYS = 38,
}

impl Errno {
    /// The value placed in the result register.
    pub fn to_neg(self) -> isize {
        -(self as isize)
    }
}

impl TryFrom<i32> for Errno {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Errno::from_repr(value).ok_or(())
    }
}

impl From<MemoryError> for Errno {
    fn from(error: MemoryError) -> Self {
        match error {
            MemoryError::Misaligned { .. } => Errno::EINVAL,
            _ => Errno::EFAULT,
        }
    }
}

impl From<SignalError> for Errno {
    fn from(_: SignalError) -> Self {
        Errno::EINVAL
    }
}
