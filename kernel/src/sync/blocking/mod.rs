//! Locks whose contenders sleep on a [`WaitQueue`](super::WaitQueue) instead
//! of spinning.

mod mutex;

pub use mutex::{Mutex, MutexGuard};
