//! A readers-writer spin lock.
//!
//! Concurrent read access, exclusive write access. Used for read-mostly kernel
//! tables such as the process table, where lookups vastly outnumber inserts.

use core::hint;
use core::sync::atomic::{AtomicUsize, Ordering};

use lock_api::GuardSend;

/// The raw readers-writer lock.
///
/// The state word holds the writer flag in bit 0 and the reader count in the
/// remaining bits.
pub struct RawRwLock(AtomicUsize);

const WRITER: usize = 1;
const READER: usize = 1 << 1;

/// A readers-writer lock type providing shared read access and exclusive write access.
///
/// # Example
/// ```ignore
/// let lock = RWLock::new(0);
/// {
///     let read_guard = lock.read(); // Multiple readers allowed
///     log::info!("Value: {}", *read_guard);
/// }
/// *lock.write() += 1; // Exclusive write access
/// ```
pub type RWLock<T> = lock_api::RwLock<RawRwLock, T>;

pub type RwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawRwLock, T>;

pub type RwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawRwLock, T>;

unsafe impl lock_api::RawRwLock for RawRwLock {
    const INIT: RawRwLock = RawRwLock(AtomicUsize::new(0));
    type GuardMarker = GuardSend;

    fn lock_shared(&self) {
        while !self.try_lock_shared() {
            hint::spin_loop();
        }
    }

    fn try_lock_shared(&self) -> bool {
        let state = self.0.load(Ordering::Relaxed);
        if state & WRITER != 0 {
            return false;
        }
        self.0
            .compare_exchange_weak(state, state + READER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_shared(&self) {
        let old = self.0.fetch_sub(READER, Ordering::Release);
        debug_assert!(old >= READER, "read unlock without readers");
    }

    fn lock_exclusive(&self) {
        while !self.try_lock_exclusive() {
            hint::spin_loop();
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        self.0
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_exclusive(&self) {
        self.0.fetch_and(!WRITER, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.0.load(Ordering::Relaxed) != 0
    }

    fn is_locked_exclusive(&self) -> bool {
        self.0.load(Ordering::Relaxed) & WRITER != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_macros::kernel_test;

    #[kernel_test]
    fn readers_share_writer_excludes() {
        let lock = RWLock::new(5);
        let r1 = lock.read();
        let r2 = lock.read();
        assert_eq!(*r1 + *r2, 10);
        assert!(lock.try_write().is_none());
        drop(r1);
        drop(r2);

        let mut w = lock.write();
        *w = 7;
        assert!(lock.try_read().is_none());
        drop(w);
        assert_eq!(*lock.read(), 7);
    }
}
