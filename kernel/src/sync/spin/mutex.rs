use core::{
    hint,
    sync::atomic::{AtomicBool, Ordering},
};

use lock_api::{GuardNoSend, GuardSend, RawMutex};

use crate::interrupt::InterruptController;

/// A spin-based mutual exclusion lock (spinlock)
///
/// Provides mutually exclusive access to the underlying data through a
/// busy-wait loop while waiting for the lock to become available.
///
/// # Example
/// ```ignore
/// let lock = SpinMutex::new(42);
/// let mut guard = lock.lock();
/// *guard = 10;
/// ```
///
/// # Safety Note
/// - This is a **spinlock**, not a sleep-wait lock. Do not hold it for long periods.
/// - Use [`IRQSpinLock`] for data also touched from interrupt context.
pub type SpinMutex<T> = lock_api::Mutex<RawSpinLock, T>;
pub type SpinMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

/// Spinlock that disables interrupts on the local CPU while held.
pub type IRQSpinLock<T> = lock_api::Mutex<RawIrqSpinLock, T>;
pub type IRQSpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawIrqSpinLock, T>;

pub struct RawSpinLock {
    /// Atomic flag indicating whether the lock is held
    locked: AtomicBool,
}

unsafe impl RawMutex for RawSpinLock {
    const INIT: RawSpinLock = RawSpinLock {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Spin on a plain load to keep the cache line shared
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Interrupt-disabling version of [`RawSpinLock`].
///
/// Interrupts are disabled before spinning and restored (nesting-aware) after
/// the unlock, so the guard must be released on the CPU that took it.
pub struct RawIrqSpinLock {
    inner: RawSpinLock,
}

unsafe impl RawMutex for RawIrqSpinLock {
    const INIT: RawIrqSpinLock = RawIrqSpinLock {
        inner: RawSpinLock::INIT,
    };

    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        InterruptController::push_off();
        self.inner.lock();
    }

    fn try_lock(&self) -> bool {
        InterruptController::push_off();
        if self.inner.try_lock() {
            true
        } else {
            InterruptController::pop_off();
            false
        }
    }

    unsafe fn unlock(&self) {
        self.inner.unlock();
        InterruptController::pop_off();
    }

    fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}
