use core::sync::atomic::{AtomicUsize, Ordering};

use lock_api::{GuardNoSend, GuardSend, RawMutex};

use crate::interrupt::InterruptController;

/// A ticket-based mutex that ensures FIFO ordering for lock acquisition.
///
/// This provides fair synchronization by assigning each contender a "ticket"
/// and only allowing the holder of the matching "now serving" ticket
/// to acquire the lock.
pub type TicketMutex<T> = lock_api::Mutex<RawTicketMutex, T>;

/// An interrupt-safe variant of `TicketMutex` that disables interrupts.
pub type IRQTicketMutex<T> = lock_api::Mutex<RawIrqTicketMutex, T>;

/// Guard types for the mutex variants
pub type TicketMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawTicketMutex, T>;
pub type IRQTicketMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawIrqTicketMutex, T>;

/// Raw implementation of the ticket-based mutex
pub struct RawTicketMutex {
    next_ticket: AtomicUsize, // Next available ticket number
    now_serving: AtomicUsize, // Currently allowed ticket number
}

unsafe impl RawMutex for RawTicketMutex {
    const INIT: RawTicketMutex = RawTicketMutex {
        next_ticket: AtomicUsize::new(0),
        now_serving: AtomicUsize::new(0),
    };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        // 1. Get a ticket (FIFO guarantee)
        let my_ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        // 2. Spin until it's our turn
        while self.now_serving.load(Ordering::Acquire) != my_ticket {
            core::hint::spin_loop();
        }
    }

    fn try_lock(&self) -> bool {
        let serving = self.now_serving.load(Ordering::Acquire);
        // Only take a ticket if it would be served immediately
        self.next_ticket
            .compare_exchange(serving, serving + 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        // Advance to next ticket
        self.now_serving.fetch_add(1, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.next_ticket.load(Ordering::Relaxed) != self.now_serving.load(Ordering::Relaxed)
    }
}

/// Interrupt-disabling version of the ticket mutex
pub struct RawIrqTicketMutex {
    inner: RawTicketMutex,
}

unsafe impl RawMutex for RawIrqTicketMutex {
    const INIT: RawIrqTicketMutex = RawIrqTicketMutex {
        inner: RawTicketMutex::INIT,
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
