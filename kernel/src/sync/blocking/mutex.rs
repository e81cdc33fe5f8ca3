use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use alloc::sync::Arc;

use crate::sync::wait_queue::WaitQueue;
use crate::task::{Scheduler, Thread, Tid};

/// A sleeping, non-reentrant mutual exclusion lock.
///
/// Contenders enqueue themselves on the lock's [`WaitQueue`] and suspend.
/// Unlocking hands the lock directly to the oldest waiter, so a thread that
/// was never queued cannot overtake it; the word is only cleared when nobody
/// waits. Locking a mutex the calling thread already holds is a kernel bug
/// and panics.
///
/// This is the per-process big lock; it may be held across blocking points
/// only through [`SyscallContext`](crate::syscall::SyscallContext), which
/// drops it while the thread sleeps.
pub struct Mutex<T> {
    locked: AtomicBool,
    /// Tid of the holder, [`Self::NO_HOLDER`] when free
    holder: AtomicUsize,
    waiters: WaitQueue,
    acquisitions: AtomicUsize,
    releases: AtomicUsize,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Mutex<T> {}
unsafe impl<T: Send> Send for Mutex<T> {}

/// Releases the mutex when dropped.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Mutex<T> {
    /// Tids start at 1
    const NO_HOLDER: usize = 0;

    pub fn new(data: T, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            locked: AtomicBool::new(false),
            holder: AtomicUsize::new(Self::NO_HOLDER),
            waiters: WaitQueue::new(scheduler),
            acquisitions: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the mutex on behalf of `thread`, sleeping while it is held.
    ///
    /// # Panics
    /// If `thread` already holds the mutex.
    pub fn lock(&self, thread: &Arc<Thread>) -> MutexGuard<'_, T> {
        let tid = usize::from(thread.tid());
        if self.holder.load(Ordering::Acquire) == tid {
            panic!("thread {} locked a mutex it already holds", tid);
        }

        loop {
            if self.try_acquire(tid) {
                break;
            }
            self.waiters.enqueue(thread);
            // The holder may have left between the attempt and the enqueue
            if self.try_acquire(tid) {
                thread.cancel_wait(&self.waiters);
                break;
            }
            let result = thread.suspend(&self.waiters, false);
            if self.holder.load(Ordering::Acquire) == tid {
                // Handed over by the previous holder
                break;
            }
            if result.was_interrupted() {
                // Forced to die while waiting: keep contending off-queue
                self.waiters.scheduler().yield_now();
            }
        }

        MutexGuard { mutex: self }
    }

    pub fn try_lock(&self, thread: &Thread) -> Option<MutexGuard<'_, T>> {
        let tid = usize::from(thread.tid());
        self.try_acquire(tid).then(|| MutexGuard { mutex: self })
    }

    fn try_acquire(&self, tid: usize) -> bool {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.holder.store(tid, Ordering::Release);
            self.acquisitions.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    fn unlock(&self) {
        self.holder.store(Self::NO_HOLDER, Ordering::Release);
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.waiters.hand_off(&self.locked, |next| {
            self.holder.store(usize::from(next), Ordering::Release);
            self.acquisitions.fetch_add(1, Ordering::Relaxed);
        });
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub fn holder(&self) -> Option<Tid> {
        match self.holder.load(Ordering::Acquire) {
            Self::NO_HOLDER => None,
            tid => Some(Tid::from_raw(tid)),
        }
    }

    /// Times the mutex was acquired.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Times the mutex was released.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }

    /// The queue contenders sleep on.
    pub fn waiters(&self) -> &WaitQueue {
        &self.waiters
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: the guard proves exclusive ownership
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: the guard proves exclusive ownership
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
