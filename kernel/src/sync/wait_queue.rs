//! FIFO queue of blocked threads.
//!
//! A `WaitQueue` is owned by the synchronisation object threads sleep on
//! (a mutex, a futex word, a process's child events). It only ever holds
//! shared handles to threads and mutates its list inside an
//! interrupt-disabled ticket-lock section, so every operation is bounded and
//! callable from contexts that must not sleep.
//!
//! Every wake operation ends with a scheduler yield, whether or not a thread
//! was resumed.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloc::{collections::VecDeque, sync::Arc, vec::Vec};

use crate::sync::spin::ticket::IRQTicketMutex;
use crate::task::{Scheduler, Thread, Tid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(usize);

impl QueueId {
    fn allocate() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wq#{}", self.0)
    }
}

pub struct WaitQueue {
    id: QueueId,
    scheduler: Arc<dyn Scheduler>,
    waiters: IRQTicketMutex<VecDeque<Arc<Thread>>>,
}

impl WaitQueue {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            id: QueueId::allocate(),
            scheduler,
            waiters: IRQTicketMutex::new(VecDeque::new()),
        }
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Appends `thread` and marks it `Blocked` on this queue.
    ///
    /// Only enqueues; the caller suspends separately (see
    /// [`Thread::wait_on`]).
    pub fn enqueue(&self, thread: &Arc<Thread>) {
        let mut waiters = self.waiters.lock();
        thread.block_on_queue(self.id);
        waiters.push_back(thread.clone());
        log::trace!("{}: thread {} enqueued", self.id, thread.tid());
    }

    /// Resumes the oldest waiter.
    ///
    /// If `lock` is given it is cleared inside the queue's critical section,
    /// before the waiter is picked: a lock released this way can neither be
    /// missed by a thread that is about to enqueue nor be handed to nobody.
    pub fn wake_one(&self, lock: Option<&AtomicBool>) -> bool {
        let woken = {
            let mut waiters = self.waiters.lock();
            if let Some(lock) = lock {
                lock.store(false, Ordering::Release);
            }
            self.pop_runnable(&mut waiters, 1)
        };
        let resumed = self.resume(woken) == 1;
        self.scheduler.yield_now();
        resumed
    }

    /// Passes `lock` straight to the oldest waiter.
    ///
    /// `grant` runs with the chosen waiter's tid before that waiter can see
    /// its wakeup, so the waiter finds itself the owner when it resumes and
    /// the lock word never drops in between. With nobody to wake, `lock` is
    /// cleared inside the queue's critical section instead.
    pub fn hand_off(&self, lock: &AtomicBool, grant: impl FnOnce(Tid)) -> bool {
        let woken = {
            let mut waiters = self.waiters.lock();
            let mut grant = Some(grant);
            let mut next = None;
            while let Some(thread) = waiters.pop_front() {
                let tid = thread.tid();
                if thread.wake_from_queue_with(self.id, || {
                    if let Some(grant) = grant.take() {
                        grant(tid);
                    }
                }) {
                    next = Some(thread);
                    break;
                }
                log::debug!("{}: dropped stale waiter {}", self.id, tid);
            }
            if next.is_none() {
                lock.store(false, Ordering::Release);
            }
            next
        };
        let handed = woken.is_some();
        self.resume(woken.into_iter().collect());
        self.scheduler.yield_now();
        handed
    }

    /// Resumes up to `count` waiters in FIFO order. Returns how many.
    pub fn wake_n(&self, count: usize) -> usize {
        let woken = {
            let mut waiters = self.waiters.lock();
            self.pop_runnable(&mut waiters, count)
        };
        let resumed = self.resume(woken);
        self.scheduler.yield_now();
        resumed
    }

    /// Resumes every waiter. Returns how many.
    pub fn wake_all(&self) -> usize {
        self.wake_n(usize::MAX)
    }

    /// Empties the queue without resuming anyone.
    ///
    /// The threads stay `Blocked` on this queue; the caller takes them over
    /// and must move them to another queue or wake them.
    pub fn clear(&self) -> Vec<Arc<Thread>> {
        let mut waiters = self.waiters.lock();
        waiters.drain(..).collect()
    }

    /// Removes `thread` without waking it. Returns whether it was queued.
    pub fn dequeue(&self, thread: &Thread) -> bool {
        let mut waiters = self.waiters.lock();
        match waiters.iter().position(|t| core::ptr::eq(Arc::as_ptr(t), thread)) {
            Some(index) => {
                waiters.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }

    /// Tids of the queued threads, oldest first.
    pub fn waiter_tids(&self) -> Vec<Tid> {
        self.waiters.lock().iter().map(|t| t.tid()).collect()
    }

    /// Pops up to `count` threads still blocked on this queue and flips them
    /// to `Runnable`. Stale entries (threads that died while queued) are
    /// discarded and do not count.
    fn pop_runnable(&self, waiters: &mut VecDeque<Arc<Thread>>, count: usize) -> Vec<Arc<Thread>> {
        let mut woken = Vec::new();
        while woken.len() < count {
            let Some(thread) = waiters.pop_front() else {
                break;
            };
            if thread.wake_from_queue(self.id) {
                woken.push(thread);
            } else {
                log::debug!("{}: dropped stale waiter {}", self.id, thread.tid());
            }
        }
        woken
    }

    fn resume(&self, woken: Vec<Arc<Thread>>) -> usize {
        let count = woken.len();
        for thread in woken {
            log::trace!("{}: thread {} woken", self.id, thread.tid());
            self.scheduler.add_task(thread);
        }
        count
    }
}

impl Drop for WaitQueue {
    fn drop(&mut self) {
        let waiters = self.waiters.get_mut();
        if waiters.is_empty() {
            return;
        }
        log::warn!("{} dropped with {} waiters, waking them", self.id, waiters.len());
        let stranded: Vec<_> = waiters.drain(..).collect();
        for thread in stranded {
            if thread.wake_from_queue(self.id) {
                self.scheduler.add_task(thread);
            }
        }
    }
}

impl fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue")
            .field("id", &self.id)
            .field("waiters", &self.waiter_tids())
            .finish()
    }
}
