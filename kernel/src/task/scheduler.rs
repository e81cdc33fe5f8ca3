use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::{collections::vec_deque::VecDeque, sync::Arc, vec::Vec};

use crate::arch;
use crate::sync::spin::mutex::IRQSpinLock;

use super::{Thread, ThreadState, Tid};

/// The run-queue policy consumed by the blocking core.
///
/// The core only hands runnable threads over and asks for a reschedule point;
/// picking and switching is entirely up to the implementation.
pub trait Scheduler: Send + Sync {
    /// Makes `thread` eligible to run.
    fn add_task(&self, thread: Arc<Thread>);

    /// Next thread to run, if any.
    fn fetch_task(&self) -> Option<Arc<Thread>>;

    /// Forgets `thread`; called once it is dead.
    fn remove_task(&self, thread: &Thread);

    /// Voluntarily relinquishes the current CPU slice.
    fn yield_now(&self);
}

/// First-in first-out ready queue.
///
/// `yield_now` does not switch stacks: the caller keeps polling its own
/// state, which is how blocked threads make progress both on a single hart
/// before the context switcher is up and under the host test harness.
///
/// A thread is queued at most once, and entries of threads that left
/// `Runnable` without being fetched are purged on the next `add_task`, so
/// the queue never outgrows the set of runnable threads.
pub struct FiFoScheduler {
    ready_queue: IRQSpinLock<VecDeque<Arc<Thread>>>,
    yields: AtomicUsize,
}

impl FiFoScheduler {
    pub fn new() -> Self {
        Self {
            ready_queue: IRQSpinLock::new(VecDeque::new()),
            yields: AtomicUsize::new(0),
        }
    }

    /// Number of reschedule points taken so far.
    pub fn yield_count(&self) -> usize {
        self.yields.load(Ordering::Acquire)
    }

    pub fn ready_len(&self) -> usize {
        self.ready_queue.lock().len()
    }

    /// Tids currently waiting in the ready queue, in order.
    pub fn ready_tids(&self) -> Vec<Tid> {
        self.ready_queue.lock().iter().map(|t| t.tid()).collect()
    }
}

impl Default for FiFoScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for FiFoScheduler {
    fn add_task(&self, thread: Arc<Thread>) {
        let mut ready_queue = self.ready_queue.lock();
        ready_queue.retain(|t| t.state() == ThreadState::Runnable);
        if ready_queue.iter().any(|t| Arc::ptr_eq(t, &thread)) {
            return;
        }
        log::trace!("thread {} ready", thread.tid());
        ready_queue.push_back(thread);
    }

    fn fetch_task(&self) -> Option<Arc<Thread>> {
        let mut ready_queue = self.ready_queue.lock();
        while let Some(thread) = ready_queue.pop_front() {
            if thread.state() == ThreadState::Runnable {
                return Some(thread);
            }
            // Resumed by itself or died in the meantime
        }
        None
    }

    fn remove_task(&self, thread: &Thread) {
        self.ready_queue
            .lock()
            .retain(|t| !core::ptr::eq(Arc::as_ptr(t), thread));
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::AcqRel);
        arch::current().relax();
    }
}
