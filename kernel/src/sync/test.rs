use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use kernel_macros::kernel_test;

use super::blocking::Mutex;
use super::spin::mutex::SpinMutex;
use super::wait_queue::WaitQueue;
use crate::task::{
    BlockResult, Blocker, FiFoScheduler, InterruptReason, Scheduler, Signal, SignalSet, Thread,
    ThreadState,
};
use crate::trap::RegisterState;

fn setup() -> (Arc<FiFoScheduler>, WaitQueue) {
    let scheduler = Arc::new(FiFoScheduler::new());
    let queue = WaitQueue::new(scheduler.clone());
    (scheduler, queue)
}

fn new_thread(scheduler: &Arc<FiFoScheduler>) -> Arc<Thread> {
    let scheduler: Arc<dyn Scheduler> = scheduler.clone();
    Thread::new(Weak::new(), scheduler, RegisterState::default(), SignalSet::EMPTY)
}

fn wait_for_waiters(queue: &WaitQueue, count: usize) {
    while queue.len() < count {
        thread::yield_now();
    }
}

#[kernel_test]
fn wake_n_resumes_oldest_first() {
    let (scheduler, queue) = setup();
    let threads: Vec<_> = (0..5).map(|_| new_thread(&scheduler)).collect();
    for t in &threads {
        queue.enqueue(t);
        assert_eq!(t.state(), ThreadState::Blocked(Blocker::WaitQueue(queue.id())));
    }

    assert_eq!(queue.wake_n(2), 2);

    assert_eq!(threads[0].state(), ThreadState::Runnable);
    assert_eq!(threads[1].state(), ThreadState::Runnable);
    assert_eq!(scheduler.ready_tids(), vec![threads[0].tid(), threads[1].tid()]);
    assert_eq!(
        queue.waiter_tids(),
        threads[2..].iter().map(|t| t.tid()).collect::<Vec<_>>()
    );
}

#[kernel_test]
fn wake_n_then_wake_all() {
    let (scheduler, queue) = setup();
    let (t1, t2, t3) = (new_thread(&scheduler), new_thread(&scheduler), new_thread(&scheduler));
    queue.enqueue(&t1);
    queue.enqueue(&t2);
    queue.enqueue(&t3);

    assert_eq!(queue.wake_n(2), 2);
    assert_eq!(t1.state(), ThreadState::Runnable);
    assert_eq!(t2.state(), ThreadState::Runnable);
    assert!(matches!(t3.state(), ThreadState::Blocked(_)));
    assert_eq!(queue.waiter_tids(), vec![t3.tid()]);

    assert_eq!(queue.wake_all(), 1);
    assert_eq!(t3.state(), ThreadState::Runnable);
    assert!(queue.is_empty());
    assert_eq!(scheduler.ready_tids(), vec![t1.tid(), t2.tid(), t3.tid()]);
}

#[kernel_test]
fn wake_on_empty_queue_still_yields() {
    let (scheduler, queue) = setup();
    let before = scheduler.yield_count();

    assert!(!queue.wake_one(None));
    assert_eq!(scheduler.yield_count(), before + 1);
    assert_eq!(queue.wake_n(3), 0);
    assert_eq!(queue.wake_all(), 0);
    assert_eq!(scheduler.yield_count(), before + 3);
    assert!(scheduler.ready_tids().is_empty());
}

#[kernel_test]
fn wake_one_clears_lock_word() {
    let (scheduler, queue) = setup();
    let locked = AtomicBool::new(true);
    assert!(!queue.wake_one(Some(&locked)));
    assert!(!locked.load(Ordering::Acquire));

    let t = new_thread(&scheduler);
    queue.enqueue(&t);
    locked.store(true, Ordering::Release);
    assert!(queue.wake_one(Some(&locked)));
    assert!(!locked.load(Ordering::Acquire));
    assert_eq!(t.state(), ThreadState::Runnable);
}

#[kernel_test]
fn clear_resumes_no_one() {
    let (scheduler, queue) = setup();
    let (t1, t2) = (new_thread(&scheduler), new_thread(&scheduler));
    queue.enqueue(&t1);
    queue.enqueue(&t2);
    let yields = scheduler.yield_count();

    let taken = queue.clear();

    assert!(queue.is_empty());
    assert_eq!(taken.iter().map(|t| t.tid()).collect::<Vec<_>>(), vec![t1.tid(), t2.tid()]);
    assert!(matches!(t1.state(), ThreadState::Blocked(_)));
    assert!(matches!(t2.state(), ThreadState::Blocked(_)));
    assert!(scheduler.ready_tids().is_empty());
    assert_eq!(scheduler.yield_count(), yields);
}

#[kernel_test]
fn dead_waiters_are_skipped() {
    let (scheduler, queue) = setup();
    let threads: Vec<_> = (0..3).map(|_| new_thread(&scheduler)).collect();
    for t in &threads {
        queue.enqueue(t);
    }
    threads[0].set_dying();

    assert_eq!(queue.wake_n(1), 1);
    assert_eq!(threads[0].state(), ThreadState::Dying);
    assert_eq!(threads[1].state(), ThreadState::Runnable);
    assert_eq!(queue.waiter_tids(), vec![threads[2].tid()]);
}

#[kernel_test]
fn dequeue_reports_membership() {
    let (scheduler, queue) = setup();
    let t = new_thread(&scheduler);
    queue.enqueue(&t);
    assert!(queue.dequeue(&t));
    assert!(!queue.dequeue(&t));
}

#[kernel_test]
fn dropping_a_queue_wakes_its_waiters() {
    let (scheduler, queue) = setup();
    let t = new_thread(&scheduler);
    queue.enqueue(&t);
    drop(queue);
    assert_eq!(t.state(), ThreadState::Runnable);
    assert_eq!(scheduler.ready_tids(), vec![t.tid()]);
}

#[kernel_test]
fn sleepers_on_other_cpus_are_woken() {
    let (scheduler, queue) = setup();
    let queue = Arc::new(queue);

    let sleepers: Vec<_> = (0..3)
        .map(|_| {
            let me = new_thread(&scheduler);
            let queue = queue.clone();
            thread::spawn(move || me.wait_on(&queue))
        })
        .collect();

    wait_for_waiters(&queue, 3);
    assert_eq!(queue.wake_all(), 3);

    for sleeper in sleepers {
        assert_eq!(sleeper.join().unwrap(), BlockResult::Woken);
    }
}

#[kernel_test]
fn wait_until_sees_condition_set_before_sleeping() {
    let (scheduler, queue) = setup();
    let queue = Arc::new(queue);
    let ready = Arc::new(AtomicBool::new(false));

    let me = new_thread(&scheduler);
    let waiter = {
        let (queue, ready, me) = (queue.clone(), ready.clone(), me.clone());
        thread::spawn(move || {
            me.begin_syscall();
            me.wait_until(&queue, || ready.load(Ordering::Acquire))
        })
    };

    ready.store(true, Ordering::Release);
    queue.wake_all();

    assert_eq!(waiter.join().unwrap(), BlockResult::Woken);
    assert_eq!(me.state(), ThreadState::Running);
    assert!(queue.is_empty());
}

#[kernel_test]
fn pending_signal_interrupts_wait() {
    let (scheduler, queue) = setup();
    let queue = Arc::new(queue);
    let me = new_thread(&scheduler);

    let waiter = {
        let (queue, me) = (queue.clone(), me.clone());
        thread::spawn(move || me.wait_on(&queue))
    };
    wait_for_waiters(&queue, 1);
    me.raise(Signal::SIGUSR1);

    assert_eq!(
        waiter.join().unwrap(),
        BlockResult::Interrupted(InterruptReason::Signal)
    );
    assert!(queue.is_empty());
    assert_eq!(me.state(), ThreadState::Running);
}

#[kernel_test]
fn masked_signal_does_not_interrupt() {
    let (scheduler, queue) = setup();
    let queue = Arc::new(queue);
    let me = new_thread(&scheduler);
    me.set_signal_mask(SignalSet::single(Signal::SIGUSR2));

    let waiter = {
        let (queue, me) = (queue.clone(), me.clone());
        thread::spawn(move || me.wait_on(&queue))
    };
    wait_for_waiters(&queue, 1);
    me.raise(Signal::SIGUSR2);
    for _ in 0..100 {
        thread::yield_now();
    }
    assert_eq!(queue.len(), 1);

    queue.wake_one(None);
    assert_eq!(waiter.join().unwrap(), BlockResult::Woken);
}

#[kernel_test]
fn mutex_excludes_under_contention() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 200;

    let scheduler = Arc::new(FiFoScheduler::new());
    let mutex = Arc::new(Mutex::new(0usize, scheduler.clone()));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let me = new_thread(&scheduler);
            let mutex = mutex.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let mut guard = mutex.lock(&me);
                    let seen = *guard;
                    thread::yield_now();
                    *guard = seen + 1;
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let me = new_thread(&scheduler);
    assert_eq!(*mutex.lock(&me), THREADS * ROUNDS);
    assert_eq!(mutex.acquisitions(), THREADS * ROUNDS + 1);
    assert_eq!(mutex.releases(), THREADS * ROUNDS + 1);
    assert!(!mutex.is_locked());
}

#[kernel_test]
fn mutex_hands_over_in_fifo_order() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let mutex = Arc::new(Mutex::new((), scheduler.clone()));
    let order = Arc::new(SpinMutex::new(Vec::new()));

    let owner = new_thread(&scheduler);
    let guard = mutex.lock(&owner);
    assert_eq!(mutex.holder(), Some(owner.tid()));

    let contenders: Vec<_> = (0..2)
        .map(|i| {
            let me = new_thread(&scheduler);
            let tid = me.tid();
            let (shared, order) = (mutex.clone(), order.clone());
            let handle = thread::spawn(move || {
                let _guard = shared.lock(&me);
                order.lock().push(me.tid());
            });
            // Serialise the enqueue order
            wait_for_waiters(mutex.waiters(), i + 1);
            (tid, handle)
        })
        .collect();

    drop(guard);
    let expected: Vec<_> = contenders.iter().map(|(tid, _)| *tid).collect();
    for (_, handle) in contenders {
        handle.join().unwrap();
    }
    assert_eq!(*order.lock(), expected);
}

#[kernel_test]
fn mutex_unlock_hands_over_before_a_newcomer_can_take_it() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let mutex = Arc::new(Mutex::new((), scheduler.clone()));
    let release = Arc::new(AtomicBool::new(false));
    let (owner, waiter, newcomer) = (
        new_thread(&scheduler),
        new_thread(&scheduler),
        new_thread(&scheduler),
    );

    let guard = mutex.lock(&owner);
    let handle = {
        let (mutex, waiter, release) = (mutex.clone(), waiter.clone(), release.clone());
        thread::spawn(move || {
            let _guard = mutex.lock(&waiter);
            while !release.load(Ordering::Acquire) {
                thread::yield_now();
            }
        })
    };
    wait_for_waiters(mutex.waiters(), 1);

    drop(guard);
    assert_eq!(mutex.holder(), Some(waiter.tid()));
    assert!(mutex.is_locked());
    assert!(mutex.try_lock(&newcomer).is_none());

    release.store(true, Ordering::Release);
    handle.join().unwrap();
    assert!(!mutex.is_locked());
    assert_eq!(mutex.acquisitions(), 2);
    assert_eq!(mutex.releases(), 2);
}

#[kernel_test]
#[should_panic(expected = "already holds")]
fn mutex_is_not_reentrant() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let mutex = Mutex::new((), scheduler.clone());
    let me = new_thread(&scheduler);
    let _outer = mutex.lock(&me);
    let _inner = mutex.lock(&me);
}
