use alloc::string::String;
use alloc::sync::Arc;
use std::thread;

use kernel_macros::kernel_test;

use super::*;
use crate::mm::MemorySet;
use crate::trap::RegisterState;

fn new_process(scheduler: &Arc<FiFoScheduler>) -> Arc<Process> {
    Process::new(
        String::from("test"),
        None,
        Arc::new(MemorySet::new_bare()),
        scheduler.clone(),
    )
}

fn add_thread(process: &Arc<Process>, scheduler: &Arc<FiFoScheduler>) -> Arc<Thread> {
    let thread = Thread::new(
        Arc::downgrade(process),
        scheduler.clone(),
        RegisterState::default(),
        SignalSet::EMPTY,
    );
    process.add_thread(thread.clone());
    thread
}

#[kernel_test]
fn signals_go_to_the_first_thread_not_blocking_them() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let first = add_thread(&process, &scheduler);
    let second = add_thread(&process, &scheduler);

    first.set_signal_mask(SignalSet::single(Signal::SIGUSR1));
    process.send_signal(Signal::SIGUSR1);
    assert!(first.pending_signals().is_empty());
    assert!(second.pending_signals().contains(Signal::SIGUSR1));

    second.set_signal_mask(SignalSet::single(Signal::SIGUSR2));
    first.set_signal_mask(SignalSet::single(Signal::SIGUSR2));
    process.send_signal(Signal::SIGUSR2);
    assert!(first.pending_signals().contains(Signal::SIGUSR2));
    assert!(!first.has_unmasked_pending_signals());
}

#[kernel_test]
fn ignored_signals_are_discarded() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let thread = add_thread(&process, &scheduler);

    process
        .set_signal_action(Signal::SIGCHLD, SignalAction::Ignore)
        .unwrap();
    process.send_signal(Signal::SIGCHLD);
    assert!(thread.pending_signals().is_empty());
}

#[kernel_test]
fn sigkill_and_sigstop_keep_their_default() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    for signal in [Signal::SIGKILL, Signal::SIGSTOP] {
        assert_eq!(
            process.set_signal_action(signal, SignalAction::Ignore),
            Err(SignalError::Unmaskable(signal))
        );
        assert_eq!(
            process.set_signal_action(signal, SignalAction::Default),
            Ok(SignalAction::Default)
        );
    }
}

#[kernel_test]
fn sigkill_terminates_at_send_time() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let thread = add_thread(&process, &scheduler);

    process.send_signal(Signal::SIGKILL);
    assert_eq!(
        process.termination(),
        Some(Termination::Signaled(Signal::SIGKILL))
    );
    assert_eq!(thread.state(), ThreadState::Dying);
    assert!(thread.pending_signals().is_empty());
}

#[kernel_test]
fn first_termination_wins() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    assert!(process.terminate(Termination::Exited(2)));
    assert!(!process.terminate(Termination::Signaled(Signal::SIGTERM)));
    assert_eq!(process.termination(), Some(Termination::Exited(2)));
    assert_eq!(Termination::Exited(2).wait_status(), 0x200);
    assert_eq!(Termination::Exited(-1).wait_status(), 0xff00);
    assert_eq!(Termination::Signaled(Signal::SIGSEGV).wait_status(), 11);
}

#[kernel_test]
fn threads_inside_a_syscall_die_at_their_safe_point() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let busy = add_thread(&process, &scheduler);
    let idle = add_thread(&process, &scheduler);

    busy.begin_syscall();
    process.terminate(Termination::Exited(0));
    assert_eq!(idle.state(), ThreadState::Dying);
    assert_eq!(busy.state(), ThreadState::Running);
    assert!(busy.death_requested());
    assert!(!process.is_reapable());

    busy.end_syscall();
    assert!(busy.die_if_needed());
    assert!(process.is_reapable());
}

#[kernel_test]
fn death_interrupts_a_blocked_thread() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let thread = add_thread(&process, &scheduler);
    let queue = Arc::new(crate::sync::WaitQueue::new(scheduler.clone()));

    let sleeper = {
        let (thread, queue) = (thread.clone(), queue.clone());
        thread::spawn(move || {
            thread.begin_syscall();
            thread.wait_on(&queue)
        })
    };
    while queue.len() < 1 {
        thread::yield_now();
    }
    process.terminate(Termination::Exited(0));

    assert_eq!(
        sleeper.join().unwrap(),
        BlockResult::Interrupted(InterruptReason::Death)
    );
    assert!(queue.is_empty());
    thread.end_syscall();
    assert!(thread.die_if_needed());
}

#[kernel_test]
fn dying_waiter_is_skipped_by_wakers() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let doomed = add_thread(&process, &scheduler);
    let queue = crate::sync::WaitQueue::new(scheduler.clone());

    queue.enqueue(&doomed);
    process.terminate(Termination::Exited(0));
    assert_eq!(doomed.state(), ThreadState::Dying);
    assert_eq!(queue.wake_all(), 0);
    assert!(scheduler.ready_tids().is_empty());
}

#[kernel_test]
fn big_lock_holder_keeps_the_process_alive() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let thread = add_thread(&process, &scheduler);

    let guard = process.big_lock().lock(&thread);
    process.terminate(Termination::Exited(0));
    assert!(!process.is_reapable());
    drop(guard);
    assert!(process.is_reapable());

    process.mark_threads_dead();
    assert_eq!(thread.state(), ThreadState::Dead);
    assert!(process.threads().is_empty());
}

#[kernel_test]
fn handler_delivery_pushes_a_frame() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let thread = add_thread(&process, &scheduler);
    process
        .set_signal_action(
            Signal::SIGALRM,
            SignalAction::Handler {
                handler: 0x4000,
                restorer: 0x4100,
            },
        )
        .unwrap();

    let mut regs = RegisterState::new_user(0x1000, 0x8000);
    let before = regs;
    thread.raise(Signal::SIGALRM);
    thread.raise(Signal::SIGHUP);
    thread.set_signal_mask(SignalSet::single(Signal::SIGHUP));

    assert_eq!(thread.dispatch_signal(&process, &mut regs), Some(Signal::SIGALRM));
    assert_eq!(regs.ip(), 0x4000);
    assert_eq!(regs.x[10], Signal::SIGALRM.number() as usize);
    assert_eq!(regs.return_address(), 0x4100);
    assert_eq!(thread.state(), ThreadState::Running);
    assert!(thread.signal_mask().contains(Signal::SIGALRM));

    // SIGHUP is blocked, nothing else to deliver
    assert_eq!(thread.dispatch_signal(&process, &mut regs), None);

    let frame = thread.pop_signal_frame().unwrap();
    assert_eq!(frame.regs, before);
    assert_eq!(frame.mask, SignalSet::single(Signal::SIGHUP));
}

#[kernel_test]
fn fatal_default_action_terminates() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let thread = add_thread(&process, &scheduler);
    let mut regs = RegisterState::default();

    thread.raise(Signal::SIGCHLD);
    assert_eq!(thread.dispatch_signal(&process, &mut regs), Some(Signal::SIGCHLD));
    assert!(!process.is_terminated());

    thread.raise(Signal::SIGINT);
    assert_eq!(thread.dispatch_signal(&process, &mut regs), Some(Signal::SIGINT));
    assert_eq!(
        process.termination(),
        Some(Termination::Signaled(Signal::SIGINT))
    );
    assert!(thread.die_if_needed());
}

#[kernel_test]
fn futex_queues_are_dropped_when_unused() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);

    let queue = process.futex_queue(0x3000);
    assert!(Arc::ptr_eq(&queue, &process.futex_queue(0x3000)));
    process.release_futex_queue(0x3000);
    assert!(process.existing_futex_queue(0x3000).is_some());

    drop(queue);
    process.release_futex_queue(0x3000);
    assert!(process.existing_futex_queue(0x3000).is_none());
}

#[kernel_test]
fn fifo_scheduler_skips_threads_that_left_the_ready_state() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let ready = add_thread(&process, &scheduler);
    let gone = add_thread(&process, &scheduler);

    scheduler.add_task(gone.clone());
    scheduler.add_task(ready.clone());
    gone.set_dying();

    let next = scheduler.fetch_task().unwrap();
    assert!(Arc::ptr_eq(&next, &ready));
    assert!(scheduler.fetch_task().is_none());

    let yields = scheduler.yield_count();
    scheduler.yield_now();
    assert_eq!(scheduler.yield_count(), yields + 1);
}

#[kernel_test]
fn ready_queue_holds_each_runnable_thread_once() {
    let scheduler = Arc::new(FiFoScheduler::new());
    let process = new_process(&scheduler);
    let sleeper = add_thread(&process, &scheduler);
    let queue = crate::sync::WaitQueue::new(scheduler.clone());

    for _ in 0..1000 {
        queue.enqueue(&sleeper);
        assert!(queue.wake_one(None));
        sleeper.cancel_wait(&queue);
    }
    assert_eq!(scheduler.ready_len(), 1);

    // The sleeper resumed by itself, its entry is stale
    let other = add_thread(&process, &scheduler);
    scheduler.add_task(other.clone());
    assert_eq!(scheduler.ready_tids(), [other.tid()]);

    other.set_dead();
    assert!(scheduler.ready_tids().is_empty());
    process.mark_threads_dead();
    assert_eq!(Arc::strong_count(&other), 1);
}
