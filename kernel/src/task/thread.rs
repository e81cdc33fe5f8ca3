//! Threads and their blocking state machine.
//!
//! ```text
//!             enqueue + suspend              wake_one/wake_n/wake_all
//!  Running ─────────────────────▶ Blocked ─────────────────────────▶ Runnable ──▶ Running
//!     │                              │
//!     │ safe point, death requested  │ process terminated
//!     ▼                              ▼
//!   Dying ◀──────────────────────────┘          Dying ──reap──▶ Dead
//! ```
//!
//! A thread only blocks itself. Wakers flip the state of a queued thread to
//! `Runnable` and hand it to the scheduler; the sleeper observes the flip from
//! its suspend loop.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use alloc::{
    sync::{Arc, Weak},
    vec::Vec,
};

use crate::sync::spin::mutex::SpinMutex;
use crate::sync::wait_queue::{QueueId, WaitQueue};
use crate::trap::RegisterState;

use super::{
    allocator::{Tid, TidHandle},
    signal::{Signal, SignalAction, SignalFrame, SignalSet},
    process::{Process, Termination},
    tracer::{ThreadTracer, TracePhase},
    Scheduler,
};

/// What a blocked thread waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocker {
    WaitQueue(QueueId),
    /// Signal delivery in progress
    Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Runnable,
    Running,
    Blocked(Blocker),
    /// Must never return to user space again
    Dying,
    /// Reaped
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// The owning process is being torn down
    Death,
    /// An unmasked signal is pending
    Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockResult {
    Woken,
    Interrupted(InterruptReason),
}

impl BlockResult {
    pub fn was_interrupted(&self) -> bool {
        matches!(self, BlockResult::Interrupted(_))
    }
}

pub struct Thread {
    tid: TidHandle,
    process: Weak<Process>,
    scheduler: Arc<dyn Scheduler>,
    state: SpinMutex<ThreadState>,
    /// User context of a thread that is not currently trapped
    saved_regs: SpinMutex<RegisterState>,
    tracer: SpinMutex<Option<ThreadTracer>>,

    // - Signals
    pending_signals: AtomicU32,
    signal_mask: AtomicU32,
    signal_frames: SpinMutex<Vec<SignalFrame>>,

    syscall_count: AtomicU64,
    in_syscall: AtomicBool,
    death_requested: AtomicBool,
}

impl Thread {
    pub(crate) fn new(
        process: Weak<Process>,
        scheduler: Arc<dyn Scheduler>,
        regs: RegisterState,
        signal_mask: SignalSet,
    ) -> Arc<Self> {
        let thread = Arc::new(Self {
            tid: TidHandle::allocate(),
            process,
            scheduler,
            state: SpinMutex::new(ThreadState::Runnable),
            saved_regs: SpinMutex::new(regs),
            tracer: SpinMutex::new(None),
            pending_signals: AtomicU32::new(0),
            signal_mask: AtomicU32::new(signal_mask.bits()),
            signal_frames: SpinMutex::new(Vec::new()),
            syscall_count: AtomicU64::new(0),
            in_syscall: AtomicBool::new(false),
            death_requested: AtomicBool::new(false),
        });
        log::debug!("thread {} created", thread.tid());
        thread
    }

    #[inline(always)]
    pub fn tid(&self) -> Tid {
        self.tid.id()
    }

    pub fn process(&self) -> Option<Arc<Process>> {
        self.process.upgrade()
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub fn is_dying(&self) -> bool {
        matches!(self.state(), ThreadState::Dying | ThreadState::Dead)
    }

    pub fn saved_regs(&self) -> RegisterState {
        *self.saved_regs.lock()
    }

    pub fn set_saved_regs(&self, regs: RegisterState) {
        *self.saved_regs.lock() = regs;
    }

    // ========== Syscall bookkeeping ========== //

    /// Marks the thread as executing kernel code on behalf of a syscall.
    pub(crate) fn begin_syscall(&self) {
        self.in_syscall.store(true, Ordering::Release);
        let mut state = self.state.lock();
        if *state == ThreadState::Runnable {
            *state = ThreadState::Running;
        }
    }

    pub(crate) fn end_syscall(&self) {
        self.in_syscall.store(false, Ordering::Release);
    }

    pub fn in_syscall(&self) -> bool {
        self.in_syscall.load(Ordering::Acquire)
    }

    pub(crate) fn did_syscall(&self) {
        self.syscall_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn syscall_count(&self) -> u64 {
        self.syscall_count.load(Ordering::Relaxed)
    }

    // ========== Tracing ========== //

    pub fn attach_tracer(&self, tracer: ThreadTracer) {
        *self.tracer.lock() = Some(tracer);
    }

    pub fn detach_tracer(&self) -> Option<ThreadTracer> {
        self.tracer.lock().take()
    }

    pub fn is_tracing_syscalls(&self) -> bool {
        self.tracer
            .lock()
            .as_ref()
            .map_or(false, |t| t.trace_syscalls)
    }

    /// Runs one syscall stop if syscall tracing is armed.
    ///
    /// The flag is disarmed while the tracer runs and re-armed afterwards if
    /// a tracer is still attached.
    pub(crate) fn syscall_trace_stop(&self, regs: &mut RegisterState, phase: TracePhase) {
        let tracer = {
            let mut slot = self.tracer.lock();
            match slot.as_mut() {
                Some(attached) if attached.trace_syscalls => {
                    attached.trace_syscalls = false;
                    attached.tracer.clone()
                }
                _ => return,
            }
        };

        tracer.syscall_stop(self, regs, phase);

        if let Some(attached) = self.tracer.lock().as_mut() {
            attached.trace_syscalls = true;
        }
    }

    // ========== Signals ========== //

    pub fn signal_mask(&self) -> SignalSet {
        SignalSet::from_bits_truncate(self.signal_mask.load(Ordering::Acquire))
    }

    /// Replaces the blocked set. SIGKILL and SIGSTOP are silently kept out.
    pub fn set_signal_mask(&self, mask: SignalSet) -> SignalSet {
        let mask = mask.difference(SignalSet::UNMASKABLE);
        SignalSet::from_bits_truncate(self.signal_mask.swap(mask.bits(), Ordering::AcqRel))
    }

    pub fn pending_signals(&self) -> SignalSet {
        SignalSet::from_bits_truncate(self.pending_signals.load(Ordering::Acquire))
    }

    /// Marks `signal` pending on this thread.
    pub fn raise(&self, signal: Signal) {
        self.pending_signals
            .fetch_or(SignalSet::single(signal).bits(), Ordering::AcqRel);
    }

    fn unmasked_pending(&self) -> SignalSet {
        self.pending_signals().difference(self.signal_mask())
    }

    pub fn has_unmasked_pending_signals(&self) -> bool {
        !self.unmasked_pending().is_empty()
    }

    /// Removes and returns the lowest unmasked pending signal.
    fn take_unmasked_signal(&self) -> Option<Signal> {
        let signal = self.unmasked_pending().first()?;
        self.pending_signals
            .fetch_and(!SignalSet::single(signal).bits(), Ordering::AcqRel);
        Some(signal)
    }

    /// Delivers at most one pending unmasked signal.
    ///
    /// The thread is `Blocked(Signal)` while the disposition runs. A handler
    /// redirects `regs` to the user handler with the signal number in `a0`
    /// and the restorer in `ra`; the interrupted context is kept for
    /// `sigreturn`. A fatal default action terminates `process`.
    pub fn dispatch_signal(&self, process: &Arc<Process>, regs: &mut RegisterState) -> Option<Signal> {
        let signal = self.take_unmasked_signal()?;
        {
            let mut state = self.state.lock();
            if matches!(*state, ThreadState::Dying | ThreadState::Dead) {
                return Some(signal);
            }
            *state = ThreadState::Blocked(Blocker::Signal);
        }

        match process.signal_action(signal) {
            SignalAction::Handler { handler, restorer } => {
                let mask = self.signal_mask();
                self.signal_frames.lock().push(SignalFrame { regs: *regs, mask });
                self.set_signal_mask(mask.union(SignalSet::single(signal)));

                regs.set_ip(handler);
                regs.set_arg0(signal.number() as usize);
                regs.set_return_address(restorer);
                log::debug!("thread {}: {} -> handler {:#x}", self.tid(), signal, handler);
            }
            SignalAction::Ignore => {
                log::trace!("thread {}: {} ignored", self.tid(), signal);
            }
            SignalAction::Default if signal.is_fatal() => {
                log::info!("thread {}: {} ({})", self.tid(), signal, signal.description());
                process.terminate(Termination::Signaled(signal));
            }
            SignalAction::Default => {}
        }

        let mut state = self.state.lock();
        if *state == ThreadState::Blocked(Blocker::Signal) {
            *state = ThreadState::Running;
        }
        Some(signal)
    }

    /// Pops the context saved by the last handler delivery.
    pub(crate) fn pop_signal_frame(&self) -> Option<SignalFrame> {
        self.signal_frames.lock().pop()
    }

    pub fn signal_frame_depth(&self) -> usize {
        self.signal_frames.lock().len()
    }

    // ========== Death ========== //

    /// Asks the thread to die at its next safe point.
    ///
    /// A thread that is not inside a syscall holds no kernel resources and
    /// becomes `Dying` immediately, even while it sits on a wait queue.
    pub(crate) fn request_death(&self) {
        self.death_requested.store(true, Ordering::Release);
        if !self.in_syscall() {
            self.set_dying();
        }
    }

    pub fn death_requested(&self) -> bool {
        self.death_requested.load(Ordering::Acquire)
    }

    pub(crate) fn set_dying(&self) {
        let mut state = self.state.lock();
        if *state != ThreadState::Dead {
            *state = ThreadState::Dying;
        }
    }

    pub(crate) fn set_dead(&self) {
        *self.state.lock() = ThreadState::Dead;
        self.scheduler.remove_task(self);
    }

    /// Moves to `Dying` if death was requested. Returns whether the thread
    /// must not go back to user space.
    pub fn die_if_needed(&self) -> bool {
        if self.death_requested() {
            self.set_dying();
        }
        self.is_dying()
    }

    fn pending_interruption(&self) -> Option<InterruptReason> {
        if self.death_requested() {
            Some(InterruptReason::Death)
        } else if self.has_unmasked_pending_signals() {
            Some(InterruptReason::Signal)
        } else {
            None
        }
    }

    // ========== Blocking ========== //

    /// Records that the thread sits on queue `id`. Called with the queue locked.
    pub(crate) fn block_on_queue(&self, id: QueueId) {
        let mut state = self.state.lock();
        debug_assert!(
            !matches!(*state, ThreadState::Blocked(Blocker::WaitQueue(_))),
            "thread {} already blocked: {:?}",
            self.tid(),
            *state
        );
        // A dying thread stays dying; wakers skip it
        if !matches!(*state, ThreadState::Dying | ThreadState::Dead) {
            *state = ThreadState::Blocked(Blocker::WaitQueue(id));
        }
    }

    /// `Blocked(WaitQueue(id))` -> `Runnable`. Called with the queue locked.
    ///
    /// Returns `false` for a stale entry, i.e. a thread no longer blocked on
    /// this queue.
    pub(crate) fn wake_from_queue(&self, id: QueueId) -> bool {
        self.wake_from_queue_with(id, || {})
    }

    /// Like [`Self::wake_from_queue`], running `before` under the state lock
    /// ahead of the flip.
    pub(crate) fn wake_from_queue_with(&self, id: QueueId, before: impl FnOnce()) -> bool {
        let mut state = self.state.lock();
        if *state == ThreadState::Blocked(Blocker::WaitQueue(id)) {
            before();
            *state = ThreadState::Runnable;
            true
        } else {
            false
        }
    }

    /// Blocks on `queue` until woken, interrupted by a signal or by death.
    pub fn wait_on(self: &Arc<Self>, queue: &WaitQueue) -> BlockResult {
        queue.enqueue(self);
        self.suspend(queue, true)
    }

    /// Blocks on `queue` until `condition` holds.
    ///
    /// The condition is re-checked after enqueueing, so a waker that changes
    /// it and wakes the queue between the first check and the enqueue cannot
    /// be missed.
    pub fn wait_until(
        self: &Arc<Self>,
        queue: &WaitQueue,
        mut condition: impl FnMut() -> bool,
    ) -> BlockResult {
        loop {
            if condition() {
                return BlockResult::Woken;
            }
            queue.enqueue(self);
            if condition() {
                self.cancel_wait(queue);
                return BlockResult::Woken;
            }
            match self.suspend(queue, true) {
                BlockResult::Woken => continue,
                interrupted => return interrupted,
            }
        }
    }

    /// Leaves `queue` without having been woken.
    pub(crate) fn cancel_wait(&self, queue: &WaitQueue) {
        queue.dequeue(self);
        let mut state = self.state.lock();
        if matches!(*state, ThreadState::Runnable | ThreadState::Blocked(_)) {
            *state = ThreadState::Running;
        }
    }

    /// Gives up the CPU until the state leaves `Blocked`.
    ///
    /// Uninterruptible waits only end by a wake or by the thread being forced
    /// to `Dying`.
    pub(crate) fn suspend(&self, queue: &WaitQueue, interruptible: bool) -> BlockResult {
        loop {
            {
                let mut state = self.state.lock();
                match *state {
                    ThreadState::Runnable | ThreadState::Running => {
                        *state = ThreadState::Running;
                        return BlockResult::Woken;
                    }
                    ThreadState::Dying | ThreadState::Dead => {
                        drop(state);
                        queue.dequeue(self);
                        return BlockResult::Interrupted(InterruptReason::Death);
                    }
                    ThreadState::Blocked(_) => {}
                }
            }

            if interruptible {
                if let Some(reason) = self.pending_interruption() {
                    return self.abandon_wait(queue, reason);
                }
            }

            self.scheduler.yield_now();
        }
    }

    fn abandon_wait(&self, queue: &WaitQueue, reason: InterruptReason) -> BlockResult {
        queue.dequeue(self);
        let mut state = self.state.lock();
        match *state {
            // A waker got to us first; keep its wakeup
            ThreadState::Runnable => {
                *state = ThreadState::Running;
                BlockResult::Woken
            }
            ThreadState::Blocked(_) | ThreadState::Running => {
                *state = ThreadState::Running;
                BlockResult::Interrupted(reason)
            }
            ThreadState::Dying | ThreadState::Dead => {
                BlockResult::Interrupted(InterruptReason::Death)
            }
        }
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid())
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        log::trace!("thread {} released", self.tid.id());
    }
}
