use alloc::{
    collections::BTreeMap,
    string::String,
    sync::{Arc, Weak},
    vec::Vec,
};

use crate::mm::AddressSpace;
use crate::sync::blocking::Mutex;
use crate::sync::spin::mutex::SpinMutex;
use crate::sync::wait_queue::WaitQueue;

use super::{
    allocator::{Pid, PidHandle},
    signal::{Signal, SignalAction, SignalError},
    Scheduler, Thread,
};

/// Signal numbers index the action table directly
const SIGNAL_SLOTS: usize = 32;

/// How a process ended. The first termination wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(Signal),
}

impl Termination {
    /// Encodes the termination the way `waitpid` reports it.
    pub fn wait_status(&self) -> usize {
        match self {
            Termination::Exited(code) => ((*code as usize) & 0xff) << 8,
            Termination::Signaled(signal) => signal.number() as usize & 0x7f,
        }
    }
}

pub struct Process {
    pid: PidHandle,
    name: String,
    parent: Weak<Process>,
    scheduler: Arc<dyn Scheduler>,

    /// Serialises syscalls of this process
    big_lock: Mutex<()>,
    address_space: Arc<dyn AddressSpace>,

    threads: SpinMutex<Vec<Arc<Thread>>>,
    children: SpinMutex<Vec<Arc<Process>>>,

    signal_actions: SpinMutex<[SignalAction; SIGNAL_SLOTS]>,
    /// Futex wait queues keyed by user address
    futex_queues: SpinMutex<BTreeMap<usize, Arc<WaitQueue>>>,
    /// Woken whenever a child terminates or finishes unwinding
    child_events: WaitQueue,

    termination: SpinMutex<Option<Termination>>,
}

impl Process {
    pub(crate) fn new(
        name: String,
        parent: Option<&Arc<Process>>,
        address_space: Arc<dyn AddressSpace>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        let process = Arc::new(Self {
            pid: PidHandle::allocate(),
            name,
            parent: parent.map_or_else(Weak::new, Arc::downgrade),
            big_lock: Mutex::new((), scheduler.clone()),
            address_space,
            threads: SpinMutex::new(Vec::new()),
            children: SpinMutex::new(Vec::new()),
            signal_actions: SpinMutex::new([SignalAction::Default; SIGNAL_SLOTS]),
            futex_queues: SpinMutex::new(BTreeMap::new()),
            child_events: WaitQueue::new(scheduler.clone()),
            termination: SpinMutex::new(None),
            scheduler,
        });
        log::debug!("process {} ({}) created", process.pid(), process.name);
        process
    }

    #[inline(always)]
    pub fn pid(&self) -> Pid {
        self.pid.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<Arc<Process>> {
        self.parent.upgrade()
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn big_lock(&self) -> &Mutex<()> {
        &self.big_lock
    }

    pub fn address_space(&self) -> &Arc<dyn AddressSpace> {
        &self.address_space
    }

    // ========== Threads and children ========== //

    pub fn threads(&self) -> Vec<Arc<Thread>> {
        self.threads.lock().clone()
    }

    pub(crate) fn add_thread(&self, thread: Arc<Thread>) {
        self.threads.lock().push(thread);
    }

    /// Threads that may still return to user space.
    pub fn live_threads(&self) -> usize {
        self.threads.lock().iter().filter(|t| !t.is_dying()).count()
    }

    pub fn children(&self) -> Vec<Arc<Process>> {
        self.children.lock().clone()
    }

    pub fn find_child(&self, pid: Pid) -> Option<Arc<Process>> {
        self.children.lock().iter().find(|c| c.pid() == pid).cloned()
    }

    pub(crate) fn add_child(&self, child: Arc<Process>) {
        self.children.lock().push(child);
    }

    pub(crate) fn remove_child(&self, pid: Pid) -> Option<Arc<Process>> {
        let mut children = self.children.lock();
        let index = children.iter().position(|c| c.pid() == pid)?;
        Some(children.remove(index))
    }

    pub fn child_events(&self) -> &WaitQueue {
        &self.child_events
    }

    // ========== Signals ========== //

    pub fn signal_action(&self, signal: Signal) -> SignalAction {
        self.signal_actions.lock()[signal.number() as usize]
    }

    /// Installs `action` for `signal`, returning the previous one.
    pub fn set_signal_action(
        &self,
        signal: Signal,
        action: SignalAction,
    ) -> Result<SignalAction, SignalError> {
        if signal.is_unmaskable() && action != SignalAction::Default {
            return Err(SignalError::Unmaskable(signal));
        }
        let mut actions = self.signal_actions.lock();
        Ok(core::mem::replace(&mut actions[signal.number() as usize], action))
    }

    pub(crate) fn inherit_signal_actions(&self, parent: &Process) {
        let actions = *parent.signal_actions.lock();
        *self.signal_actions.lock() = actions;
    }

    /// Generates `signal` for the process.
    ///
    /// SIGKILL terminates at once; ignored signals are discarded. Otherwise
    /// the signal is left pending on the first live thread not blocking it,
    /// or on the first live thread if all of them do.
    pub fn send_signal(&self, signal: Signal) {
        if signal == Signal::SIGKILL {
            self.terminate(Termination::Signaled(signal));
            return;
        }
        if self.signal_action(signal) == SignalAction::Ignore {
            return;
        }

        let threads = self.threads.lock();
        let mut live = threads.iter().filter(|t| !t.is_dying());
        let target = live
            .clone()
            .find(|t| !t.signal_mask().contains(signal))
            .or_else(|| live.next());
        match target {
            Some(thread) => thread.raise(signal),
            None => log::debug!("process {}: no thread left for {}", self.pid(), signal),
        }
    }

    // ========== Futex queues ========== //

    /// The wait queue for `addr`, created on first use.
    pub fn futex_queue(&self, addr: usize) -> Arc<WaitQueue> {
        self.futex_queues
            .lock()
            .entry(addr)
            .or_insert_with(|| Arc::new(WaitQueue::new(self.scheduler.clone())))
            .clone()
    }

    pub fn existing_futex_queue(&self, addr: usize) -> Option<Arc<WaitQueue>> {
        self.futex_queues.lock().get(&addr).cloned()
    }

    /// Drops the queue for `addr` once nobody waits on or holds it.
    pub fn release_futex_queue(&self, addr: usize) {
        let mut queues = self.futex_queues.lock();
        if let Some(queue) = queues.get(&addr) {
            if queue.is_empty() && Arc::strong_count(queue) == 1 {
                queues.remove(&addr);
            }
        }
    }

    // ========== Lifecycle ========== //

    pub fn termination(&self) -> Option<Termination> {
        *self.termination.lock()
    }

    pub fn is_terminated(&self) -> bool {
        self.termination().is_some()
    }

    /// Terminates the process. Returns `false` if it was already terminated.
    ///
    /// Every thread is asked to die; threads outside a syscall become `Dying`
    /// right away, the others at their next safe point. The parent is woken
    /// so that `waitpid` can observe the termination.
    pub fn terminate(&self, termination: Termination) -> bool {
        {
            let mut slot = self.termination.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(termination);
        }
        log::info!("process {} ({}) terminated: {:?}", self.pid(), self.name, termination);

        for thread in self.threads() {
            thread.request_death();
        }
        self.notify_parent();
        true
    }

    pub(crate) fn notify_parent(&self) {
        if let Some(parent) = self.parent() {
            parent.child_events.wake_all();
        }
    }

    /// Terminated, no thread left inside a syscall and the big lock free.
    pub fn is_reapable(&self) -> bool {
        self.is_terminated()
            && !self.big_lock.is_locked()
            && self
                .threads
                .lock()
                .iter()
                .all(|t| t.is_dying() && !t.in_syscall())
    }

    pub(crate) fn mark_threads_dead(&self) {
        for thread in self.threads.lock().drain(..) {
            thread.set_dead();
        }
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid())
            .field("name", &self.name)
            .finish()
    }
}
