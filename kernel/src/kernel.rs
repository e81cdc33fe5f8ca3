//! The process table and the services handlers reach through it.

use alloc::{collections::BTreeMap, string::String, sync::Arc};

use crate::config::KernelConfig;
use crate::mm::AddressSpace;
use crate::sync::rw::RWLock;
use crate::sync::wait_queue::WaitQueue;
use crate::syscall::{Errno, SyscallTable, SYSCALL_TABLE};
use crate::task::{Pid, Process, Scheduler, Signal, SignalSet, Termination, Thread};
use crate::trap::RegisterState;

/// Why a process could not be reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapError {
    NoSuchProcess,
    NotTerminated,
    /// A thread is still unwinding or the big lock is held
    Busy,
}

pub struct Kernel {
    scheduler: Arc<dyn Scheduler>,
    table: &'static SyscallTable,
    processes: RWLock<BTreeMap<Pid, Arc<Process>>>,
    config: KernelConfig,
}

impl Kernel {
    pub fn new(scheduler: Arc<dyn Scheduler>, config: KernelConfig) -> Self {
        Self::with_table(scheduler, config, &SYSCALL_TABLE)
    }

    pub fn with_table(
        scheduler: Arc<dyn Scheduler>,
        config: KernelConfig,
        table: &'static SyscallTable,
    ) -> Self {
        Self {
            scheduler,
            table,
            processes: RWLock::new(BTreeMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn syscall_table(&self) -> &'static SyscallTable {
        self.table
    }

    pub fn new_wait_queue(&self) -> WaitQueue {
        WaitQueue::new(self.scheduler.clone())
    }

    // ========== Processes ========== //

    /// Creates a process without threads.
    pub fn spawn_process(
        &self,
        name: &str,
        address_space: Arc<dyn AddressSpace>,
        parent: Option<&Arc<Process>>,
    ) -> Arc<Process> {
        let process = Process::new(
            String::from(name),
            parent,
            address_space,
            self.scheduler.clone(),
        );
        if let Some(parent) = parent {
            parent.add_child(process.clone());
        }
        self.processes.write().insert(process.pid(), process.clone());
        process
    }

    /// Adds a thread starting from `regs` to `process` and makes it ready.
    pub fn spawn_thread(&self, process: &Arc<Process>, regs: RegisterState) -> Arc<Thread> {
        let thread = Thread::new(
            Arc::downgrade(process),
            self.scheduler.clone(),
            regs,
            SignalSet::EMPTY,
        );
        process.add_thread(thread.clone());
        self.scheduler.add_task(thread.clone());
        thread
    }

    /// Duplicates `parent` for `fork`.
    ///
    /// The child gets a copy of the address space and signal actions, and a
    /// single thread resuming from `regs` with 0 as its result and the
    /// caller's signal mask.
    pub fn fork_process(
        &self,
        parent: &Arc<Process>,
        thread: &Thread,
        regs: &RegisterState,
    ) -> Arc<Process> {
        let child = Process::new(
            String::from(parent.name()),
            Some(parent),
            parent.address_space().fork(),
            self.scheduler.clone(),
        );
        child.inherit_signal_actions(parent);

        let mut child_regs = *regs;
        child_regs.set_result(0);
        let child_thread = Thread::new(
            Arc::downgrade(&child),
            self.scheduler.clone(),
            child_regs,
            thread.signal_mask(),
        );
        child.add_thread(child_thread.clone());

        parent.add_child(child.clone());
        self.processes.write().insert(child.pid(), child.clone());
        self.scheduler.add_task(child_thread);
        log::debug!("process {} forked child {}", parent.pid(), child.pid());
        child
    }

    pub fn process(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.read().get(&pid).cloned()
    }

    pub fn process_count(&self) -> usize {
        self.processes.read().len()
    }

    /// Sends `signal` to process `pid`.
    pub fn kill(&self, pid: Pid, signal: Signal) -> Result<(), Errno> {
        let process = self.process(pid).ok_or(Errno::ESRCH)?;
        log::debug!("kill({}, {})", pid, signal);
        process.send_signal(signal);
        Ok(())
    }

    /// Removes a terminated process once nothing runs on its behalf anymore.
    pub fn reap(&self, pid: Pid) -> Result<Termination, ReapError> {
        let process = self.process(pid).ok_or(ReapError::NoSuchProcess)?;
        let termination = process.termination().ok_or(ReapError::NotTerminated)?;
        if !process.is_reapable() {
            return Err(ReapError::Busy);
        }

        process.mark_threads_dead();
        self.processes.write().remove(&pid);
        if let Some(parent) = process.parent() {
            parent.remove_child(pid);
        }
        log::debug!("process {} reaped: {:?}", pid, termination);
        Ok(termination)
    }
}
