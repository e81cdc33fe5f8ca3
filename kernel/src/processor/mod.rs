//! Per-processor state.
//!
//! Each hart owns a [`ProcessorLocal`] holding the interrupt-nesting bookkeeping
//! used by critical sections and the per-trap hardening statistics. Only the
//! owning hart touches its entry, the atomics merely keep the type `Sync`.

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use alloc::vec::Vec;
use lazy_static::lazy_static;

use crate::arch;
use crate::config::CPU_NUM;
use crate::interrupt::InterruptState;

/// A unique identifier for a Processor core (hart) in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorId(usize);

impl From<ProcessorId> for usize {
    fn from(value: ProcessorId) -> Self {
        value.0
    }
}

lazy_static! {
    /// Per-CPU local data (lock-free access)
    static ref PROCESSORS_LOCAL: Vec<ProcessorLocal> = {
        log::info!("Initializing {} processors (local)", CPU_NUM);
        (0..CPU_NUM).map(|_| ProcessorLocal::new()).collect()
    };
}

pub struct ProcessorLocal {
    // - Interrupt

    /// Nesting counter for interrupt disable operations.
    interrupt_nest_cnt: AtomicUsize,
    /// Saved interrupt state for restoration when the outermost guard drops.
    is_enable_interrupt: AtomicBool,

    // - Trap statistics

    /// Syscall traps taken on this hart.
    syscall_traps: AtomicU64,
    /// Stack offset applied to the most recent trap.
    last_stack_offset: AtomicUsize,
}

impl ProcessorLocal {
    pub fn new() -> Self {
        Self {
            interrupt_nest_cnt: AtomicUsize::new(0),
            is_enable_interrupt: AtomicBool::new(true),
            syscall_traps: AtomicU64::new(0),
            last_stack_offset: AtomicUsize::new(0),
        }
    }

    // ========== Interrupt nesting ========== //
    pub fn get_saved_interrupt_state(&self) -> InterruptState {
        self.is_enable_interrupt.load(Ordering::Acquire).into()
    }

    pub fn set_saved_interrupt_state(&self, state: InterruptState) {
        self.is_enable_interrupt.store(state.into(), Ordering::Release);
    }

    /// Returns the nesting depth before the increment.
    pub fn increment_nest(&self) -> usize {
        self.interrupt_nest_cnt.fetch_add(1, Ordering::Acquire)
    }

    /// Returns the nesting depth before the decrement.
    pub fn decrement_nest(&self) -> usize {
        let old = self.interrupt_nest_cnt.fetch_sub(1, Ordering::Release);
        debug_assert!(old != 0, "unbalanced interrupt enable");
        old
    }

    pub fn nest_depth(&self) -> usize {
        self.interrupt_nest_cnt.load(Ordering::Acquire)
    }

    // ========== Trap statistics ========== //
    pub fn record_syscall_trap(&self, stack_offset: usize) {
        self.syscall_traps.fetch_add(1, Ordering::Relaxed);
        self.last_stack_offset.store(stack_offset, Ordering::Relaxed);
    }

    pub fn syscall_traps(&self) -> u64 {
        self.syscall_traps.load(Ordering::Relaxed)
    }

    pub fn last_stack_offset(&self) -> usize {
        self.last_stack_offset.load(Ordering::Relaxed)
    }
}

impl Default for ProcessorLocal {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the ID of the current Processor core.
#[inline(always)]
pub fn current_processor_id() -> ProcessorId {
    ProcessorId(arch::current().cpu_id())
}

/// Safe access to current CPU's local data
#[inline]
pub fn get_current_processor() -> &'static ProcessorLocal {
    let id = current_processor_id().0;
    &PROCESSORS_LOCAL[id]
}
