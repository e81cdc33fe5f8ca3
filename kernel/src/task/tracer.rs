use alloc::sync::Arc;

use crate::trap::RegisterState;

use super::Thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracePhase {
    Entry,
    Exit,
}

/// A debugger-like observer attached to a thread.
pub trait Tracer: Send + Sync {
    /// Called on syscall entry and exit while syscall tracing is armed.
    /// The tracer may inspect and modify the user registers.
    fn syscall_stop(&self, thread: &Thread, regs: &mut RegisterState, phase: TracePhase);
}

/// Tracer attachment of one thread.
#[derive(Clone)]
pub struct ThreadTracer {
    pub tracer: Arc<dyn Tracer>,
    /// Stop on syscall entry and exit
    pub trace_syscalls: bool,
}

impl ThreadTracer {
    pub fn new(tracer: Arc<dyn Tracer>, trace_syscalls: bool) -> Self {
        Self {
            tracer,
            trace_syscalls,
        }
    }
}
