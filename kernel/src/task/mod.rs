//! Processes, threads and the collaborators they are scheduled through.

mod allocator;
pub mod process;
pub mod scheduler;
pub mod signal;
pub mod thread;
pub mod tracer;

pub use allocator::{Pid, PidHandle, RecycleAllocator, Tid, TidHandle};
pub use process::{Process, Termination};
pub use scheduler::{FiFoScheduler, Scheduler};
pub use signal::{Signal, SignalAction, SignalError, SignalFrame, SignalSet};
pub use thread::{BlockResult, Blocker, InterruptReason, Thread, ThreadState};
pub use tracer::{ThreadTracer, TracePhase, Tracer};

#[cfg(test)]
mod test;
