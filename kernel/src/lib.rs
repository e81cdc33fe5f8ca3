//! XUX kernel syscall gate
//!
//! The user-to-kernel transition and cooperative-blocking core of the XUX
//! kernel, kept free of board and page-table code so it builds both for the
//! RISC-V target and for the host test harness:
//! - Trap entry with hardening hooks
//! - Table-driven syscall dispatch under a per-process big lock
//! - `WaitQueue` based blocking and the thread state machine
//! - Signal delivery, `fork`, `waitpid` and futex-style waits
//!
//! # Architectural Overview
//! ```text
//! +-------------------+
//! |    User Space     |
//! +-------------------+   ecall (a7 = nr, a0..a2 = args)
//! |    Trap Entry     |   hardening, gettid fast path, validation
//! +-------------------+
//! | Syscall Dispatch  |   big lock, table lookup, tracer stops
//! +-------------------+
//! |  Process/Thread   |   WaitQueue, signals, scheduler yield
//! +-------------------+
//! |  Arch / MM hooks  |   interrupts, user-access protection, regions
//! +-------------------+
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod io;
pub mod arch;
pub mod config;
pub mod interrupt;
pub mod kernel;
pub mod mm;
pub mod processor;
pub mod sync;
pub mod syscall;
pub mod task;
pub mod trap;

pub use kernel::Kernel;

/// Brings up the ambient services the gate relies on.
///
/// Installs the console logger, builds the syscall table and binds the syscall
/// vector. Must be called once from the boot path before the first user trap.
pub fn init() {
    io::init();
    log::info!("Logger turn on");

    syscall::init();
    trap::init();
    log::info!("Trap initialize: [success]");
}
