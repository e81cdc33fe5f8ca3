//! # Spin Locks Module
//!
//! Low-level busy-waiting locks built on [`lock_api`] raw mutexes.
//!
//! ## Implementations
//! - [`SpinMutex`](mutex::SpinMutex) - test-and-set spinlock
//! - [`IRQSpinLock`](mutex::IRQSpinLock) - spinlock that keeps interrupts
//!   disabled while held
//! - [`TicketMutex`](ticket::TicketMutex) - fair spinlock using the ticket
//!   algorithm, FIFO among contenders
//! - [`IRQTicketMutex`](ticket::IRQTicketMutex) - interrupt-disabling ticket lock
//!
//! ## Usage Guidelines
//! ```ignore
//! use kernel::sync::spin::mutex::SpinMutex;
//! let lock = SpinMutex::new(0);
//! *lock.lock() = 42;
//! ```
//!
//! Spinlocks MUST NOT be held across a scheduling point. Use the blocking
//! [`Mutex`](crate::sync::blocking::Mutex) when the critical section may sleep.

pub mod mutex;
pub mod ticket;
