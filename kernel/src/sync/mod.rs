//! Synchronisation primitives.
//!
//! - [`spin`]: busy-waiting locks for short, non-blocking critical sections
//! - [`rw`]: readers-writer spin lock
//! - [`wait_queue`]: FIFO of blocked threads, the building block for sleeping
//! - [`blocking`]: locks that put the caller to sleep on a [`WaitQueue`]

pub mod blocking;
pub mod rw;
pub mod spin;
pub mod wait_queue;

pub use wait_queue::{QueueId, WaitQueue};

#[cfg(test)]
mod test;
