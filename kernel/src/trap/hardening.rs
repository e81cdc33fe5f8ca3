//! Per-trap hardening: user-access protection and kernel stack jitter.
//!
//! The jitter moves the frame the syscall runs on by a random, 16-byte
//! aligned amount so that the kernel stack layout observed by one syscall
//! does not predict the next one.

use core::hint::black_box;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch;
use crate::config::{HardeningConfig, MAX_STACK_JITTER, STACK_JITTER_ALIGN};

static JITTER_STATE: AtomicU64 = AtomicU64::new(0x853C_49E6_748F_EA9B);

/// Runs the entry hooks enabled by `config`. Returns the stack offset to
/// apply, 0 when jitter is off.
pub fn on_kernel_entry(config: &HardeningConfig) -> usize {
    if config.user_access_protection {
        arch::current().enforce_user_access_protection();
    }
    if config.stack_jitter {
        random_stack_offset()
    } else {
        0
    }
}

/// A fresh offset in `0..=MAX_STACK_JITTER`, rounded down to
/// `STACK_JITTER_ALIGN`.
pub fn random_stack_offset() -> usize {
    let mut x = JITTER_STATE.load(Ordering::Relaxed) ^ arch::current().entropy();
    if x == 0 {
        x = 0x9E37_79B9_7F4A_7C15;
    }
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    JITTER_STATE.store(x, Ordering::Relaxed);
    (x as usize & MAX_STACK_JITTER) & !(STACK_JITTER_ALIGN - 1)
}

#[inline(never)]
fn pad<const N: usize, R>(f: impl FnOnce() -> R) -> R {
    let padding = [0u8; N];
    black_box(&padding);
    let result = f();
    black_box(&padding);
    result
}

macro_rules! jitter_dispatch {
    ($offset:expr, $f:expr; $($slot:literal),*) => {
        match $offset / STACK_JITTER_ALIGN {
            $($slot => pad::<{ $slot * STACK_JITTER_ALIGN }, _>($f),)*
            _ => unreachable!("stack offset {} out of range", $offset),
        }
    };
}

/// Runs `f` with the stack pointer lowered by `offset` bytes.
///
/// # Panics
/// If `offset` exceeds `MAX_STACK_JITTER`.
pub fn with_stack_jitter<R>(offset: usize, f: impl FnOnce() -> R) -> R {
    jitter_dispatch!(offset, f; 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15)
}
