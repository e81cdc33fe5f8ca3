//! Hosted [`Arch`] used when the gate runs outside a RISC-V machine, most
//! notably under the test harness.

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use super::Arch;

pub static HOST_ARCH: HostArch = HostArch::new();

#[cfg(test)]
std::thread_local! {
    static LOCAL_REARMS: core::cell::Cell<usize> = const { core::cell::Cell::new(0) };
}

/// Software model of the CPU state the gate touches.
pub struct HostArch {
    interrupts: AtomicBool,
    user_access_rearms: AtomicUsize,
    entropy: AtomicU64,
    syscall_vector: AtomicUsize,
}

impl HostArch {
    const NO_VECTOR: usize = usize::MAX;

    pub const fn new() -> Self {
        Self {
            interrupts: AtomicBool::new(true),
            user_access_rearms: AtomicUsize::new(0),
            entropy: AtomicU64::new(0x2545_F491_4F6C_DD1D),
            syscall_vector: AtomicUsize::new(Self::NO_VECTOR),
        }
    }

    /// How many times user-access protection has been re-armed.
    pub fn user_access_rearms(&self) -> usize {
        self.user_access_rearms.load(Ordering::Relaxed)
    }

    /// Re-arms performed by the calling test thread.
    #[cfg(test)]
    pub fn local_user_access_rearms(&self) -> usize {
        LOCAL_REARMS.with(|count| count.get())
    }

    pub fn syscall_vector(&self) -> Option<usize> {
        match self.syscall_vector.load(Ordering::Acquire) {
            Self::NO_VECTOR => None,
            vector => Some(vector),
        }
    }
}

impl Arch for HostArch {
    fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(Ordering::Acquire)
    }

    fn enable_interrupts(&self) {
        self.interrupts.store(true, Ordering::Release);
    }

    fn disable_interrupts(&self) {
        self.interrupts.store(false, Ordering::Release);
    }

    fn cpu_id(&self) -> usize {
        0
    }

    fn enforce_user_access_protection(&self) {
        self.user_access_rearms.fetch_add(1, Ordering::Relaxed);
        #[cfg(test)]
        LOCAL_REARMS.with(|count| count.set(count.get() + 1));
    }

    fn entropy(&self) -> u64 {
        // Weyl sequence; the consumer runs it through xorshift
        self.entropy
            .fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::Relaxed)
    }

    fn relax(&self) {
        #[cfg(test)]
        std::thread::yield_now();
        #[cfg(not(test))]
        core::hint::spin_loop();
    }

    #[allow(unused_variables)]
    fn console_putchar(&self, c: u8) {
        #[cfg(test)]
        {
            use std::io::Write;
            let _ = std::io::stderr().write_all(&[c]);
        }
    }

    fn bind_syscall_vector(&self, vector: usize) {
        self.syscall_vector.store(vector, Ordering::Release);
    }
}
