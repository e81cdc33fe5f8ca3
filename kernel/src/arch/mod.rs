//! Architecture hooks consumed by the portable core.
//!
//! Everything the gate needs from the CPU goes through [`Arch`]: interrupt
//! control for critical sections, the user-memory-access protection that is
//! re-armed on every kernel entry, a cheap entropy source for stack jitter and
//! the console. The platform installs its implementation once during boot;
//! until then a default matching the build target is used.

pub mod host;
#[cfg(target_arch = "riscv64")]
pub mod riscv64;

/// CPU services required by the trap path and the sync primitives.
pub trait Arch: Sync {
    /// Whether interrupts are currently enabled on this CPU.
    fn interrupts_enabled(&self) -> bool;

    fn enable_interrupts(&self);

    fn disable_interrupts(&self);

    /// Index of the executing CPU, below [`crate::config::CPU_NUM`].
    fn cpu_id(&self) -> usize;

    /// Re-enables strict supervisor checking of user memory accesses
    /// (x86 `clac`, RISC-V clearing `sstatus.SUM`).
    fn enforce_user_access_protection(&self);

    /// A fast, non-cryptographic entropy sample.
    fn entropy(&self) -> u64;

    /// Called from busy-wait loops and by schedulers with nothing to switch to.
    fn relax(&self);

    fn console_putchar(&self, c: u8);

    /// Routes the syscall trap vector to the gate.
    fn bind_syscall_vector(&self, vector: usize);
}

static ARCH: spin::Once<&'static dyn Arch> = spin::Once::new();

/// Installs the platform's [`Arch`].
///
/// Returns `false` if an implementation was already installed (or the default
/// was already latched by an earlier call to [`current`]).
pub fn install(arch: &'static dyn Arch) -> bool {
    let mut installed = false;
    ARCH.call_once(|| {
        installed = true;
        arch
    });
    installed
}

/// The active [`Arch`].
#[inline]
pub fn current() -> &'static dyn Arch {
    *ARCH.call_once(default_arch)
}

#[cfg(target_arch = "riscv64")]
fn default_arch() -> &'static dyn Arch {
    &riscv64::RISCV_ARCH
}

#[cfg(not(target_arch = "riscv64"))]
fn default_arch() -> &'static dyn Arch {
    &host::HOST_ARCH
}
