//! Compile-time constants and the runtime [`KernelConfig`].

pub const CPU_NUM: usize = 4;                     // Maximum number of harts
pub const PAGE_SIZE: usize = 4096;
pub const SYSCALL_VECTOR: usize = 8;              // scause of an ecall from U-mode
pub const ECALL_INSN_LEN: usize = 4;              // sepc advance past `ecall`
pub const MAX_STACK_JITTER: usize = 255;          // Upper bound of the per-trap stack offset
pub const STACK_JITTER_ALIGN: usize = 16;         // RISC-V psABI stack alignment
pub const USER_SPACE_END: usize = 0x40_0000_0000; // End of the Sv39 user half

/// Security hardening applied on every kernel entry.
///
/// Neither knob affects syscall semantics; switching them off is a security
/// regression and is only meant for bring-up and measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardeningConfig {
    /// Re-arm strict user-memory-access checking on entry.
    pub user_access_protection: bool,
    /// Randomise the kernel stack pointer per trap.
    pub stack_jitter: bool,
}

impl Default for HardeningConfig {
    fn default() -> Self {
        Self {
            user_access_protection: cfg!(feature = "hardening"),
            stack_jitter: cfg!(feature = "hardening"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelConfig {
    pub hardening: HardeningConfig,
}
