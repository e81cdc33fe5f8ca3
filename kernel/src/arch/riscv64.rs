//! RISC-V (S-mode) [`Arch`].
//!
//! Assumes the boot code keeps the hart id in `tp` and that an SBI firmware
//! implementing the legacy console extension is present.

use core::arch::asm;

use super::Arch;

pub static RISCV_ARCH: RiscvArch = RiscvArch;

/// Supervisor interrupt enable
const SSTATUS_SIE: usize = 1 << 1;
/// Permit supervisor user memory access
const SSTATUS_SUM: usize = 1 << 18;

const SBI_CONSOLE_PUTCHAR: usize = 1;

pub struct RiscvArch;

impl Arch for RiscvArch {
    #[inline]
    fn interrupts_enabled(&self) -> bool {
        let sstatus: usize;
        unsafe { asm!("csrr {}, sstatus", out(reg) sstatus) };
        sstatus & SSTATUS_SIE != 0
    }

    #[inline]
    fn enable_interrupts(&self) {
        unsafe { asm!("csrs sstatus, {}", in(reg) SSTATUS_SIE) };
    }

    #[inline]
    fn disable_interrupts(&self) {
        unsafe { asm!("csrc sstatus, {}", in(reg) SSTATUS_SIE) };
    }

    #[inline(always)]
    fn cpu_id(&self) -> usize {
        let hartid: usize;
        unsafe { asm!("mv {}, tp", out(reg) hartid) };
        hartid
    }

    #[inline(always)]
    fn enforce_user_access_protection(&self) {
        unsafe { asm!("csrc sstatus, {}", in(reg) SSTATUS_SUM) };
    }

    fn entropy(&self) -> u64 {
        let time: u64;
        unsafe { asm!("rdtime {}", out(reg) time) };
        time
    }

    #[inline]
    fn relax(&self) {
        core::hint::spin_loop();
    }

    fn console_putchar(&self, c: u8) {
        unsafe {
            asm!(
                "ecall",
                inlateout("a0") c as usize => _,
                in("a7") SBI_CONSOLE_PUTCHAR,
            );
        }
    }

    fn bind_syscall_vector(&self, vector: usize) {
        // U-mode `ecall` always raises scause = 8 through stvec; the trampoline
        // installed at boot routes it here, nothing to program.
        log::debug!("syscall vector {} routed through stvec", vector);
    }
}
