use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

/// `sstatus.SPP`: previous privilege was supervisor
const SSTATUS_SPP: usize = 1 << 8;
/// `sstatus.SPIE`: interrupts enabled after `sret`
const SSTATUS_SPIE: usize = 1 << 5;

// Register indices in the RISC-V integer register file
const RA: usize = 1;
const SP: usize = 2;
const A0: usize = 10;
const A1: usize = 11;
const A2: usize = 12;
const A7: usize = 17;

/// Saved user register state.
///
/// The layout is shared with the trap entry shim, which stores `x0..x31`,
/// `sstatus` and `sepc` in this order.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct RegisterState {
    pub x: [usize; 32], // General-purpose registers
    pub sstatus: usize, // Supervisor status register
    pub sepc: usize,    // Address of the trapping instruction
}

impl RegisterState {
    /// Initial user context starting at `entry` with stack pointer `sp`.
    pub fn new_user(entry: usize, sp: usize) -> Self {
        let mut regs = Self {
            x: [0; 32],
            // Return to U-mode with interrupts enabled
            sstatus: SSTATUS_SPIE & !SSTATUS_SPP,
            sepc: entry,
        };
        regs.set_sp(sp);
        regs
    }

    /// Syscall number, `a7`.
    #[inline]
    pub fn syscall_number(&self) -> usize {
        self.x[A7]
    }

    /// The three syscall argument words, `a0..a2`.
    #[inline]
    pub fn syscall_args(&self) -> [usize; 3] {
        [self.x[A0], self.x[A1], self.x[A2]]
    }

    /// Stores a syscall result into `a0`.
    #[inline]
    pub fn set_result(&mut self, value: isize) {
        self.x[A0] = value as usize;
    }

    #[inline]
    pub fn result(&self) -> isize {
        self.x[A0] as isize
    }

    #[inline]
    pub fn user_sp(&self) -> usize {
        self.x[SP]
    }

    pub fn set_sp(&mut self, sp: usize) {
        self.x[SP] = sp;
    }

    #[inline]
    pub fn ip(&self) -> usize {
        self.sepc
    }

    pub fn set_ip(&mut self, ip: usize) {
        self.sepc = ip;
    }

    pub fn set_return_address(&mut self, ra: usize) {
        self.x[RA] = ra;
    }

    pub fn return_address(&self) -> usize {
        self.x[RA]
    }

    /// Sets the first argument register for an upcall (signal handler entry).
    pub fn set_arg0(&mut self, value: usize) {
        self.x[A0] = value;
    }

    /// Steps over the `ecall` that raised the trap.
    #[inline]
    pub fn advance_past_syscall(&mut self) {
        self.sepc = self.sepc.wrapping_add(crate::config::ECALL_INSN_LEN);
    }
}

impl fmt::Debug for RegisterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sepc={:#018x} sstatus={:#x}", self.sepc, self.sstatus)?;
        for (i, chunk) in self.x.chunks(4).enumerate() {
            for (j, value) in chunk.iter().enumerate() {
                write!(f, "x{:<2}={:#018x} ", i * 4 + j, value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The record the trap entry shim hands to the gate.
///
/// It refers to the register snapshot saved on the kernel stack of the
/// trapping thread and is only valid for the duration of that trap.
#[repr(C)]
pub struct TrapFrame<'a> {
    regs: NonNull<RegisterState>,
    _trap: PhantomData<&'a mut RegisterState>,
}

impl<'a> TrapFrame<'a> {
    pub fn new(regs: &'a mut RegisterState) -> Self {
        Self {
            regs: NonNull::from(regs),
            _trap: PhantomData,
        }
    }

    /// Builds a frame from the pointer passed by the assembly shim.
    ///
    /// # Safety
    /// `regs` must point to a valid, exclusively owned `RegisterState` that
    /// outlives `'a`.
    pub unsafe fn from_raw(regs: *mut RegisterState) -> Option<Self> {
        NonNull::new(regs).map(|regs| Self {
            regs,
            _trap: PhantomData,
        })
    }

    pub fn regs(&self) -> &RegisterState {
        // SAFETY: the frame was built from an exclusive borrow living for 'a
        unsafe { self.regs.as_ref() }
    }

    pub fn regs_mut(&mut self) -> &mut RegisterState {
        // SAFETY: as above, and `&mut self` keeps the access unique
        unsafe { self.regs.as_mut() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_macros::kernel_test;

    #[kernel_test]
    fn abi_registers() {
        let mut regs = RegisterState::new_user(0x1000, 0x8000);
        regs.x[17] = 8;
        regs.x[10] = 1;
        regs.x[11] = 2;
        regs.x[12] = 3;
        assert_eq!(regs.syscall_number(), 8);
        assert_eq!(regs.syscall_args(), [1, 2, 3]);
        assert_eq!(regs.user_sp(), 0x8000);

        regs.advance_past_syscall();
        assert_eq!(regs.ip(), 0x1004);
        regs.set_result(-38);
        assert_eq!(regs.result(), -38);
        assert_eq!(regs.sstatus & SSTATUS_SPP, 0);
    }

    #[kernel_test]
    fn frame_writes_through() {
        let mut regs = RegisterState::default();
        {
            let mut frame = TrapFrame::new(&mut regs);
            frame.regs_mut().set_result(7);
            assert_eq!(frame.regs().result(), 7);
        }
        assert_eq!(regs.x[10], 7);
    }
}
