use kernel_macros::syscall_handler;

use crate::mm::VirtAddr;
use crate::task::BlockResult;

use super::{Errno, SyscallContext, SyscallResult};

pub const FUTEX_WAIT: usize = 0;
pub const FUTEX_WAKE: usize = 1;

/// Futex-style wait/wake on a 32-bit user word.
///
/// - `FUTEX_WAIT`: sleeps if the word at `addr` still equals `value`,
///   `EAGAIN` otherwise
/// - `FUTEX_WAKE`: wakes up to `value` sleepers, oldest first, and returns
///   how many were woken
#[syscall_handler]
pub fn sys_futex(ctx: &SyscallContext<'_>, op: usize, addr: usize, value: usize) -> SyscallResult {
    let process = ctx.process();
    // Faults on unmapped or misaligned words for both operations
    let current = process.address_space().load_u32(VirtAddr(addr))?;

    match op {
        FUTEX_WAIT => {
            if current != value as u32 {
                return Err(Errno::EAGAIN);
            }
            let queue = process.futex_queue(addr);
            let result = ctx.block_on(&queue);
            drop(queue);
            process.release_futex_queue(addr);
            match result {
                BlockResult::Woken => Ok(0),
                BlockResult::Interrupted(_) => Err(Errno::EINTR),
            }
        }
        FUTEX_WAKE => {
            let woken = match process.existing_futex_queue(addr) {
                Some(queue) => queue.wake_n(value),
                None => 0,
            };
            process.release_futex_queue(addr);
            Ok(woken)
        }
        _ => Err(Errno::EINVAL),
    }
}
