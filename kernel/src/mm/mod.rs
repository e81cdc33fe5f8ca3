//! User address-space view consumed by the syscall gate.
//!
//! The gate never walks page tables. It asks an [`AddressSpace`] whether a
//! virtual address falls into a mapped user region and with which
//! permissions. [`MemorySet`] is the region-list implementation used by
//! processes created through [`Kernel`](crate::Kernel).

pub mod address;
pub mod error;
pub mod memory_set;
pub mod region;

use alloc::sync::Arc;

pub use address::{VirtAddr, VirtRange};
pub use error::MemoryError;
pub use memory_set::MemorySet;
pub use region::{MapPermission, Region};

/// Collaborator interface of the memory manager.
pub trait AddressSpace: Send + Sync {
    /// The region containing `vaddr`, if any.
    fn region_from_vaddr(&self, vaddr: VirtAddr) -> Option<Region>;

    /// Whether `sp` points into a user-accessible, writable stack region.
    fn validate_user_stack(&self, sp: VirtAddr) -> bool;

    /// Checks that `range` is entirely mapped, user-owned and grants at least `perm`.
    fn check_range(&self, range: VirtRange, perm: MapPermission) -> Result<(), MemoryError>;

    /// Reads the aligned 32-bit word at `vaddr` from user memory.
    fn load_u32(&self, vaddr: VirtAddr) -> Result<u32, MemoryError>;

    /// Duplicates the address space for a forked child.
    fn fork(&self) -> Arc<dyn AddressSpace>;
}
