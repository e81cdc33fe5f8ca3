use bitflags::bitflags;

use super::address::{VirtAddr, VirtRange};

bitflags! {
    /// Access permissions of a user mapping, bit-compatible with the
    /// R/W/X/U bits of a RISC-V page-table entry.
    pub struct MapPermission: u8 {
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
    }
}

/// A contiguous mapping inside an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    range: VirtRange,
    perm: MapPermission,
    stack: bool,
}

impl Region {
    pub fn new(range: VirtRange, perm: MapPermission) -> Self {
        Self {
            range,
            perm,
            stack: false,
        }
    }

    /// User code: readable and executable, never writable.
    pub fn code(range: VirtRange) -> Self {
        Self::new(range, MapPermission::R | MapPermission::X | MapPermission::U)
    }

    pub fn data(range: VirtRange) -> Self {
        Self::new(range, MapPermission::R | MapPermission::W | MapPermission::U)
    }

    /// A user stack region.
    pub fn stack(range: VirtRange) -> Self {
        Self {
            stack: true,
            ..Self::data(range)
        }
    }

    pub fn range(&self) -> VirtRange {
        self.range
    }

    pub fn perm(&self) -> MapPermission {
        self.perm
    }

    pub fn is_stack(&self) -> bool {
        self.stack
    }

    pub fn is_user(&self) -> bool {
        self.perm.contains(MapPermission::U)
    }

    pub fn is_writable(&self) -> bool {
        self.perm.contains(MapPermission::W)
    }

    pub fn is_executable(&self) -> bool {
        self.perm.contains(MapPermission::X)
    }

    pub fn contains(&self, vaddr: VirtAddr) -> bool {
        self.range.contains(vaddr)
    }
}
