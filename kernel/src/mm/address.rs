use core::fmt::{self, Debug};

use crate::config::{PAGE_SIZE, USER_SPACE_END};

#[derive(Copy, Clone, Ord, PartialEq, PartialOrd, Eq, Hash, Default)]
pub struct VirtAddr(pub usize);

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<usize> for VirtAddr {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<VirtAddr> for usize {
    fn from(value: VirtAddr) -> Self {
        value.0
    }
}

impl VirtAddr {
    pub fn is_aligned(&self, align: usize) -> bool {
        self.0 % align == 0
    }

    pub fn is_page_aligned(&self) -> bool {
        self.is_aligned(PAGE_SIZE)
    }

    pub fn is_user(&self) -> bool {
        self.0 < USER_SPACE_END
    }

    pub fn checked_add(&self, offset: usize) -> Option<VirtAddr> {
        self.0.checked_add(offset).map(VirtAddr)
    }
}

/// Half-open virtual address range `[start, end)`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct VirtRange {
    start: VirtAddr,
    end: VirtAddr,
}

impl VirtRange {
    /// # Panics
    /// If `end < start`.
    pub fn new(start: VirtAddr, end: VirtAddr) -> Self {
        assert!(start <= end, "inverted range {:?}..{:?}", start, end);
        Self { start, end }
    }

    /// `None` if `start + len` overflows the address space.
    pub fn from_len(start: VirtAddr, len: usize) -> Option<Self> {
        start.checked_add(len).map(|end| Self { start, end })
    }

    pub fn start(&self) -> VirtAddr {
        self.start
    }

    pub fn end(&self) -> VirtAddr {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end.0 - self.start.0
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, vaddr: VirtAddr) -> bool {
        self.start <= vaddr && vaddr < self.end
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn covers(&self, other: &VirtRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &VirtRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl Debug for VirtRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start.0, self.end.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_macros::kernel_test;

    #[kernel_test]
    fn range_relations() {
        let outer = VirtRange::new(VirtAddr(0x1000), VirtAddr(0x3000));
        let inner = VirtRange::from_len(VirtAddr(0x1800), 0x100).unwrap();
        let tail = VirtRange::new(VirtAddr(0x3000), VirtAddr(0x4000));

        assert!(outer.covers(&inner));
        assert!(outer.overlaps(&inner));
        assert!(!outer.overlaps(&tail));
        assert!(outer.contains(VirtAddr(0x2fff)));
        assert!(!outer.contains(VirtAddr(0x3000)));
        assert_eq!(outer.len(), 0x2000);
        assert!(VirtRange::from_len(VirtAddr(usize::MAX), 2).is_none());
    }
}
