//! Region-list address space.
//!
//! `MemorySet` keeps the sorted user regions of one process together with a
//! sparse word store standing in for the backing frames, which is all the
//! gate and the futex path ever read.

use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};

use crate::config::USER_SPACE_END;
use crate::sync::rw::RWLock;
use crate::sync::spin::mutex::SpinMutex;

use super::{
    address::{VirtAddr, VirtRange},
    error::MemoryError,
    region::{MapPermission, Region},
    AddressSpace,
};

pub struct MemorySet {
    /// Non-overlapping, sorted by start address
    regions: RWLock<Vec<Region>>,
    words: SpinMutex<BTreeMap<usize, u32>>,
}

impl MemorySet {
    pub fn new_bare() -> Self {
        Self {
            regions: RWLock::new(Vec::new()),
            words: SpinMutex::new(BTreeMap::new()),
        }
    }

    /// Builds a set from `regions`, failing on the first invalid one.
    pub fn with_regions(regions: impl IntoIterator<Item = Region>) -> Result<Self, MemoryError> {
        let memory_set = Self::new_bare();
        for region in regions {
            memory_set.insert(region)?;
        }
        Ok(memory_set)
    }

    pub fn insert(&self, region: Region) -> Result<(), MemoryError> {
        let range = region.range();
        for bound in [range.start(), range.end()] {
            if !bound.is_page_aligned() {
                return Err(MemoryError::Misaligned {
                    address: bound.0,
                    alignment: crate::config::PAGE_SIZE,
                });
            }
        }
        if range.end().0 > USER_SPACE_END {
            return Err(MemoryError::AddressOutOfRange {
                address: range.end(),
                max_valid: VirtAddr(USER_SPACE_END),
            });
        }

        let mut regions = self.regions.write();
        if regions.iter().any(|r| r.range().overlaps(&range)) {
            return Err(MemoryError::Overlap(range));
        }
        let index = regions.partition_point(|r| r.range().start() < range.start());
        regions.insert(index, region);
        log::trace!("map {:?} {:?}", range, region.perm());
        Ok(())
    }

    /// Removes the region starting at `start`.
    pub fn remove(&self, start: VirtAddr) -> Option<Region> {
        let mut regions = self.regions.write();
        let index = regions.iter().position(|r| r.range().start() == start)?;
        let region = regions.remove(index);
        self.words
            .lock()
            .retain(|addr, _| !region.contains(VirtAddr(*addr)));
        Some(region)
    }

    /// Writes a user word, subject to the same checks as a user store.
    pub fn store_u32(&self, vaddr: VirtAddr, value: u32) -> Result<(), MemoryError> {
        self.check_word(vaddr, MapPermission::W | MapPermission::U)?;
        self.words.lock().insert(vaddr.0, value);
        Ok(())
    }

    fn check_word(&self, vaddr: VirtAddr, perm: MapPermission) -> Result<(), MemoryError> {
        if !vaddr.is_aligned(core::mem::size_of::<u32>()) {
            return Err(MemoryError::Misaligned {
                address: vaddr.0,
                alignment: core::mem::size_of::<u32>(),
            });
        }
        let range = VirtRange::from_len(vaddr, core::mem::size_of::<u32>())
            .ok_or(MemoryError::NotMapped(vaddr))?;
        self.check_range(range, perm)
    }
}

impl Default for MemorySet {
    fn default() -> Self {
        Self::new_bare()
    }
}

impl AddressSpace for MemorySet {
    fn region_from_vaddr(&self, vaddr: VirtAddr) -> Option<Region> {
        let regions = self.regions.read();
        let index = regions.partition_point(|r| r.range().end() <= vaddr);
        regions.get(index).filter(|r| r.contains(vaddr)).copied()
    }

    fn validate_user_stack(&self, sp: VirtAddr) -> bool {
        match self.region_from_vaddr(sp) {
            Some(region) => region.is_stack() && region.is_user() && region.is_writable(),
            None => false,
        }
    }

    fn check_range(&self, range: VirtRange, perm: MapPermission) -> Result<(), MemoryError> {
        if range.end().0 > USER_SPACE_END {
            return Err(MemoryError::AddressOutOfRange {
                address: range.start(),
                max_valid: VirtAddr(USER_SPACE_END),
            });
        }

        // Walk the regions covering the range; they must be contiguous
        let mut cursor = range.start();
        while cursor < range.end() {
            let region = self
                .region_from_vaddr(cursor)
                .ok_or(MemoryError::NotMapped(cursor))?;
            if !region.perm().contains(perm) {
                return Err(MemoryError::PermissionDenied {
                    address: cursor,
                    required: perm,
                });
            }
            cursor = region.range().end();
        }
        Ok(())
    }

    fn load_u32(&self, vaddr: VirtAddr) -> Result<u32, MemoryError> {
        self.check_word(vaddr, MapPermission::R | MapPermission::U)?;
        Ok(self.words.lock().get(&vaddr.0).copied().unwrap_or(0))
    }

    fn fork(&self) -> Arc<dyn AddressSpace> {
        Arc::new(Self {
            regions: RWLock::new(self.regions.read().clone()),
            words: SpinMutex::new(self.words.lock().clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_macros::kernel_test;

    fn range(start: usize, end: usize) -> VirtRange {
        VirtRange::new(VirtAddr(start), VirtAddr(end))
    }

    fn sample() -> MemorySet {
        MemorySet::with_regions([
            Region::code(range(0x1000, 0x3000)),
            Region::data(range(0x3000, 0x4000)),
            Region::stack(range(0x8000, 0xa000)),
        ])
        .unwrap()
    }

    #[kernel_test]
    fn lookup_and_stack_validation() {
        let ms = sample();
        assert!(ms.region_from_vaddr(VirtAddr(0x1004)).unwrap().is_executable());
        assert!(ms.region_from_vaddr(VirtAddr(0x5000)).is_none());
        assert!(ms.validate_user_stack(VirtAddr(0x9ff0)));
        assert!(!ms.validate_user_stack(VirtAddr(0x3010)));
        assert!(!ms.validate_user_stack(VirtAddr(0x7000)));
    }

    #[kernel_test]
    fn range_checks_span_adjacent_regions() {
        let ms = sample();
        let readable = MapPermission::R | MapPermission::U;
        assert!(ms.check_range(range(0x2000, 0x3800), readable).is_ok());
        assert_eq!(
            ms.check_range(range(0x2000, 0x3800), readable | MapPermission::W),
            Err(MemoryError::PermissionDenied {
                address: VirtAddr(0x2000),
                required: readable | MapPermission::W,
            })
        );
        assert_eq!(
            ms.check_range(range(0x3800, 0x4800), readable),
            Err(MemoryError::NotMapped(VirtAddr(0x4000)))
        );
    }

    #[kernel_test]
    fn rejects_overlap_and_misalignment() {
        let ms = sample();
        assert!(matches!(
            ms.insert(Region::data(range(0x2000, 0x5000))),
            Err(MemoryError::Overlap(_))
        ));
        assert!(matches!(
            ms.insert(Region::data(range(0x5008, 0x6000))),
            Err(MemoryError::Misaligned { .. })
        ));
    }

    #[kernel_test]
    fn words_follow_permissions_and_fork() {
        let ms = sample();
        ms.store_u32(VirtAddr(0x3010), 7).unwrap();
        assert_eq!(ms.load_u32(VirtAddr(0x3010)), Ok(7));
        assert_eq!(ms.load_u32(VirtAddr(0x3014)), Ok(0));
        assert!(ms.store_u32(VirtAddr(0x1000), 1).is_err());
        assert!(ms.load_u32(VirtAddr(0x3011)).is_err());

        let child = ms.fork();
        ms.store_u32(VirtAddr(0x3010), 8).unwrap();
        assert_eq!(child.load_u32(VirtAddr(0x3010)), Ok(7));
    }
}
