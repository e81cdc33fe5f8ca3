use core::fmt;

use super::address::{VirtAddr, VirtRange};
use super::region::MapPermission;

/// Errors reported by the address-space checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// No region maps the address.
    NotMapped(VirtAddr),

    /// The region exists but lacks the requested permission.
    /// - `address`: first offending address
    /// - `required`: permission the access needed
    PermissionDenied {
        address: VirtAddr,
        required: MapPermission,
    },

    /// Address outside the user half.
    /// - `address`: offending address
    /// - `max_valid`: first address past user space
    AddressOutOfRange {
        address: VirtAddr,
        max_valid: VirtAddr,
    },

    /// Alignment requirement not met.
    Misaligned { address: usize, alignment: usize },

    /// A new region collides with an existing one.
    Overlap(VirtRange),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::NotMapped(address) => write!(f, "{} is not mapped", address),
            MemoryError::PermissionDenied { address, required } => {
                write!(f, "{} lacks {:?}", address, required)
            }
            MemoryError::AddressOutOfRange { address, max_valid } => {
                write!(f, "{} beyond user space end {}", address, max_valid)
            }
            MemoryError::Misaligned { address, alignment } => {
                write!(f, "{:#x} is not {}-byte aligned", address, alignment)
            }
            MemoryError::Overlap(range) => write!(f, "{:?} overlaps an existing region", range),
        }
    }
}
