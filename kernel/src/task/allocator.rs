use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::vec::Vec;
use lazy_static::lazy_static;

use crate::sync::spin::mutex::IRQSpinLock;

lazy_static! {
    // 0 is never handed out: it reads as "no parent" from getppid
    static ref PID_ALLOCATOR: RecycleAllocator = RecycleAllocator::starting_at(1);
    static ref TID_ALLOCATOR: RecycleAllocator = RecycleAllocator::starting_at(1);
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Pid(usize);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Tid(usize);

macro_rules! id_handle {
    ($handle:ident, $id:ident, $allocator:ident) => {
        impl From<$id> for usize {
            fn from(value: $id) -> Self {
                value.0
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl $id {
            /// Wraps a raw id received from user space. The id need not be live.
            pub fn from_raw(raw: usize) -> Self {
                Self(raw)
            }
        }

        /// Owns one id; the id is recycled when the handle drops.
        #[derive(Debug, PartialEq, Eq)]
        pub struct $handle($id);

        impl $handle {
            pub fn allocate() -> Self {
                Self($id($allocator.alloc()))
            }

            #[inline(always)]
            pub fn id(&self) -> $id {
                self.0
            }
        }

        impl Drop for $handle {
            fn drop(&mut self) {
                $allocator.dealloc((self.0).0);
            }
        }
    };
}

id_handle!(PidHandle, Pid, PID_ALLOCATOR);
id_handle!(TidHandle, Tid, TID_ALLOCATOR);

pub struct RecycleAllocator {
    current: AtomicUsize,
    first: usize,
    recycled: IRQSpinLock<Vec<usize>>,
}

impl RecycleAllocator {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: usize) -> Self {
        RecycleAllocator {
            current: AtomicUsize::new(first),
            first,
            recycled: IRQSpinLock::new(Vec::new()),
        }
    }

    pub fn alloc(&self) -> usize {
        if let Some(id) = self.recycled.lock().pop() {
            return id;
        }

        self.current.fetch_add(1, Ordering::AcqRel)
    }

    pub fn dealloc(&self, id: usize) {
        let mut recycled = self.recycled.lock();
        assert!(
            self.first <= id && id < self.current.load(Ordering::Acquire),
            "id {} was never allocated",
            id
        );
        assert!(
            !recycled.iter().any(|i| *i == id),
            "id {} has been deallocated!",
            id
        );
        recycled.push(id);
    }
}

impl Default for RecycleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_macros::kernel_test;

    #[kernel_test]
    fn recycles_released_ids() {
        let allocator = RecycleAllocator::starting_at(1);
        let a = allocator.alloc();
        let b = allocator.alloc();
        assert_eq!((a, b), (1, 2));
        allocator.dealloc(a);
        assert_eq!(allocator.alloc(), a);
        assert_eq!(allocator.alloc(), 3);
    }

    #[kernel_test]
    #[should_panic(expected = "has been deallocated")]
    fn double_free_panics() {
        let allocator = RecycleAllocator::new();
        let id = allocator.alloc();
        allocator.dealloc(id);
        allocator.dealloc(id);
    }

    #[kernel_test]
    fn handles_are_unique_while_alive() {
        let a = TidHandle::allocate();
        let b = TidHandle::allocate();
        assert_ne!(a.id(), b.id());
        assert_ne!(usize::from(a.id()), 0);
    }
}
