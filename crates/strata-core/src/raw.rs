//! The [`RawAllocator`] trait: an external allocate/free pair.
//!
//! Redirect arenas forward every call to one of these, and paged heaps can
//! draw their pages from one. Implementations own the memory they hand out
//! and expose it by address so the arena can read and write through it.

use crate::alloc::Allocation;

/// An external source of raw memory blocks.
pub trait RawAllocator {
    /// Allocate `size` bytes. `size` is never zero. Returns `None` when
    /// the allocator is exhausted.
    fn allocate(&mut self, size: usize) -> Option<Allocation>;

    /// Return a block previously produced by [`allocate`](Self::allocate).
    ///
    /// Returns `false` if `allocation` is not the start of a live block.
    fn deallocate(&mut self, allocation: Allocation) -> bool;

    /// View `len` bytes starting at `at`, which may point anywhere inside a
    /// live block. `None` if the range leaves the block.
    fn bytes(&self, at: Allocation, len: usize) -> Option<&[u8]>;

    /// Mutable counterpart of [`bytes`](Self::bytes).
    fn bytes_mut(&mut self, at: Allocation, len: usize) -> Option<&mut [u8]>;
}

impl<T: RawAllocator + ?Sized> RawAllocator for &mut T {
    fn allocate(&mut self, size: usize) -> Option<Allocation> {
        (**self).allocate(size)
    }

    fn deallocate(&mut self, allocation: Allocation) -> bool {
        (**self).deallocate(allocation)
    }

    fn bytes(&self, at: Allocation, len: usize) -> Option<&[u8]> {
        (**self).bytes(at, len)
    }

    fn bytes_mut(&mut self, at: Allocation, len: usize) -> Option<&mut [u8]> {
        (**self).bytes_mut(at, len)
    }
}

impl<T: RawAllocator + ?Sized> RawAllocator for Box<T> {
    fn allocate(&mut self, size: usize) -> Option<Allocation> {
        (**self).allocate(size)
    }

    fn deallocate(&mut self, allocation: Allocation) -> bool {
        (**self).deallocate(allocation)
    }

    fn bytes(&self, at: Allocation, len: usize) -> Option<&[u8]> {
        (**self).bytes(at, len)
    }

    fn bytes_mut(&mut self, at: Allocation, len: usize) -> Option<&mut [u8]> {
        (**self).bytes_mut(at, len)
    }
}
