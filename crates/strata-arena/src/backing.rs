//! Backing storage for region-based strategies.
//!
//! FixedHeap, MarkedStack and Buffer arenas all hand out pieces of one
//! contiguous region. The region can be borrowed from the caller, owned
//! outright, or carved out of another arena. A carved region goes back
//! to its source when the arena is released or dropped.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use strata_core::{Alignment, Allocation};

use crate::arena::Arena;
use crate::error::{violation, ArenaError};

/// Shared handle to an arena that other arenas draw from.
pub type SharedArena<'buf> = Rc<RefCell<Arena<'buf>>>;

pub(crate) fn borrow_source<'a, 'buf>(
    source: &'a SharedArena<'buf>,
) -> Result<Ref<'a, Arena<'buf>>, ArenaError> {
    source
        .try_borrow()
        .map_err(|_| violation(ArenaError::SourceBusy))
}

pub(crate) fn borrow_source_mut<'a, 'buf>(
    source: &'a SharedArena<'buf>,
) -> Result<RefMut<'a, Arena<'buf>>, ArenaError> {
    source
        .try_borrow_mut()
        .map_err(|_| violation(ArenaError::SourceBusy))
}

/// The contiguous region behind a region-based arena.
pub enum Backing<'buf> {
    /// Caller-supplied storage that must outlive the arena.
    Borrowed(&'buf mut [u8]),
    /// Storage owned by the arena.
    Owned(Box<[u8]>),
    /// A block allocated from another arena.
    Carved(CarvedRegion<'buf>),
}

/// A block borrowed from a source arena for the lifetime of a backing.
pub struct CarvedRegion<'buf> {
    source: SharedArena<'buf>,
    start: Option<Allocation>,
    len: usize,
}

impl<'buf> CarvedRegion<'buf> {
    /// The arena this region came from.
    pub fn source(&self) -> &SharedArena<'buf> {
        &self.source
    }

    fn start_addr(&self) -> usize {
        self.start.map_or(0, Allocation::addr)
    }

    fn give_back(&mut self) -> Result<(), ArenaError> {
        if let Some(start) = self.start {
            borrow_source_mut(&self.source)?.free(start, Some(self.len))?;
            self.start = None;
        }
        Ok(())
    }
}

impl Drop for CarvedRegion<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.give_back() {
            log::warn!("carved region of {} bytes not returned to source: {err}", self.len);
        }
    }
}

impl<'buf> Backing<'buf> {
    /// Zero-filled storage of `len` bytes on the heap.
    pub fn heap(len: usize) -> Self {
        Self::Owned(vec![0u8; len].into_boxed_slice())
    }

    /// Allocate `len` bytes from `source`.
    ///
    /// Returns `Ok(None)` when the source is exhausted.
    pub fn carve(source: &SharedArena<'buf>, len: usize) -> Result<Option<Self>, ArenaError> {
        let start = borrow_source_mut(source)?.alloc(len)?;
        Ok(start.map(|start| {
            Self::Carved(CarvedRegion {
                source: Rc::clone(source),
                start: Some(start),
                len,
            })
        }))
    }

    /// Region length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Borrowed(bytes) => bytes.len(),
            Self::Owned(bytes) => bytes.len(),
            Self::Carved(region) => region.len,
        }
    }

    /// Whether the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address of the first byte.
    pub(crate) fn base_addr(&self) -> usize {
        match self {
            Self::Borrowed(bytes) => bytes.as_ptr() as usize,
            Self::Owned(bytes) => bytes.as_ptr() as usize,
            Self::Carved(region) => region.start_addr(),
        }
    }

    /// Handle for the byte at `offset`.
    pub(crate) fn at(&self, offset: usize) -> Option<Allocation> {
        Allocation::from_addr(self.base_addr() + offset)
    }

    /// Bump-allocate `size` bytes after the first `used`. Returns the handle
    /// and the bytes charged, padding included.
    pub(crate) fn bump(
        &self,
        used: usize,
        size: usize,
        align: Alignment,
    ) -> Option<(Allocation, usize)> {
        let pad = align.padding_for(self.base_addr() + used);
        let charged = pad.checked_add(size)?;
        if used.checked_add(charged)? > self.len() {
            return None;
        }
        Some((self.at(used + pad)?, charged))
    }

    /// Offset of `at` from the base, if `[at, at + len)` lies inside.
    pub(crate) fn offset_of(&self, at: Allocation, len: usize) -> Result<usize, ArenaError> {
        let out_of_bounds = || ArenaError::OutOfBounds {
            address: at.addr(),
            len,
        };
        let offset = at
            .addr()
            .checked_sub(self.base_addr())
            .ok_or_else(out_of_bounds)?;
        match offset.checked_add(len) {
            Some(end) if end <= self.len() => Ok(offset),
            _ => Err(out_of_bounds()),
        }
    }

    pub(crate) fn with_bytes<R>(
        &self,
        at: Allocation,
        len: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, ArenaError> {
        let offset = self.offset_of(at, len)?;
        match self {
            Self::Borrowed(bytes) => Ok(f(&bytes[offset..offset + len])),
            Self::Owned(bytes) => Ok(f(&bytes[offset..offset + len])),
            Self::Carved(region) => borrow_source(&region.source)?.with_bytes(at, len, f),
        }
    }

    pub(crate) fn with_bytes_mut<R>(
        &mut self,
        at: Allocation,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, ArenaError> {
        let offset = self.offset_of(at, len)?;
        match self {
            Self::Borrowed(bytes) => Ok(f(&mut bytes[offset..offset + len])),
            Self::Owned(bytes) => Ok(f(&mut bytes[offset..offset + len])),
            Self::Carved(region) => {
                borrow_source_mut(&region.source)?.with_bytes_mut(at, len, f)
            }
        }
    }

    /// Return a carved region to its source. A no-op for other backings.
    pub(crate) fn release(&mut self) -> Result<(), ArenaError> {
        match self {
            Self::Carved(region) => region.give_back(),
            _ => Ok(()),
        }
    }
}

impl<'buf> From<&'buf mut [u8]> for Backing<'buf> {
    fn from(bytes: &'buf mut [u8]) -> Self {
        Self::Borrowed(bytes)
    }
}

impl From<Box<[u8]>> for Backing<'_> {
    fn from(bytes: Box<[u8]>) -> Self {
        Self::Owned(bytes)
    }
}

impl From<Vec<u8>> for Backing<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Owned(bytes.into_boxed_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_bounds_checked() {
        let backing = Backing::heap(16);
        let base = backing.at(0).unwrap();
        assert_eq!(backing.offset_of(base.offset(4), 12).unwrap(), 4);
        assert!(backing.offset_of(base.offset(4), 13).is_err());
    }

    #[test]
    fn bytes_round_trip_through_owned_storage() {
        let mut backing = Backing::from(vec![0u8; 8]);
        let at = backing.at(2).unwrap();
        backing
            .with_bytes_mut(at, 3, |b| b.copy_from_slice(&[1, 2, 3]))
            .unwrap();
        let read = backing.with_bytes(at, 3, |b| b.to_vec()).unwrap();
        assert_eq!(read, vec![1, 2, 3]);
    }

    #[test]
    fn carved_region_returns_to_source_on_drop() {
        let source = Arena::std_heap().into_shared();
        {
            let backing = Backing::carve(&source, 32).unwrap().unwrap();
            assert_eq!(backing.len(), 32);
            assert_eq!(source.borrow().stats().num_allocations, 1);
        }
        assert_eq!(source.borrow().stats().num_allocations, 0);
        assert_eq!(source.borrow().stats().used, 0);
    }
}
