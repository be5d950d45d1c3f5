//! Process-heap block table.
//!
//! [`SystemHeap`] hands out zero-initialised boxed slices from the global
//! allocator and keys them by address. It backs the `StdHeap` strategy and
//! is the default [`RawAllocator`] for redirect arenas and paged heaps.

use std::collections::BTreeMap;

use crate::alloc::Allocation;
use crate::raw::RawAllocator;

/// Live heap blocks, keyed by their start address.
#[derive(Debug, Default)]
pub struct SystemHeap {
    blocks: BTreeMap<usize, Box<[u8]>>,
}

impl SystemHeap {
    /// Create an empty block table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live blocks.
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total bytes across live blocks.
    pub fn live_bytes(&self) -> usize {
        self.blocks.values().map(|b| b.len()).sum()
    }

    /// Length of the block starting at `allocation`.
    pub fn block_len(&self, allocation: Allocation) -> Option<usize> {
        self.blocks.get(&allocation.addr()).map(|b| b.len())
    }

    /// Resize the block starting at `allocation` to `new_size` bytes,
    /// preserving the common prefix and zero-filling any growth.
    ///
    /// The block may move; the returned handle is its new start.
    /// Returns `None` if `allocation` is not a live block or `new_size`
    /// is zero.
    pub fn resize(&mut self, allocation: Allocation, new_size: usize) -> Option<Allocation> {
        if new_size == 0 {
            return None;
        }
        let block = self.blocks.remove(&allocation.addr())?;
        let mut bytes = block.into_vec();
        bytes.resize(new_size, 0);
        self.insert(bytes.into_boxed_slice())
    }

    fn insert(&mut self, block: Box<[u8]>) -> Option<Allocation> {
        let allocation = Allocation::from_addr(block.as_ptr() as usize)?;
        self.blocks.insert(allocation.addr(), block);
        Some(allocation)
    }

    /// Find the block containing `[at, at + len)` and the offset of `at`
    /// within it.
    fn locate(&self, at: Allocation, len: usize) -> Option<(usize, usize)> {
        let (&start, block) = self.blocks.range(..=at.addr()).next_back()?;
        let offset = at.addr() - start;
        let end = offset.checked_add(len)?;
        (end <= block.len()).then_some((start, offset))
    }
}

impl RawAllocator for SystemHeap {
    fn allocate(&mut self, size: usize) -> Option<Allocation> {
        if size == 0 {
            return None;
        }
        self.insert(vec![0u8; size].into_boxed_slice())
    }

    fn deallocate(&mut self, allocation: Allocation) -> bool {
        self.blocks.remove(&allocation.addr()).is_some()
    }

    fn bytes(&self, at: Allocation, len: usize) -> Option<&[u8]> {
        let (start, offset) = self.locate(at, len)?;
        self.blocks.get(&start).map(|b| &b[offset..offset + len])
    }

    fn bytes_mut(&mut self, at: Allocation, len: usize) -> Option<&mut [u8]> {
        let (start, offset) = self.locate(at, len)?;
        self.blocks
            .get_mut(&start)
            .map(|b| &mut b[offset..offset + len])
    }
}
