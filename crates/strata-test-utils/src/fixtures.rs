//! Mock [`RawAllocator`]s.
//!
//! - [`CountingAllocator`] forwards to the system heap and counts calls.
//! - [`FailingAllocator`] succeeds a fixed number of times, then refuses.
//!   It can also be told to refuse every deallocation.

use strata_core::{Allocation, RawAllocator, SystemHeap};

/// Forwards to a [`SystemHeap`] and records how often it was called.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    pub heap: SystemHeap,
    pub allocations: usize,
    pub deallocations: usize,
    pub bytes_requested: usize,
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocations not yet returned.
    pub fn outstanding(&self) -> usize {
        self.allocations - self.deallocations
    }
}

impl RawAllocator for CountingAllocator {
    fn allocate(&mut self, size: usize) -> Option<Allocation> {
        let found = self.heap.allocate(size)?;
        self.allocations += 1;
        self.bytes_requested += size;
        Some(found)
    }

    fn deallocate(&mut self, allocation: Allocation) -> bool {
        let known = self.heap.deallocate(allocation);
        if known {
            self.deallocations += 1;
        }
        known
    }

    fn bytes(&self, at: Allocation, len: usize) -> Option<&[u8]> {
        self.heap.bytes(at, len)
    }

    fn bytes_mut(&mut self, at: Allocation, len: usize) -> Option<&mut [u8]> {
        self.heap.bytes_mut(at, len)
    }
}

/// Succeeds for the first `remaining` allocations, then reports exhaustion.
#[derive(Debug)]
pub struct FailingAllocator {
    pub heap: SystemHeap,
    pub remaining: usize,
    pub refuse_frees: bool,
}

impl FailingAllocator {
    pub fn after(successes: usize) -> Self {
        Self {
            heap: SystemHeap::new(),
            remaining: successes,
            refuse_frees: false,
        }
    }

    /// Keep every block it hands out; `deallocate` always reports failure.
    pub fn refusing_frees(mut self) -> Self {
        self.refuse_frees = true;
        self
    }
}

impl RawAllocator for FailingAllocator {
    fn allocate(&mut self, size: usize) -> Option<Allocation> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.heap.allocate(size)
    }

    fn deallocate(&mut self, allocation: Allocation) -> bool {
        !self.refuse_frees && self.heap.deallocate(allocation)
    }

    fn bytes(&self, at: Allocation, len: usize) -> Option<&[u8]> {
        self.heap.bytes(at, len)
    }

    fn bytes_mut(&mut self, at: Allocation, len: usize) -> Option<&mut [u8]> {
        self.heap.bytes_mut(at, len)
    }
}
