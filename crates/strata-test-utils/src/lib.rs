//! Test utilities and mock allocators for Strata development.
//!
//! Provides 64-byte aligned stack buffers (so alignment padding in tests is
//! deterministic), [`RawAllocator`](strata_core::RawAllocator) fixtures that
//! count or fail on demand, and a one-line test logger.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod fixtures;

pub use fixtures::{CountingAllocator, FailingAllocator};

/// A byte buffer whose first byte sits on a 64-byte boundary.
///
/// Every alignment an arena supports divides 64, so padding computed from
/// offsets into this buffer is the same on every run.
#[repr(C, align(64))]
pub struct AlignedBuffer<const N: usize>([u8; N]);

impl<const N: usize> AlignedBuffer<N> {
    pub fn new() -> Self {
        Self([0; N])
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> Default for AlignedBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Route `log` output to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_cache_line_aligned() {
        let buf = AlignedBuffer::<128>::new();
        assert_eq!(buf.as_slice().as_ptr() as usize % 64, 0);
        assert_eq!(buf.as_slice().len(), 128);
    }

    #[test]
    fn logging_init_is_idempotent() {
        init_logging();
        init_logging();
        log::debug!("logger installed");
    }
}
