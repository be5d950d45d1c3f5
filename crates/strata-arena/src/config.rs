//! Arena configuration parameters.

use strata_core::Alignment;

use crate::error::ArenaError;

/// Behaviour flags shared by every strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaFlags {
    /// Track high-water marks. Default: on.
    pub telemetry: bool,
    /// Refuse any allocation while one is already live.
    ///
    /// Used to wrap a single externally obtained block as an arena.
    pub single_alloc: bool,
}

impl Default for ArenaFlags {
    fn default() -> Self {
        Self {
            telemetry: true,
            single_alloc: false,
        }
    }
}

/// Configuration for a paged heap.
///
/// Pages are requested from the page source on demand. A request larger
/// than `page_size` gets a page of its own, sized to fit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagedHeapConfig {
    /// Size of each page in bytes.
    ///
    /// Default: 65_536. Must be non-zero.
    pub page_size: usize,

    /// Maximum number of pages held at once. `0` means unlimited.
    pub max_pages: usize,

    /// Default alignment for allocations.
    pub alignment: Alignment,

    /// Return emptied pages (other than the first) to the page source.
    ///
    /// Default: on.
    pub auto_free_pages: bool,
}

impl PagedHeapConfig {
    /// Default page size: 64 KiB.
    pub const DEFAULT_PAGE_SIZE: usize = 64 * 1024;

    /// Default page limit (unlimited).
    pub const DEFAULT_MAX_PAGES: usize = 0;

    /// Create a config with the given page size and defaults elsewhere.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            max_pages: Self::DEFAULT_MAX_PAGES,
            alignment: Alignment::None,
            auto_free_pages: true,
        }
    }

    /// Check the parameters before building an arena.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.page_size == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "page_size must be non-zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for PagedHeapConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PAGE_SIZE)
    }
}
