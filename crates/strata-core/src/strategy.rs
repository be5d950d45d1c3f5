//! Strategy and operation tags.

use std::fmt;

/// The allocation algorithm behind an arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strategy {
    /// Forwards to an externally supplied allocate/free pair.
    Redirect,
    /// Forwards every call to another arena.
    Alias,
    /// Forwards to the process heap.
    StdHeap,
    /// First-fit free list over one fixed region.
    FixedHeap,
    /// First-fit free list over pages grown on demand.
    PagedHeap,
    /// Bump allocator with a bounded stack of rewind marks.
    MarkedStack,
    /// Bump allocator that frees in LIFO order only.
    Buffer,
}

impl Strategy {
    /// All strategies, in declaration order.
    pub const ALL: [Strategy; 7] = [
        Strategy::Redirect,
        Strategy::Alias,
        Strategy::StdHeap,
        Strategy::FixedHeap,
        Strategy::PagedHeap,
        Strategy::MarkedStack,
        Strategy::Buffer,
    ];

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Redirect => "Redirect",
            Self::Alias => "Alias",
            Self::StdHeap => "StdHeap",
            Self::FixedHeap => "FixedHeap",
            Self::PagedHeap => "PagedHeap",
            Self::MarkedStack => "MarkedStack",
            Self::Buffer => "Buffer",
        }
    }

    /// Whether individual allocations can be freed.
    ///
    /// `Alias` reports `true`; whether the call succeeds depends on its source.
    pub fn supports_freeing(self) -> bool {
        !matches!(self, Self::MarkedStack)
    }

    /// Whether `push_mark`/`pop_mark` are available.
    pub fn supports_marks(self) -> bool {
        matches!(self, Self::MarkedStack)
    }

    /// Whether per-allocation alignment can be honoured.
    pub fn supports_alignment(self) -> bool {
        !matches!(self, Self::Redirect | Self::StdHeap)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An arena operation, used to describe unsupported calls in errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `alloc`.
    Alloc,
    /// `free`.
    Free,
    /// `realloc`.
    Realloc,
    /// `push_mark`.
    PushMark,
    /// `pop_mark`.
    PopMark,
    /// `clear`.
    Clear,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Alloc => "alloc",
            Self::Free => "free",
            Self::Realloc => "realloc",
            Self::PushMark => "push_mark",
            Self::PopMark => "pop_mark",
            Self::Clear => "clear",
        };
        f.write_str(name)
    }
}
