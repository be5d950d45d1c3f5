//! Multi-strategy memory arenas.
//!
//! One [`Arena`] type covers seven allocation strategies behind the same
//! calls: `alloc`, `free`, `realloc`, and (for marked stacks) `push_mark` /
//! `pop_mark`. Arenas can draw their storage from other arenas through a
//! [`SharedArena`] handle.
//!
//! # Architecture
//!
//! ```text
//! Arena (counters, flags, default alignment)
//! ├── Redirect     → Box<dyn RawAllocator>
//! ├── Alias        → SharedArena (live pass-through)
//! ├── StdHeap      → SystemHeap block table
//! ├── FixedHeap    → Backing + FreeList records
//! ├── PagedHeap    → PageSource + Vec<Page { FreeList }>
//! ├── MarkedStack  → Backing + mark stack (SmallVec)
//! └── Buffer       → Backing + LIFO slot records (SmallVec)
//! ```
//!
//! # Errors
//!
//! Exhaustion is `Ok(None)`. Misuse (freeing from a marked stack, freeing
//! a buffer out of order, asking a heap forwarder for alignment, pushing
//! past the mark limit) is an [`ArenaError`], logged at `error` level.
//!
//! # Safety
//!
//! Handles are addresses taken from real storage, but all byte access goes
//! through bounds-checked slices. There is no `unsafe` in this crate.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arena;
pub mod backing;
mod buffer;
pub mod config;
pub mod error;
mod free_list;
pub mod paged;
mod stack;
pub mod stats;

// Public re-exports for the primary API surface.
pub use arena::{Arena, Freed, Reallocated};
pub use backing::{Backing, CarvedRegion, SharedArena};
pub use config::{ArenaFlags, PagedHeapConfig};
pub use error::ArenaError;
pub use paged::PageSource;
pub use stats::ArenaStats;
pub use strata_core::{Alignment, Allocation, Operation, RawAllocator, Strategy, SystemHeap};
