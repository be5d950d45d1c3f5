//! Strata: multi-strategy memory arenas for Rust.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Strata sub-crates. For most users, adding `strata` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use strata::prelude::*;
//!
//! // A 256-byte region that must be freed newest first.
//! let mut arena = Arena::buffer(vec![0u8; 256], Alignment::None).unwrap();
//! let header = arena.alloc_copy(b"head").unwrap().unwrap();
//! let body = arena.alloc(64).unwrap().unwrap();
//! assert_eq!(arena.used(), 68);
//! arena.free(body, Some(64)).unwrap();
//! assert_eq!(arena.read(header, 4).unwrap(), b"head");
//!
//! // A marked stack carved from a shared heap: pop the mark, lose everything after it.
//! let heap = Arena::std_heap().into_shared();
//! let region = Backing::carve(&heap, 1024).unwrap().unwrap();
//! let mut stack = Arena::marked_stack(region, 8, Alignment::Bytes16).unwrap();
//! let mark = stack.push_mark().unwrap();
//! stack.alloc(100).unwrap();
//! assert_eq!(stack.pop_mark().unwrap(), mark);
//! assert_eq!(stack.used(), 0);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `strata-core` | Handles, alignment, strategy tags, `RawAllocator` |
//! | [`arena`] | `strata-arena` | The `Arena` type, backings, configs, stats |
//! | [`scratch`] | `strata-scratch` | Per-thread scratch pools and guards |
//! | [`replay`] | `strata-replay` | Action logs, replay verification |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Allocation handles, alignment, and the allocator trait (`strata-core`).
pub use strata_core as types;

/// Arena strategies and their configuration (`strata-arena`).
///
/// Everything hangs off [`arena::Arena`]; construct one per strategy and
/// share it with [`arena::Arena::into_shared`] when other arenas should
/// draw from it.
pub use strata_arena as arena;

/// Thread-scoped scratch arenas (`strata-scratch`).
///
/// Call [`scratch::init_thread_scratch`] once per thread, then take nested
/// scopes with [`scratch::acquire_scratch`].
pub use strata_scratch as scratch;

/// Address-independent recording and replay (`strata-replay`).
pub use strata_replay as replay;

/// Common imports for typical Strata usage.
///
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use strata_core::{Alignment, Allocation, RawAllocator, Strategy};

    // Arenas
    pub use strata_arena::{
        Arena, ArenaError, ArenaFlags, ArenaStats, Backing, PageSource, PagedHeapConfig,
        SharedArena,
    };

    // Scratch
    pub use strata_scratch::{
        acquire_scratch, free_thread_scratch, init_thread_scratch, ScratchArena, ScratchConfig,
        ScratchError,
    };

    // Replay
    pub use strata_replay::{ActionLog, Recorder, ReplayError};
}
