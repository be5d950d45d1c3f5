//! Address-independent recording and deterministic replay of arena calls.
//!
//! A [`Recorder`] wraps an arena and appends every successful alloc,
//! realloc and free to an [`ActionLog`]. Actions name allocations by
//! logical slot, not by address, so the same log can be replayed against
//! a fresh arena with [`ActionLog::replay`] and the resulting counters
//! checked with [`replay_and_compare`].
//!
//! # Architecture
//!
//! - [`Recorder`] records calls as they happen
//! - [`ActionLog`] holds the actions and the logical slot table
//! - [`compare_stats`] and [`replay_and_compare`] verify determinism
//!
//! Logs live in memory only.
//!
//! ```
//! use strata_arena::{Alignment, Arena};
//! use strata_replay::{replay_and_compare, ActionLog, Recorder};
//!
//! let mut recorded = Arena::fixed_heap(vec![0u8; 256], Alignment::None)?;
//! let mut log = ActionLog::new();
//! let mut rec = Recorder::new(&mut log, &mut recorded);
//! let a = rec.alloc(24)?.expect("fits");
//! let b = rec.alloc(40)?.expect("fits");
//! rec.free(a, None)?;
//! rec.realloc(Some(b), 64, Some(40), Alignment::None)?;
//!
//! let mut fresh = Arena::fixed_heap(vec![0u8; 256], Alignment::None)?;
//! let report = replay_and_compare(&log, &mut fresh, &recorded.stats())?;
//! assert!(report.is_none());
//! # Ok::<(), strata_replay::ReplayError>(())
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod action;
pub mod action_log;
pub mod compare;
pub mod error;
pub mod recorder;

pub use action::{Action, ActionKind, LogicalAllocation};
pub use action_log::{ActionLog, Replayed};
pub use compare::{compare_stats, replay_and_compare, Counter, CounterDivergence, DivergenceReport};
pub use error::ReplayError;
pub use recorder::Recorder;
