//! Error types for scratch pool operations.

use std::error::Error;
use std::fmt;

use strata_arena::ArenaError;

/// Errors from acquiring or releasing scratch arenas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScratchError {
    /// Every slot was either on the avoid list or in use by a `with` call.
    Exhausted {
        /// Number of slots in the pool.
        slots: usize,
    },
    /// The handle belongs to another pool, or to a pool that has since
    /// been torn down.
    ForeignSlot {
        /// Pool the handle was issued by.
        pool: u64,
        /// Slot index named by the handle.
        index: usize,
    },
    /// Release of a slot that holds no marks.
    NotHeld {
        /// Slot index.
        index: usize,
    },
    /// The pool (or a slot) is already borrowed on this thread.
    PoolBusy,
    /// The underlying arena rejected the operation.
    Arena(ArenaError),
}

impl fmt::Display for ScratchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { slots } => {
                write!(f, "no eligible scratch slot among {slots}")
            }
            Self::ForeignSlot { pool, index } => {
                write!(f, "scratch slot {index} of pool {pool} does not belong to this pool")
            }
            Self::NotHeld { index } => write!(f, "scratch slot {index} is not held"),
            Self::PoolBusy => write!(f, "scratch pool is already borrowed"),
            Self::Arena(e) => write!(f, "scratch arena: {e}"),
        }
    }
}

impl Error for ScratchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for ScratchError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}
