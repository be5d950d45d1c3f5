//! Error types for the replay system.

use std::fmt;

use strata_arena::ArenaError;

/// Errors that can occur while recording or replaying a log.
#[derive(Debug)]
pub enum ReplayError {
    /// A list of actions handed to [`ActionLog::from_actions`](crate::ActionLog::from_actions)
    /// does not form a consistent log.
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// A recorded realloc or free named a handle the log is not tracking.
    UnknownAllocation {
        /// The untracked address.
        address: usize,
    },
    /// An action names a logical slot outside the table.
    UnknownSlot {
        /// The slot index.
        index: usize,
        /// Number of slots in the table.
        slots: usize,
    },
    /// The replay arena behaved differently from the recording arena.
    Diverged {
        /// Index of the action that diverged.
        action: usize,
        /// What differed.
        detail: String,
    },
    /// The arena rejected an operation.
    Arena(ArenaError),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { detail } => write!(f, "malformed action log: {detail}"),
            Self::UnknownAllocation { address } => {
                write!(f, "{address:#x} is not a live allocation in this log")
            }
            Self::UnknownSlot { index, slots } => {
                write!(f, "slot {index} is outside the table of {slots} slots")
            }
            Self::Diverged { action, detail } => {
                write!(f, "replay diverged at action {action}: {detail}")
            }
            Self::Arena(e) => write!(f, "arena error: {e}"),
        }
    }
}

impl std::error::Error for ReplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for ReplayError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}
