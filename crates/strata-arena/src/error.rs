//! Arena-specific error types.
//!
//! Running out of space is not an error: allocation calls return
//! `Ok(None)` for that. Every variant here is a broken contract or a
//! corrupt arena, and is logged at `error` level where it is raised.

use std::error::Error;
use std::fmt;

use strata_core::{Alignment, Operation, Strategy};

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The operation is not available for this strategy.
    Unsupported {
        /// The attempted operation.
        operation: Operation,
        /// The arena's strategy.
        strategy: Strategy,
    },
    /// An alignment was requested from a strategy that cannot honour it.
    UnsupportedAlignment {
        /// The arena's strategy.
        strategy: Strategy,
        /// The requested alignment.
        alignment: Alignment,
    },
    /// A buffer free that does not target the most recent allocation.
    OutOfOrderFree {
        /// Address of the allocation being freed.
        address: usize,
        /// Address of the most recent live allocation, if any.
        expected: Option<usize>,
    },
    /// The free needs the allocation size and none was given.
    SizeRequired {
        /// Address of the allocation being freed.
        address: usize,
    },
    /// The caller-supplied size disagrees with the arena's records.
    SizeMismatch {
        /// Address of the allocation.
        address: usize,
        /// Size supplied by the caller.
        given: usize,
        /// Size recorded by the arena.
        actual: usize,
    },
    /// The address does not start a live allocation in this arena.
    UnknownAllocation {
        /// The offending address.
        address: usize,
    },
    /// The allocation was already freed.
    DoubleFree {
        /// The offending address.
        address: usize,
    },
    /// A byte range reaches outside the arena's storage.
    OutOfBounds {
        /// Start of the requested range.
        address: usize,
        /// Length of the requested range.
        len: usize,
    },
    /// An in-place resize asked to grow by shrinking, or the reverse, or
    /// to shrink to nothing.
    InvalidResize {
        /// Address of the allocation.
        address: usize,
        /// Current size.
        from: usize,
        /// Requested size.
        to: usize,
    },
    /// `push_mark` on a full mark stack.
    MarkCapacityExceeded {
        /// The configured maximum.
        max_marks: usize,
    },
    /// `pop_mark` with no marks pushed.
    NoMarks,
    /// `pop_mark_expecting` found a different mark on top.
    MarkMismatch {
        /// The mark the caller expected.
        expected: usize,
        /// The mark actually on top.
        found: usize,
    },
    /// Construction parameters are unusable.
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },
    /// A source arena is already borrowed (re-entrant or cyclic use).
    SourceBusy,
    /// Internal bookkeeping failed verification.
    Corrupt {
        /// What was inconsistent.
        detail: String,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported {
                operation,
                strategy,
            } => write!(f, "{operation} is not supported by {strategy} arenas"),
            Self::UnsupportedAlignment {
                strategy,
                alignment,
            } => write!(f, "{strategy} arenas cannot honour {alignment} alignment"),
            Self::OutOfOrderFree { address, expected } => match expected {
                Some(expected) => write!(
                    f,
                    "out-of-order free of {address:#x}: most recent allocation is {expected:#x}"
                ),
                None => write!(f, "out-of-order free of {address:#x}: buffer is empty"),
            },
            Self::SizeRequired { address } => {
                write!(f, "free of {address:#x} requires the allocation size")
            }
            Self::SizeMismatch {
                address,
                given,
                actual,
            } => write!(
                f,
                "size mismatch freeing {address:#x}: given {given} bytes, recorded {actual} bytes"
            ),
            Self::UnknownAllocation { address } => {
                write!(f, "{address:#x} is not a live allocation in this arena")
            }
            Self::DoubleFree { address } => write!(f, "double free of {address:#x}"),
            Self::OutOfBounds { address, len } => {
                write!(f, "range {address:#x}+{len} is outside the arena")
            }
            Self::InvalidResize { address, from, to } => {
                write!(f, "cannot resize {address:#x} in place from {from} to {to} bytes")
            }
            Self::MarkCapacityExceeded { max_marks } => {
                write!(f, "mark stack full ({max_marks} marks)")
            }
            Self::NoMarks => write!(f, "pop_mark with no marks pushed"),
            Self::MarkMismatch { expected, found } => {
                write!(f, "mark mismatch: expected {expected}, found {found}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid arena config: {reason}"),
            Self::SourceBusy => write!(f, "source arena is already borrowed"),
            Self::Corrupt { detail } => write!(f, "arena corrupt: {detail}"),
        }
    }
}

impl Error for ArenaError {}

/// Log a contract violation and hand it back for returning.
pub(crate) fn violation(err: ArenaError) -> ArenaError {
    log::error!("arena contract violation: {err}");
    err
}
