//! Recorded actions and the logical allocation table.

use std::fmt;

use strata_core::{Alignment, Allocation};

/// Discriminant of an [`Action`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// A plain allocation.
    Alloc,
    /// A resize, possibly from nothing.
    Realloc,
    /// A free.
    Free,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alloc => "alloc",
            Self::Realloc => "realloc",
            Self::Free => "free",
        })
    }
}

/// One recorded arena call.
///
/// Allocations are named by logical slot index, never by address, so a
/// log replays the same way against any arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Allocate `size` bytes into a new slot.
    Alloc {
        /// Slot the allocation fills.
        slot: usize,
        /// Requested bytes.
        size: usize,
        /// Requested alignment override.
        alignment: Alignment,
    },
    /// Resize the allocation in `old_slot`.
    ///
    /// When the recording arena returned the same handle, `slot` equals
    /// `old_slot`. Otherwise the result (possibly nothing) went into a new
    /// slot and `old_slot` was emptied.
    Realloc {
        /// Slot being resized. `None` for a realloc from nothing.
        old_slot: Option<usize>,
        /// Slot holding the result.
        slot: usize,
        /// Requested bytes.
        new_size: usize,
        /// Caller-supplied old size.
        old_size: Option<usize>,
        /// Requested alignment override.
        alignment: Alignment,
    },
    /// Free the allocation in `slot`.
    Free {
        /// Slot being freed.
        slot: usize,
        /// Caller-supplied size.
        size: Option<usize>,
    },
}

impl Action {
    /// The kind of this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Alloc { .. } => ActionKind::Alloc,
            Self::Realloc { .. } => ActionKind::Realloc,
            Self::Free { .. } => ActionKind::Free,
        }
    }

    /// The slot this action writes or frees.
    pub fn slot(&self) -> usize {
        match *self {
            Self::Alloc { slot, .. } | Self::Realloc { slot, .. } | Self::Free { slot, .. } => slot,
        }
    }

    /// Whether this action fills a slot that did not exist before it.
    pub fn opens_slot(&self) -> bool {
        match *self {
            Self::Alloc { .. } => true,
            Self::Realloc { old_slot, slot, .. } => old_slot != Some(slot),
            Self::Free { .. } => false,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc {
                slot,
                size,
                alignment,
            } => write!(f, "alloc #{slot} {size}B align {alignment}"),
            Self::Realloc {
                old_slot,
                slot,
                new_size,
                ..
            } => match old_slot {
                Some(old) => write!(f, "realloc #{old} -> #{slot} {new_size}B"),
                None => write!(f, "realloc nothing -> #{slot} {new_size}B"),
            },
            Self::Free { slot, .. } => write!(f, "free #{slot}"),
        }
    }
}

/// One entry of the logical allocation table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogicalAllocation {
    /// Size requested when the slot was filled.
    pub original_size: usize,
    /// Current handle, or `None` once freed or moved away.
    pub handle: Option<Allocation>,
}

impl LogicalAllocation {
    /// Whether the slot still holds an allocation.
    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }
}
