//! The action log: recording side and replay side.

use indexmap::IndexMap;
use strata_arena::{Arena, ArenaStats};
use strata_core::{Alignment, Allocation};

use crate::action::{Action, LogicalAllocation};
use crate::error::ReplayError;

/// An address-independent script of arena calls.
///
/// Recording appends one [`Action`] per call and keeps a table of logical
/// slots. Every alloc, and every realloc whose result differs from its
/// input, opens a new slot; a realloc that returns its input reuses the
/// slot. Handles live only in the table, never in the actions, so the
/// log can be replayed against any arena.
#[derive(Clone, Debug, Default)]
pub struct ActionLog {
    actions: Vec<Action>,
    slots: Vec<LogicalAllocation>,
    /// Live handles from the recording arena, in allocation order.
    live: IndexMap<Allocation, usize>,
}

/// Result of replaying a log.
#[derive(Clone, Debug)]
pub struct Replayed {
    /// The slot table as rebuilt against the replay arena.
    pub slots: Vec<LogicalAllocation>,
    /// Replay arena counters after the last action.
    pub stats: ArenaStats,
}

impl Replayed {
    /// Slots still holding an allocation.
    pub fn live_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_live()).count()
    }
}

fn slot_mut(
    slots: &mut [LogicalAllocation],
    index: usize,
) -> Result<&mut LogicalAllocation, ReplayError> {
    let count = slots.len();
    slots.get_mut(index).ok_or(ReplayError::UnknownSlot {
        index,
        slots: count,
    })
}

fn live_handle(
    slots: &mut [LogicalAllocation],
    action: usize,
    index: usize,
) -> Result<Allocation, ReplayError> {
    slot_mut(slots, index)?
        .handle
        .ok_or_else(|| ReplayError::Diverged {
            action,
            detail: format!("slot {index} holds no allocation"),
        })
}

impl ActionLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from a list of actions, checking that every slot index
    /// is consistent with the order in which slots are opened.
    ///
    /// The resulting log has no live handles; it can be replayed but not
    /// recorded into further.
    pub fn from_actions(actions: Vec<Action>) -> Result<Self, ReplayError> {
        let mut slots: Vec<LogicalAllocation> = Vec::new();
        for (index, action) in actions.iter().enumerate() {
            let malformed = |detail: String| ReplayError::Malformed {
                detail: format!("action {index}: {detail}"),
            };
            let count = slots.len();
            let referenced = match *action {
                Action::Alloc { .. } => None,
                Action::Realloc { old_slot, .. } => old_slot,
                Action::Free { slot, .. } => Some(slot),
            };
            if let Some(slot) = referenced {
                if slot >= count {
                    return Err(ReplayError::UnknownSlot { index: slot, slots: count });
                }
            }
            if action.opens_slot() {
                if action.slot() != count {
                    return Err(malformed(format!(
                        "opens slot {} but the next slot is {count}",
                        action.slot()
                    )));
                }
                let original_size = match *action {
                    Action::Alloc { size, .. } => size,
                    Action::Realloc { new_size, .. } => new_size,
                    Action::Free { .. } => 0,
                };
                slots.push(LogicalAllocation {
                    original_size,
                    handle: None,
                });
            }
        }
        Ok(Self {
            actions,
            slots,
            live: IndexMap::new(),
        })
    }

    /// Recorded actions, oldest first.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Number of recorded actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of logical slots opened so far.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The recording-side slot table.
    pub fn slots(&self) -> &[LogicalAllocation] {
        &self.slots
    }

    /// Slot currently holding `allocation` in the recording arena.
    pub fn slot_of(&self, allocation: Allocation) -> Option<usize> {
        self.live.get(&allocation).copied()
    }

    /// Live recording-side handles with their slots, oldest first.
    pub fn live(&self) -> impl Iterator<Item = (Allocation, usize)> + '_ {
        self.live.iter().map(|(&a, &slot)| (a, slot))
    }

    fn open_slot(&mut self, original_size: usize, handle: Option<Allocation>) -> usize {
        let slot = self.slots.len();
        self.slots.push(LogicalAllocation {
            original_size,
            handle,
        });
        if let Some(handle) = handle {
            self.live.insert(handle, slot);
        }
        slot
    }

    fn take_live(&mut self, allocation: Allocation) -> Result<usize, ReplayError> {
        let slot = self
            .live
            .shift_remove(&allocation)
            .ok_or(ReplayError::UnknownAllocation {
                address: allocation.addr(),
            })?;
        if let Some(entry) = self.slots.get_mut(slot) {
            entry.handle = None;
        }
        Ok(slot)
    }

    /// Record a successful allocation. Returns its slot.
    pub fn record_alloc(&mut self, size: usize, alignment: Alignment, result: Allocation) -> usize {
        let slot = self.open_slot(size, Some(result));
        self.actions.push(Action::Alloc {
            slot,
            size,
            alignment,
        });
        slot
    }

    /// Record a realloc of `allocation` that returned `result`.
    ///
    /// Returns the slot holding the result, or `None` when the call was a
    /// realloc of nothing to nothing, which is not recorded.
    pub fn record_realloc(
        &mut self,
        allocation: Option<Allocation>,
        new_size: usize,
        old_size: Option<usize>,
        alignment: Alignment,
        result: Option<Allocation>,
    ) -> Result<Option<usize>, ReplayError> {
        if allocation.is_none() && result.is_none() {
            return Ok(None);
        }
        let old_slot = match allocation {
            Some(old) => Some(
                self.slot_of(old)
                    .ok_or(ReplayError::UnknownAllocation { address: old.addr() })?,
            ),
            None => None,
        };
        let slot = match (allocation, result) {
            (Some(old), Some(new)) if old == new => old_slot,
            _ => None,
        };
        let slot = match slot {
            Some(slot) => slot,
            None => {
                if let Some(old) = allocation {
                    self.take_live(old)?;
                }
                self.open_slot(new_size, result)
            }
        };
        self.actions.push(Action::Realloc {
            old_slot,
            slot,
            new_size,
            old_size,
            alignment,
        });
        Ok(Some(slot))
    }

    /// Record a free. Returns the freed slot.
    pub fn record_free(
        &mut self,
        allocation: Allocation,
        size: Option<usize>,
    ) -> Result<usize, ReplayError> {
        let slot = self.take_live(allocation)?;
        self.actions.push(Action::Free { slot, size });
        Ok(slot)
    }

    /// Perform every action, in order, against `arena`.
    ///
    /// The slot table is rebuilt from scratch with the handles `arena`
    /// returns. Fails with [`ReplayError::Diverged`] if an allocation that
    /// succeeded during recording fails here, or a realloc that kept its
    /// handle during recording moves here.
    pub fn replay(&self, arena: &mut Arena<'_>) -> Result<Replayed, ReplayError> {
        log::debug!(
            "replaying {} actions over {} slots against a {} arena",
            self.actions.len(),
            self.slots.len(),
            arena.strategy()
        );
        let mut slots = vec![
            LogicalAllocation {
                original_size: 0,
                handle: None,
            };
            self.slots.len()
        ];

        for (index, action) in self.actions.iter().enumerate() {
            log::trace!("replay #{index}: {action}");
            match *action {
                Action::Alloc {
                    slot,
                    size,
                    alignment,
                } => {
                    let handle = arena.alloc_aligned(size, alignment)?;
                    if handle.is_none() {
                        return Err(ReplayError::Diverged {
                            action: index,
                            detail: format!("allocation of {size} bytes failed"),
                        });
                    }
                    *slot_mut(&mut slots, slot)? = LogicalAllocation {
                        original_size: size,
                        handle,
                    };
                }
                Action::Realloc {
                    old_slot,
                    slot,
                    new_size,
                    old_size,
                    alignment,
                } => {
                    let old = match old_slot {
                        Some(old_slot) => Some(live_handle(&mut slots, index, old_slot)?),
                        None => None,
                    };
                    let result = arena.realloc(old, new_size, old_size, alignment)?.allocation;
                    if old_slot == Some(slot) {
                        if result != old {
                            return Err(ReplayError::Diverged {
                                action: index,
                                detail: format!(
                                    "realloc of slot {slot} moved, but kept its handle when recorded"
                                ),
                            });
                        }
                    } else {
                        if let Some(old_slot) = old_slot {
                            slot_mut(&mut slots, old_slot)?.handle = None;
                        }
                        *slot_mut(&mut slots, slot)? = LogicalAllocation {
                            original_size: new_size,
                            handle: result,
                        };
                    }
                }
                Action::Free { slot, size } => {
                    let handle = live_handle(&mut slots, index, slot)?;
                    arena.free(handle, size)?;
                    slot_mut(&mut slots, slot)?.handle = None;
                }
            }
        }

        Ok(Replayed {
            slots,
            stats: arena.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_test_utils::AlignedBuffer;

    fn handle(addr: usize) -> Allocation {
        Allocation::from_addr(addr).unwrap()
    }

    #[test]
    fn slots_follow_moves_and_reuse() {
        let mut log = ActionLog::new();
        let a = log.record_alloc(16, Alignment::None, handle(0x100));
        let b = log.record_alloc(8, Alignment::None, handle(0x200));
        assert_eq!((a, b), (0, 1));

        // In place: same slot.
        let kept = log
            .record_realloc(Some(handle(0x100)), 24, Some(16), Alignment::None, Some(handle(0x100)))
            .unwrap();
        assert_eq!(kept, Some(0));
        assert_eq!(log.slot_count(), 2);

        // Moved: new slot, old one emptied.
        let moved = log
            .record_realloc(Some(handle(0x200)), 64, Some(8), Alignment::None, Some(handle(0x300)))
            .unwrap();
        assert_eq!(moved, Some(2));
        assert!(!log.slots()[1].is_live());
        assert_eq!(log.slot_of(handle(0x300)), Some(2));

        assert_eq!(log.record_free(handle(0x100), None).unwrap(), 0);
        let live: Vec<_> = log.live().collect();
        assert_eq!(live, vec![(handle(0x300), 2)]);
    }

    #[test]
    fn free_of_untracked_handle_is_rejected() {
        let mut log = ActionLog::new();
        assert!(matches!(
            log.record_free(handle(0x40), None),
            Err(ReplayError::UnknownAllocation { address: 0x40 })
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn realloc_of_nothing_to_nothing_is_not_recorded() {
        let mut log = ActionLog::new();
        assert_eq!(
            log.record_realloc(None, 0, None, Alignment::None, None).unwrap(),
            None
        );
        assert!(log.is_empty());
    }

    #[test]
    fn from_actions_rejects_out_of_order_slots() {
        let actions = vec![Action::Alloc {
            slot: 1,
            size: 4,
            alignment: Alignment::None,
        }];
        assert!(matches!(
            ActionLog::from_actions(actions),
            Err(ReplayError::Malformed { .. })
        ));
        let actions = vec![Action::Free { slot: 0, size: None }];
        assert!(matches!(
            ActionLog::from_actions(actions),
            Err(ReplayError::UnknownSlot { index: 0, slots: 0 })
        ));
    }

    #[test]
    fn replay_fails_when_replay_arena_is_too_small() {
        let mut log = ActionLog::new();
        log.record_alloc(48, Alignment::None, handle(0x1000));

        let mut buf = AlignedBuffer::<32>::new();
        let mut arena = Arena::buffer(buf.as_mut_slice(), Alignment::None).unwrap();
        assert!(matches!(
            log.replay(&mut arena),
            Err(ReplayError::Diverged { action: 0, .. })
        ));
    }

    #[test]
    fn replay_rebuilds_the_slot_table() {
        let mut log = ActionLog::new();
        log.record_alloc(10, Alignment::None, handle(0x10));
        log.record_alloc(20, Alignment::Bytes8, handle(0x20));
        log.record_free(handle(0x20), Some(20)).unwrap();

        let mut buf = AlignedBuffer::<64>::new();
        let mut arena = Arena::buffer(buf.as_mut_slice(), Alignment::None).unwrap();
        let replayed = log.replay(&mut arena).unwrap();
        assert_eq!(replayed.slots.len(), 2);
        assert_eq!(replayed.live_slots(), 1);
        assert_eq!(replayed.stats.used, 10);
        assert_eq!(replayed.stats.num_allocations, 1);
    }
}
