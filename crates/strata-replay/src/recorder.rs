//! Recording arena calls as they happen.

use strata_arena::{Arena, Freed, Reallocated};
use strata_core::{Alignment, Allocation};

use crate::action_log::ActionLog;
use crate::error::ReplayError;

/// Forwards calls to an arena and records each one that succeeds.
///
/// Allocations that come back empty are not recorded: replaying them
/// would change nothing.
pub struct Recorder<'a, 'buf> {
    log: &'a mut ActionLog,
    arena: &'a mut Arena<'buf>,
}

impl<'a, 'buf> Recorder<'a, 'buf> {
    /// Record calls on `arena` into `log`.
    pub fn new(log: &'a mut ActionLog, arena: &'a mut Arena<'buf>) -> Self {
        Self { log, arena }
    }

    /// The arena being recorded, for reads and writes that are not logged.
    pub fn arena(&mut self) -> &mut Arena<'buf> {
        &mut *self.arena
    }

    /// The log recorded so far.
    pub fn log(&self) -> &ActionLog {
        &*self.log
    }

    /// Allocate at the arena's default alignment.
    pub fn alloc(&mut self, size: usize) -> Result<Option<Allocation>, ReplayError> {
        self.alloc_aligned(size, Alignment::None)
    }

    /// Allocate with an alignment override.
    pub fn alloc_aligned(
        &mut self,
        size: usize,
        alignment: Alignment,
    ) -> Result<Option<Allocation>, ReplayError> {
        let result = self.arena.alloc_aligned(size, alignment)?;
        if let Some(allocation) = result {
            self.log.record_alloc(size, alignment, allocation);
        }
        Ok(result)
    }

    /// Resize, recording the move (or not) the arena chose.
    pub fn realloc(
        &mut self,
        allocation: Option<Allocation>,
        new_size: usize,
        old_size: Option<usize>,
        alignment: Alignment,
    ) -> Result<Reallocated, ReplayError> {
        if let Some(old) = allocation {
            if self.log.slot_of(old).is_none() {
                return Err(ReplayError::UnknownAllocation { address: old.addr() });
            }
        }
        let result = self.arena.realloc(allocation, new_size, old_size, alignment)?;
        self.log
            .record_realloc(allocation, new_size, old_size, alignment, result.allocation)?;
        Ok(result)
    }

    /// Free an allocation made through this recorder.
    pub fn free(&mut self, allocation: Allocation, size: Option<usize>) -> Result<Freed, ReplayError> {
        if self.log.slot_of(allocation).is_none() {
            return Err(ReplayError::UnknownAllocation {
                address: allocation.addr(),
            });
        }
        let freed = self.arena.free(allocation, size)?;
        self.log.record_free(allocation, size)?;
        Ok(freed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use strata_test_utils::AlignedBuffer;

    #[test]
    fn failed_allocations_are_not_recorded() {
        let mut buf = AlignedBuffer::<32>::new();
        let mut arena = Arena::buffer(buf.as_mut_slice(), Alignment::None).unwrap();
        let mut log = ActionLog::new();
        let mut rec = Recorder::new(&mut log, &mut arena);
        assert!(rec.alloc(16).unwrap().is_some());
        assert_eq!(rec.alloc(64).unwrap(), None);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn untracked_free_leaves_arena_alone() {
        let mut buf = AlignedBuffer::<64>::new();
        let mut arena = Arena::fixed_heap(buf.as_mut_slice(), Alignment::None).unwrap();
        let outside = arena.alloc(8).unwrap().unwrap();
        let mut log = ActionLog::new();
        let mut rec = Recorder::new(&mut log, &mut arena);
        assert!(matches!(
            rec.free(outside, None),
            Err(ReplayError::UnknownAllocation { .. })
        ));
        assert_eq!(arena.num_allocations(), 1);
    }

    #[test]
    fn realloc_records_slots() {
        let mut arena = Arena::std_heap();
        let mut log = ActionLog::new();
        let mut rec = Recorder::new(&mut log, &mut arena);
        let a = rec.alloc(8).unwrap().unwrap();
        let moved = rec.realloc(Some(a), 4096, Some(8), Alignment::None).unwrap();
        let b = moved.allocation.unwrap();
        rec.free(b, Some(4096)).unwrap();

        let actions = log.actions();
        assert_eq!(actions.len(), 3);
        let Action::Realloc { old_slot, slot, .. } = actions[1] else {
            panic!("expected a realloc, got {}", actions[1]);
        };
        assert_eq!(old_slot, Some(0));
        assert_eq!(actions[2].slot(), slot);
    }
}
