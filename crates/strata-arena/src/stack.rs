//! Marked stack: bump allocation with a bounded stack of rewind marks.
//!
//! A mark is the `used` watermark at the time it was pushed. Popping it
//! rewinds `used` to that value, releasing everything allocated since in
//! one step. Marks are kept outside the region, so the whole region is
//! usable capacity.

use smallvec::SmallVec;
use strata_core::{Alignment, Allocation};

use crate::backing::Backing;
use crate::error::{violation, ArenaError};

pub(crate) struct MarkedRegion<'buf> {
    pub(crate) backing: Backing<'buf>,
    marks: SmallVec<[usize; 8]>,
    max_marks: usize,
    high_mark_count: usize,
}

impl<'buf> MarkedRegion<'buf> {
    pub(crate) fn new(backing: Backing<'buf>, max_marks: usize) -> Self {
        Self {
            backing,
            marks: SmallVec::new(),
            max_marks,
            high_mark_count: 0,
        }
    }

    pub(crate) fn alloc(
        &self,
        used: usize,
        size: usize,
        align: Alignment,
    ) -> Option<(Allocation, usize)> {
        self.backing.bump(used, size, align)
    }

    /// Whether `size` bytes at `allocation` can change length in place:
    /// they end exactly at `used` and start no lower than the top mark.
    /// The range must lie inside the used part of the region.
    pub(crate) fn can_resize(
        &self,
        used: usize,
        allocation: Allocation,
        size: usize,
    ) -> Result<bool, ArenaError> {
        let offset = self.backing.offset_of(allocation, size)?;
        if offset + size > used {
            return Err(violation(ArenaError::OutOfBounds {
                address: allocation.addr(),
                len: size,
            }));
        }
        let floor = self.marks.last().copied().unwrap_or(0);
        Ok(offset + size == used && offset >= floor)
    }

    pub(crate) fn num_marks(&self) -> usize {
        self.marks.len()
    }

    pub(crate) fn max_marks(&self) -> usize {
        self.max_marks
    }

    pub(crate) fn high_mark_count(&self) -> usize {
        self.high_mark_count
    }

    pub(crate) fn push(&mut self, used: usize) -> Result<(), ArenaError> {
        if self.marks.len() >= self.max_marks {
            return Err(violation(ArenaError::MarkCapacityExceeded {
                max_marks: self.max_marks,
            }));
        }
        self.marks.push(used);
        self.high_mark_count = self.high_mark_count.max(self.marks.len());
        Ok(())
    }

    /// Pop the top mark, optionally checking it first. Returns the
    /// watermark to rewind to.
    pub(crate) fn pop(&mut self, expected: Option<usize>) -> Result<usize, ArenaError> {
        let top = *self
            .marks
            .last()
            .ok_or_else(|| violation(ArenaError::NoMarks))?;
        if let Some(expected) = expected {
            if expected != top {
                return Err(violation(ArenaError::MarkMismatch {
                    expected,
                    found: top,
                }));
            }
        }
        self.marks.pop();
        Ok(top)
    }

    pub(crate) fn clear(&mut self) {
        self.marks.clear();
    }

    pub(crate) fn verify(&self, used: usize) -> Result<(), String> {
        if self.marks.len() > self.max_marks {
            return Err(format!(
                "{} marks exceed the limit of {}",
                self.marks.len(),
                self.max_marks
            ));
        }
        if self.marks.windows(2).any(|w| w[0] > w[1]) {
            return Err("marks are not monotonic".into());
        }
        match self.marks.last() {
            Some(&top) if top > used => Err(format!("top mark {top} is above used {used}")),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_beyond_capacity_leaves_marks_intact() {
        let mut region = MarkedRegion::new(Backing::heap(64), 2);
        region.push(0).unwrap();
        region.push(16).unwrap();
        assert!(matches!(
            region.push(32),
            Err(ArenaError::MarkCapacityExceeded { max_marks: 2 })
        ));
        assert_eq!(region.num_marks(), 2);
        assert_eq!(region.pop(None).unwrap(), 16);
        assert_eq!(region.pop(None).unwrap(), 0);
        assert!(matches!(region.pop(None), Err(ArenaError::NoMarks)));
        assert_eq!(region.high_mark_count(), 2);
    }

    #[test]
    fn expected_mark_is_checked_before_popping() {
        let mut region = MarkedRegion::new(Backing::heap(64), 4);
        region.push(8).unwrap();
        assert!(matches!(
            region.pop(Some(4)),
            Err(ArenaError::MarkMismatch {
                expected: 4,
                found: 8
            })
        ));
        assert_eq!(region.num_marks(), 1);
        assert_eq!(region.pop(Some(8)).unwrap(), 8);
    }

    #[test]
    fn only_the_top_allocation_above_the_mark_resizes() {
        let mut region = MarkedRegion::new(Backing::heap(64), 1);
        let (a, used) = region.alloc(0, 8, Alignment::None).unwrap();
        assert!(region.can_resize(used, a, 8).unwrap());
        assert!(!region.can_resize(used, a, 4).unwrap());
        assert!(matches!(
            region.can_resize(used, a, 12),
            Err(ArenaError::OutOfBounds { len: 12, .. })
        ));

        // A mark pushed after `a` pins its end.
        region.push(used).unwrap();
        assert!(!region.can_resize(used, a, 8).unwrap());
    }

    #[test]
    fn verify_catches_mark_above_used() {
        let mut region = MarkedRegion::new(Backing::heap(64), 4);
        region.push(40).unwrap();
        assert!(region.verify(40).is_ok());
        assert!(region.verify(20).is_err());
    }
}
