//! Buffer: bump allocation with strictly LIFO frees.
//!
//! Each live allocation keeps a small record of where its padded slot
//! starts and where its data starts. A free must name the top record;
//! rewinding to the slot start also gives back the alignment padding.

use smallvec::SmallVec;
use strata_core::{Alignment, Allocation};

use crate::backing::Backing;
use crate::error::{violation, ArenaError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Record {
    /// Offset of the slot, before padding.
    start: usize,
    /// Offset of the data.
    data: usize,
}

pub(crate) struct BumpBuffer<'buf> {
    pub(crate) backing: Backing<'buf>,
    records: SmallVec<[Record; 8]>,
}

/// Outcome of a buffer free.
pub(crate) struct Released {
    /// Size of the freed allocation.
    pub(crate) size: usize,
    /// `used` after the free.
    pub(crate) used: usize,
}

impl<'buf> BumpBuffer<'buf> {
    pub(crate) fn new(backing: Backing<'buf>) -> Self {
        Self {
            backing,
            records: SmallVec::new(),
        }
    }

    pub(crate) fn alloc(
        &mut self,
        used: usize,
        size: usize,
        align: Alignment,
    ) -> Option<(Allocation, usize)> {
        let (allocation, charged) = self.backing.bump(used, size, align)?;
        self.records.push(Record {
            start: used,
            data: used + charged - size,
        });
        Some((allocation, charged))
    }

    /// Free the most recent allocation.
    ///
    /// `size` may only be omitted when `allocation` is the sole allocation
    /// and starts at the base of the buffer.
    pub(crate) fn free(
        &mut self,
        used: usize,
        allocation: Allocation,
        size: Option<usize>,
    ) -> Result<Released, ArenaError> {
        let address = allocation.addr();
        let data = self.backing.offset_of(allocation, 0).map_err(|_| {
            violation(ArenaError::UnknownAllocation { address })
        })?;
        let top = self.records.last().copied();
        let size = match size {
            Some(size) => size,
            None if data == 0 && self.records.len() == 1 => used,
            None => return Err(violation(ArenaError::SizeRequired { address })),
        };
        let Some(top) = top.filter(|top| top.data == data) else {
            return Err(violation(ArenaError::OutOfOrderFree {
                address,
                expected: top.map(|t| self.backing.base_addr() + t.data),
            }));
        };
        if top.data + size != used {
            return Err(violation(ArenaError::SizeMismatch {
                address,
                given: size,
                actual: used - top.data,
            }));
        }
        self.records.pop();
        Ok(Released {
            size,
            used: top.start,
        })
    }

    /// Size of a live allocation, read from the records.
    pub(crate) fn data_size(&self, used: usize, allocation: Allocation) -> Option<usize> {
        let data = self.backing.offset_of(allocation, 0).ok()?;
        let index = self.records.iter().position(|r| r.data == data)?;
        let end = self
            .records
            .get(index + 1)
            .map_or(used, |next| next.start);
        Some(end - data)
    }

    /// Whether `allocation` is the most recent allocation, so its end can
    /// move. Its size must be `size`.
    pub(crate) fn is_top(
        &self,
        used: usize,
        allocation: Allocation,
        size: usize,
    ) -> Result<bool, ArenaError> {
        let address = allocation.addr();
        let actual = self
            .data_size(used, allocation)
            .ok_or_else(|| violation(ArenaError::UnknownAllocation { address }))?;
        if actual != size {
            return Err(violation(ArenaError::SizeMismatch {
                address,
                given: size,
                actual,
            }));
        }
        Ok(self.records.last().is_some_and(|top| {
            self.backing.base_addr() + top.data == address
        }))
    }

    pub(crate) fn live(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    pub(crate) fn verify(&self, used: usize) -> Result<(), String> {
        let mut floor = 0;
        for record in &self.records {
            if record.start < floor || record.data < record.start {
                return Err(format!("record at offset {} is out of order", record.start));
            }
            floor = record.data;
        }
        if floor > used || used > self.backing.len() {
            return Err(format!(
                "used {used} is inconsistent with records and length {}",
                self.backing.len()
            ));
        }
        Ok(())
    }
}
