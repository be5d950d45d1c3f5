//! First-fit free list over one region.
//!
//! The region is tiled by blocks, each described by an out-of-band record
//! keyed by its start offset: length, leading alignment padding, and
//! whether it is filled. Allocation splits the first free block that fits;
//! freeing merges the block with free neighbours on both sides, so two
//! adjacent free blocks never exist.

use std::collections::BTreeMap;

use strata_core::Alignment;

use crate::error::{violation, ArenaError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Block {
    /// Block length, padding included.
    len: usize,
    /// Bytes skipped at the front to align the data.
    pad: usize,
    filled: bool,
}

impl Block {
    fn free(len: usize) -> Self {
        Self {
            len,
            pad: 0,
            filled: false,
        }
    }
}

/// Block records for one region of `len` bytes.
#[derive(Clone, Debug)]
pub(crate) struct FreeList {
    blocks: BTreeMap<usize, Block>,
    len: usize,
    used: usize,
    live: usize,
}

impl FreeList {
    pub(crate) fn new(len: usize) -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(0, Block::free(len));
        Self {
            blocks,
            len,
            used: 0,
            live: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Bytes held by filled blocks, padding included.
    pub(crate) fn used(&self) -> usize {
        self.used
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Allocate `size` bytes. `base` is the region's real address, used
    /// only to compute alignment padding. Returns the data offset.
    pub(crate) fn alloc(&mut self, base: usize, size: usize, align: Alignment) -> Option<usize> {
        let (offset, block, pad) = self.blocks.iter().find_map(|(&offset, &block)| {
            if block.filled {
                return None;
            }
            let pad = align.padding_for(base + offset);
            let need = pad.checked_add(size)?;
            (need <= block.len).then_some((offset, block, pad))
        })?;

        let need = pad + size;
        if block.len > need {
            self.blocks
                .insert(offset + need, Block::free(block.len - need));
        }
        self.blocks.insert(
            offset,
            Block {
                len: need,
                pad,
                filled: true,
            },
        );
        self.used += need;
        self.live += 1;
        Some(offset + pad)
    }

    /// Free the allocation whose data starts at `data_offset`. Returns its
    /// size. `size`, when given, must match the record.
    pub(crate) fn free(
        &mut self,
        base: usize,
        data_offset: usize,
        size: Option<usize>,
    ) -> Result<usize, ArenaError> {
        let address = base + data_offset;
        let (offset, block) = self
            .record_for(data_offset)
            .ok_or_else(|| violation(ArenaError::UnknownAllocation { address }))?;
        if !block.filled {
            return Err(violation(ArenaError::DoubleFree { address }));
        }
        let actual = block.len - block.pad;
        if let Some(given) = size {
            if given != actual {
                return Err(violation(ArenaError::SizeMismatch {
                    address,
                    given,
                    actual,
                }));
            }
        }

        self.used -= block.len;
        self.live -= 1;
        let mut start = offset;
        let mut len = block.len;

        if let Some(next) = self.blocks.get(&(offset + len)).copied() {
            if !next.filled {
                self.blocks.remove(&(offset + len));
                len += next.len;
            }
        }
        if let Some((&prev_offset, &prev)) = self.blocks.range(..offset).next_back() {
            if !prev.filled && prev_offset + prev.len == offset {
                self.blocks.remove(&offset);
                start = prev_offset;
                len += prev.len;
            }
        }
        self.blocks.insert(start, Block::free(len));
        Ok(actual)
    }

    /// Free bytes directly after the allocation at `data_offset`, which
    /// must hold exactly `size` bytes.
    pub(crate) fn room_after(
        &self,
        base: usize,
        data_offset: usize,
        size: usize,
    ) -> Result<usize, ArenaError> {
        let (offset, block) = self.sized_record(base, data_offset, size)?;
        Ok(self.free_after(offset, block))
    }

    /// Extend an allocation from `old` to `new` bytes into the free block
    /// after it. Returns `false`, changing nothing, if that block is too
    /// small.
    pub(crate) fn grow(
        &mut self,
        base: usize,
        data_offset: usize,
        old: usize,
        new: usize,
    ) -> Result<bool, ArenaError> {
        let (offset, mut block) = self.sized_record(base, data_offset, old)?;
        let extra = new.saturating_sub(old);
        let room = self.free_after(offset, block);
        if extra > room {
            return Ok(false);
        }
        if extra == 0 {
            return Ok(true);
        }
        let next = offset + block.len;
        self.blocks.remove(&next);
        if room > extra {
            self.blocks.insert(next + extra, Block::free(room - extra));
        }
        block.len += extra;
        self.blocks.insert(offset, block);
        self.used += extra;
        Ok(true)
    }

    /// Cut an allocation from `old` down to `new` bytes. The tail becomes
    /// free, merged with a free block that follows.
    pub(crate) fn shrink(
        &mut self,
        base: usize,
        data_offset: usize,
        old: usize,
        new: usize,
    ) -> Result<(), ArenaError> {
        let (offset, mut block) = self.sized_record(base, data_offset, old)?;
        let cut = old.saturating_sub(new);
        if cut == 0 {
            return Ok(());
        }
        let room = self.free_after(offset, block);
        if room > 0 {
            self.blocks.remove(&(offset + block.len));
        }
        block.len -= cut;
        self.blocks.insert(offset, block);
        self.blocks
            .insert(offset + block.len, Block::free(cut + room));
        self.used -= cut;
        Ok(())
    }

    /// Size of the live allocation whose data starts at `data_offset`.
    pub(crate) fn data_size(&self, data_offset: usize) -> Option<usize> {
        self.record_for(data_offset)
            .filter(|(_, block)| block.filled)
            .map(|(_, block)| block.len - block.pad)
    }

    /// Drop every allocation.
    pub(crate) fn clear(&mut self) {
        *self = Self::new(self.len);
    }

    /// Check that the records tile the region and are fully coalesced.
    pub(crate) fn verify(&self) -> Result<(), String> {
        let mut expected = 0;
        let mut used = 0;
        let mut live = 0;
        let mut prev_free = false;
        for (&offset, block) in &self.blocks {
            if offset != expected {
                return Err(format!("gap or overlap at offset {offset}, expected {expected}"));
            }
            if block.len == 0 {
                return Err(format!("empty block at offset {offset}"));
            }
            if !block.filled && prev_free {
                return Err(format!("uncoalesced free block at offset {offset}"));
            }
            if block.filled {
                used += block.len;
                live += 1;
            } else if block.pad != 0 {
                return Err(format!("free block at offset {offset} carries padding"));
            }
            prev_free = !block.filled;
            expected = offset + block.len;
        }
        if expected != self.len {
            return Err(format!("blocks cover {expected} of {} bytes", self.len));
        }
        if used != self.used || live != self.live {
            return Err(format!(
                "counters drifted: used {} vs {used}, live {} vs {live}",
                self.used, self.live
            ));
        }
        Ok(())
    }

    /// The filled record at `data_offset`, checked to hold `size` bytes.
    fn sized_record(
        &self,
        base: usize,
        data_offset: usize,
        size: usize,
    ) -> Result<(usize, Block), ArenaError> {
        let address = base + data_offset;
        let (offset, block) = self
            .record_for(data_offset)
            .filter(|(_, block)| block.filled)
            .ok_or_else(|| violation(ArenaError::UnknownAllocation { address }))?;
        let actual = block.len - block.pad;
        if size != actual {
            return Err(violation(ArenaError::SizeMismatch {
                address,
                given: size,
                actual,
            }));
        }
        Ok((offset, block))
    }

    fn free_after(&self, offset: usize, block: Block) -> usize {
        self.blocks
            .get(&(offset + block.len))
            .filter(|next| !next.filled)
            .map_or(0, |next| next.len)
    }

    fn record_for(&self, data_offset: usize) -> Option<(usize, Block)> {
        let (&offset, &block) = self.blocks.range(..=data_offset).next_back()?;
        (offset + block.pad == data_offset).then_some((offset, block))
    }
}
