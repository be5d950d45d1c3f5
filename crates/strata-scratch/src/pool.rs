//! A fixed set of marked-stack slots handed out in strict nesting order.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use strata_arena::{Alignment, Arena, ArenaStats, Backing, SharedArena};

use crate::config::ScratchConfig;
use crate::error::ScratchError;

/// Slots in every enabled pool.
pub const SCRATCH_SLOTS_PER_THREAD: usize = 3;

/// Counter for unique pool ids.
static POOL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to one slot of one pool.
///
/// Handles compare equal only when they name the same slot of the same
/// pool, so a handle kept from a torn-down pool never matches a slot of
/// its replacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScratchId {
    pool: u64,
    index: usize,
}

impl ScratchId {
    /// Id of the pool that issued this handle.
    pub fn pool(&self) -> u64 {
        self.pool
    }

    /// Slot index within the pool.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for ScratchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scratch#{}.{}", self.pool, self.index)
    }
}

/// A set of [`SCRATCH_SLOTS_PER_THREAD`] marked-stack arenas.
///
/// [`acquire`](Self::acquire) pushes a mark on the first slot the caller
/// has not asked to avoid; [`release`](Self::release) pops it. Acquire and
/// release must nest. A disabled pool has no slots and acquires nothing.
pub struct ScratchPool<'buf> {
    id: u64,
    slots: Vec<RefCell<Arena<'buf>>>,
}

impl<'buf> ScratchPool<'buf> {
    fn from_slots(slots: Vec<Arena<'buf>>) -> Self {
        let id = POOL_COUNTER.fetch_add(1, Ordering::Relaxed);
        log::debug!("scratch pool {id} created with {} slots", slots.len());
        Self {
            id,
            slots: slots.into_iter().map(RefCell::new).collect(),
        }
    }

    /// A pool whose every acquire returns `None`.
    pub fn disabled() -> Self {
        Self::from_slots(Vec::new())
    }

    /// A pool whose slots own heap storage of `config.slot_size` bytes.
    pub fn with_heap(config: &ScratchConfig) -> Result<Self, ScratchError> {
        config.validate()?;
        if !config.is_enabled() {
            return Ok(Self::disabled());
        }
        let slots = (0..SCRATCH_SLOTS_PER_THREAD)
            .map(|_| {
                Arena::marked_stack(
                    Backing::heap(config.slot_size),
                    config.max_marks,
                    Alignment::None,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_slots(slots))
    }

    /// A pool whose slots are carved from `source`.
    ///
    /// If the source cannot supply every slot, whatever was carved goes
    /// back and the pool is disabled.
    pub fn from_source(
        source: &SharedArena<'buf>,
        config: &ScratchConfig,
    ) -> Result<Self, ScratchError> {
        config.validate()?;
        if !config.is_enabled() {
            return Ok(Self::disabled());
        }
        let mut slots = Vec::with_capacity(SCRATCH_SLOTS_PER_THREAD);
        for _ in 0..SCRATCH_SLOTS_PER_THREAD {
            let Some(backing) = Backing::carve(source, config.slot_size)? else {
                log::warn!(
                    "scratch source exhausted after {} of {SCRATCH_SLOTS_PER_THREAD} slots; scratch disabled",
                    slots.len()
                );
                // Newest first, so LIFO sources take them back.
                while let Some(slot) = slots.pop() {
                    drop(slot);
                }
                return Ok(Self::disabled());
            };
            slots.push(Arena::marked_stack(backing, config.max_marks, Alignment::None)?);
        }
        Ok(Self::from_slots(slots))
    }

    /// Unique id of this pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether acquires can succeed.
    pub fn is_enabled(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Number of slots (zero when disabled).
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot holds a mark. A pool that is not idle at a point
    /// where every scope has ended has an unbalanced acquire.
    pub fn is_idle(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.try_borrow().is_ok_and(|arena| arena.num_marks() == 0))
    }

    /// Take the first slot that is neither `avoid1` nor `avoid2`, with a
    /// fresh mark pushed.
    ///
    /// Returns `Ok(None)` if the pool is disabled. Slots currently lent
    /// out through [`with_slot`](Self::with_slot) are skipped.
    pub fn acquire(
        &self,
        avoid1: Option<ScratchId>,
        avoid2: Option<ScratchId>,
    ) -> Result<Option<ScratchId>, ScratchError> {
        Ok(self.acquire_marked(avoid1, avoid2)?.map(|(id, _)| id))
    }

    /// [`acquire`](Self::acquire), also returning the pushed mark.
    pub(crate) fn acquire_marked(
        &self,
        avoid1: Option<ScratchId>,
        avoid2: Option<ScratchId>,
    ) -> Result<Option<(ScratchId, usize)>, ScratchError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        for (index, slot) in self.slots.iter().enumerate() {
            let id = ScratchId {
                pool: self.id,
                index,
            };
            if avoid1 == Some(id) || avoid2 == Some(id) {
                continue;
            }
            let Ok(mut arena) = slot.try_borrow_mut() else {
                continue;
            };
            let mark = arena.push_mark()?;
            log::trace!("acquired {id} at depth {}", arena.num_marks());
            return Ok(Some((id, mark)));
        }
        log::error!("scratch pool {} has no eligible slot", self.id);
        Err(ScratchError::Exhausted {
            slots: self.slots.len(),
        })
    }

    /// Pop the mark taken by the matching [`acquire`](Self::acquire).
    pub fn release(&self, id: ScratchId) -> Result<(), ScratchError> {
        self.release_checked(id, None)
    }

    /// Like [`release`](Self::release), but also checks that the mark on
    /// top of the slot is `mark`, which catches releases out of order.
    pub fn release_expecting(&self, id: ScratchId, mark: usize) -> Result<(), ScratchError> {
        self.release_checked(id, Some(mark))
    }

    fn release_checked(&self, id: ScratchId, mark: Option<usize>) -> Result<(), ScratchError> {
        let slot = self.slot(id)?;
        let mut arena = slot.try_borrow_mut().map_err(|_| ScratchError::PoolBusy)?;
        if arena.num_marks() == 0 {
            log::error!("release of {id}, which holds no marks");
            return Err(ScratchError::NotHeld { index: id.index });
        }
        match mark {
            Some(mark) => arena.pop_mark_expecting(mark)?,
            None => {
                arena.pop_mark()?;
            }
        }
        log::trace!("released {id}");
        Ok(())
    }

    /// Run `f` against the slot's arena.
    pub fn with_slot<R>(
        &self,
        id: ScratchId,
        f: impl FnOnce(&mut Arena<'buf>) -> R,
    ) -> Result<R, ScratchError> {
        let slot = self.slot(id)?;
        let mut arena = slot.try_borrow_mut().map_err(|_| ScratchError::PoolBusy)?;
        Ok(f(&mut arena))
    }

    /// Counters for one slot.
    pub fn slot_stats(&self, id: ScratchId) -> Result<ArenaStats, ScratchError> {
        self.with_slot(id, |arena| arena.stats())
    }

    fn slot(&self, id: ScratchId) -> Result<&RefCell<Arena<'buf>>, ScratchError> {
        let foreign = || {
            log::error!("{id} does not belong to scratch pool {}", self.id);
            ScratchError::ForeignSlot {
                pool: id.pool,
                index: id.index,
            }
        };
        if id.pool != self.id {
            return Err(foreign());
        }
        self.slots.get(id.index).ok_or_else(foreign)
    }
}

impl Drop for ScratchPool<'_> {
    fn drop(&mut self) {
        if !self.is_idle() {
            log::warn!("scratch pool {} dropped with slots still held", self.id);
        }
        while let Some(slot) = self.slots.pop() {
            drop(slot);
        }
    }
}

impl fmt::Debug for ScratchPool<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchPool")
            .field("id", &self.id)
            .field("slots", &self.slots.len())
            .field("idle", &self.is_idle())
            .finish()
    }
}
