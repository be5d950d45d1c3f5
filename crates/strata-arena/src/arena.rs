//! The [`Arena`] type and its per-strategy dispatch.
//!
//! Every strategy answers the same calls. Running out of space is an
//! ordinary `Ok(None)`; calling an operation a strategy does not offer,
//! or breaking its ordering rules, is an [`ArenaError`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use strata_core::{Alignment, Allocation, Operation, RawAllocator, Strategy, SystemHeap};

use crate::backing::{borrow_source, borrow_source_mut, Backing, SharedArena};
use crate::buffer::BumpBuffer;
use crate::config::{ArenaFlags, PagedHeapConfig};
use crate::error::{violation, ArenaError};
use crate::free_list::FreeList;
use crate::paged::{PageSource, PagedHeap};
use crate::stack::MarkedRegion;
use crate::stats::{ArenaStats, Counters};

enum Kind<'buf> {
    Redirect(Box<dyn RawAllocator + 'buf>),
    Alias(SharedArena<'buf>),
    StdHeap(SystemHeap),
    FixedHeap {
        backing: Backing<'buf>,
        list: FreeList,
    },
    PagedHeap(PagedHeap<'buf>),
    MarkedStack(MarkedRegion<'buf>),
    Buffer(BumpBuffer<'buf>),
}

/// A memory arena running one allocation strategy.
///
/// Create one with the constructor for its strategy, then allocate and
/// free through it. Bytes are reached by handle with
/// [`with_bytes`](Self::with_bytes) / [`with_bytes_mut`](Self::with_bytes_mut).
pub struct Arena<'buf> {
    kind: Kind<'buf>,
    alignment: Alignment,
    flags: ArenaFlags,
    counters: Counters,
}

/// Result of a successful free.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Freed {
    /// Size of the freed allocation, when the arena knows or was told it.
    pub size: Option<usize>,
}

/// Result of a reallocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reallocated {
    /// The new allocation. `None` after a resize to zero or when the arena
    /// is exhausted; the old allocation has been freed either way.
    pub allocation: Option<Allocation>,
    /// Size of the old allocation, when known.
    pub old_size: Option<usize>,
}

fn reject_alignment(strategy: Strategy, alignment: Alignment) -> Result<(), ArenaError> {
    if alignment.is_none() {
        Ok(())
    } else {
        Err(violation(ArenaError::UnsupportedAlignment {
            strategy,
            alignment,
        }))
    }
}

fn unsupported(operation: Operation, strategy: Strategy) -> ArenaError {
    violation(ArenaError::Unsupported {
        operation,
        strategy,
    })
}

fn non_empty(backing: &Backing<'_>) -> Result<(), ArenaError> {
    if backing.is_empty() {
        return Err(ArenaError::InvalidConfig {
            reason: "backing region is empty".into(),
        });
    }
    Ok(())
}

fn out_of_bounds(allocation: Allocation, len: usize) -> ArenaError {
    ArenaError::OutOfBounds {
        address: allocation.addr(),
        len,
    }
}

impl<'buf> Arena<'buf> {
    fn from_kind(kind: Kind<'buf>, alignment: Alignment, size: usize) -> Self {
        let flags = ArenaFlags::default();
        Self {
            kind,
            alignment,
            flags,
            counters: Counters::new(size, 0, flags.telemetry),
        }
    }

    // ── Construction ────────────────────────────────────────────

    /// An arena that forwards to an external allocator.
    pub fn redirect(allocator: impl RawAllocator + 'buf) -> Self {
        Self::from_kind(Kind::Redirect(Box::new(allocator)), Alignment::None, 0)
    }

    /// An arena that forwards every call to `source`.
    ///
    /// Counters are read from the source whenever they are asked for.
    pub fn alias(source: SharedArena<'buf>) -> Self {
        Self::from_kind(Kind::Alias(source), Alignment::None, 0)
    }

    /// An arena over the process heap.
    pub fn std_heap() -> Self {
        Self::from_kind(Kind::StdHeap(SystemHeap::new()), Alignment::None, 0)
    }

    /// A first-fit free-list heap over one region.
    pub fn fixed_heap(
        backing: impl Into<Backing<'buf>>,
        alignment: Alignment,
    ) -> Result<Self, ArenaError> {
        let backing = backing.into();
        non_empty(&backing)?;
        let len = backing.len();
        let list = FreeList::new(len);
        Ok(Self::from_kind(
            Kind::FixedHeap { backing, list },
            alignment,
            len,
        ))
    }

    /// A free-list heap that grows page by page from `source`.
    pub fn paged_heap(
        config: PagedHeapConfig,
        source: PageSource<'buf>,
    ) -> Result<Self, ArenaError> {
        config.validate()?;
        let alignment = config.alignment;
        Ok(Self::from_kind(
            Kind::PagedHeap(PagedHeap::new(config, source)),
            alignment,
            0,
        ))
    }

    /// A bump allocator with up to `max_marks` rewind marks.
    pub fn marked_stack(
        backing: impl Into<Backing<'buf>>,
        max_marks: usize,
        alignment: Alignment,
    ) -> Result<Self, ArenaError> {
        let backing = backing.into();
        non_empty(&backing)?;
        if max_marks == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "max_marks must be non-zero".into(),
            });
        }
        let len = backing.len();
        Ok(Self::from_kind(
            Kind::MarkedStack(MarkedRegion::new(backing, max_marks)),
            alignment,
            len,
        ))
    }

    /// A bump allocator whose frees must come in reverse order.
    pub fn buffer(
        backing: impl Into<Backing<'buf>>,
        alignment: Alignment,
    ) -> Result<Self, ArenaError> {
        let backing = backing.into();
        non_empty(&backing)?;
        let len = backing.len();
        Ok(Self::from_kind(
            Kind::Buffer(BumpBuffer::new(backing)),
            alignment,
            len,
        ))
    }

    /// Carve `len` bytes from `source` and wrap them as a single-alloc
    /// buffer. `Ok(None)` if the source is exhausted.
    pub fn buffer_from(source: &SharedArena<'buf>, len: usize) -> Result<Option<Self>, ArenaError> {
        let Some(backing) = Backing::carve(source, len)? else {
            return Ok(None);
        };
        let arena = Self::buffer(backing, Alignment::None)?;
        Ok(Some(arena.with_single_alloc(true)))
    }

    /// Replace the behaviour flags.
    pub fn with_flags(mut self, flags: ArenaFlags) -> Self {
        self.flags = flags;
        self.counters.set_telemetry(flags.telemetry);
        self
    }

    /// Turn single-allocation mode on or off.
    pub fn with_single_alloc(mut self, single_alloc: bool) -> Self {
        self.flags.single_alloc = single_alloc;
        self
    }

    /// Wrap the arena for use as a source by other arenas.
    pub fn into_shared(self) -> SharedArena<'buf> {
        Rc::new(RefCell::new(self))
    }

    /// Return the backing resource to whatever supplied it.
    ///
    /// Dropping the arena does the same on a best-effort basis; this
    /// reports failures instead of logging them.
    pub fn release(mut self) -> Result<(), ArenaError> {
        match &mut self.kind {
            Kind::FixedHeap { backing, .. } => backing.release(),
            Kind::MarkedStack(region) => region.backing.release(),
            Kind::Buffer(buffer) => buffer.backing.release(),
            Kind::PagedHeap(heap) => heap.release(),
            Kind::Redirect(_) | Kind::Alias(_) | Kind::StdHeap(_) => Ok(()),
        }
    }

    // ── Introspection ───────────────────────────────────────────

    /// The strategy this arena runs.
    pub fn strategy(&self) -> Strategy {
        match &self.kind {
            Kind::Redirect(_) => Strategy::Redirect,
            Kind::Alias(_) => Strategy::Alias,
            Kind::StdHeap(_) => Strategy::StdHeap,
            Kind::FixedHeap { .. } => Strategy::FixedHeap,
            Kind::PagedHeap(_) => Strategy::PagedHeap,
            Kind::MarkedStack(_) => Strategy::MarkedStack,
            Kind::Buffer(_) => Strategy::Buffer,
        }
    }

    /// Default alignment applied when a call passes [`Alignment::None`].
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Behaviour flags.
    pub fn flags(&self) -> ArenaFlags {
        self.flags
    }

    /// Current counters. Alias arenas report their source's.
    pub fn stats(&self) -> ArenaStats {
        match &self.kind {
            Kind::Alias(source) => match source.try_borrow() {
                Ok(source) => source.stats(),
                Err(_) => {
                    log::warn!("alias source is borrowed; reporting empty stats");
                    ArenaStats::default()
                }
            },
            Kind::MarkedStack(region) => self
                .counters
                .snapshot(region.num_marks(), region.high_mark_count()),
            _ => self.counters.snapshot(0, 0),
        }
    }

    /// Capacity in bytes. `0` for unbounded strategies.
    pub fn size(&self) -> usize {
        self.stats().size
    }

    /// Bytes in use.
    pub fn used(&self) -> usize {
        self.stats().used
    }

    /// Live allocation count (see [`ArenaStats::num_allocations`]).
    pub fn num_allocations(&self) -> usize {
        self.stats().num_allocations
    }

    /// Marks currently pushed.
    pub fn num_marks(&self) -> usize {
        self.stats().num_marks
    }

    /// Mark stack capacity, for strategies that have one.
    pub fn max_marks(&self) -> Option<usize> {
        match &self.kind {
            Kind::MarkedStack(region) => Some(region.max_marks()),
            Kind::Alias(source) => source.try_borrow().ok()?.max_marks(),
            _ => None,
        }
    }

    /// Pages currently held by a paged heap.
    pub fn page_count(&self) -> Option<usize> {
        match &self.kind {
            Kind::PagedHeap(heap) => Some(heap.page_count()),
            _ => None,
        }
    }

    /// Whether individual allocations can be freed.
    pub fn supports_freeing(&self) -> bool {
        match &self.kind {
            Kind::Alias(source) => source.try_borrow().is_ok_and(|s| s.supports_freeing()),
            _ => self.strategy().supports_freeing(),
        }
    }

    /// Whether `push_mark`/`pop_mark` are available.
    pub fn supports_marks(&self) -> bool {
        match &self.kind {
            Kind::Alias(source) => source.try_borrow().is_ok_and(|s| s.supports_marks()),
            _ => self.strategy().supports_marks(),
        }
    }

    /// Enable or disable high-water tracking.
    pub fn set_telemetry(&mut self, enabled: bool) {
        self.flags.telemetry = enabled;
        self.counters.set_telemetry(enabled);
    }

    /// Restart the resettable high-water mark from the current `used`.
    pub fn reset_high_used_mark(&mut self) {
        self.counters.reset_high_used_mark();
    }

    /// Size of a live allocation, where the strategy records it.
    pub fn alloc_size(&self, allocation: Allocation) -> Option<usize> {
        match &self.kind {
            Kind::Redirect(_) | Kind::MarkedStack(_) => None,
            Kind::Alias(source) => source.try_borrow().ok()?.alloc_size(allocation),
            Kind::StdHeap(heap) => heap.block_len(allocation),
            Kind::FixedHeap { backing, list } => {
                list.data_size(backing.offset_of(allocation, 0).ok()?)
            }
            Kind::PagedHeap(heap) => heap.data_size(allocation),
            Kind::Buffer(buffer) => buffer.data_size(self.counters.used, allocation),
        }
    }

    // ── Allocation ──────────────────────────────────────────────

    /// Allocate `size` bytes with the arena's default alignment.
    pub fn alloc(&mut self, size: usize) -> Result<Option<Allocation>, ArenaError> {
        self.alloc_aligned(size, Alignment::None)
    }

    /// Allocate `size` bytes. `align` overrides the arena default unless
    /// it is [`Alignment::None`].
    ///
    /// Returns `Ok(None)` for a zero-byte request, when the arena is full,
    /// and when a single-alloc arena already holds its allocation.
    pub fn alloc_aligned(
        &mut self,
        size: usize,
        align: Alignment,
    ) -> Result<Option<Allocation>, ArenaError> {
        if size == 0 {
            return Ok(None);
        }
        let strategy = self.strategy();
        if self.flags.single_alloc && self.num_allocations() > 0 {
            log::warn!("single-alloc {strategy} arena refused a second allocation of {size} bytes");
            return Ok(None);
        }
        let align = align.or(self.alignment);

        let found = match &mut self.kind {
            Kind::Redirect(raw) => {
                reject_alignment(strategy, align)?;
                let found = raw.allocate(size);
                if found.is_some() {
                    self.counters.record_alloc(size);
                }
                found
            }
            Kind::Alias(source) => return borrow_source_mut(source)?.alloc_aligned(size, align),
            Kind::StdHeap(heap) => {
                reject_alignment(strategy, align)?;
                let found = heap.allocate(size);
                if found.is_some() {
                    self.counters.record_alloc(size);
                }
                found
            }
            Kind::FixedHeap { backing, list } => {
                let found = list
                    .alloc(backing.base_addr(), size, align)
                    .and_then(|offset| backing.at(offset));
                if found.is_some() {
                    self.counters.record_alloc_at(list.len(), list.used());
                }
                found
            }
            Kind::PagedHeap(heap) => {
                let found = heap.alloc(size, align)?;
                if found.is_some() {
                    self.counters.record_alloc_at(heap.size(), heap.used());
                } else {
                    self.counters.sync(heap.size(), heap.used());
                }
                found
            }
            Kind::MarkedStack(region) => {
                let found = region.alloc(self.counters.used, size, align);
                found.map(|(allocation, charged)| {
                    self.counters.record_alloc(charged);
                    allocation
                })
            }
            Kind::Buffer(buffer) => {
                let found = buffer.alloc(self.counters.used, size, align);
                found.map(|(allocation, charged)| {
                    self.counters.record_alloc(charged);
                    allocation
                })
            }
        };

        match found {
            Some(allocation) => log::trace!("{strategy} alloc {size} bytes at {allocation}"),
            None => log::trace!("{strategy} alloc of {size} bytes failed: exhausted"),
        }
        Ok(found)
    }

    /// Allocate room for `bytes` and copy them in.
    pub fn alloc_copy(&mut self, bytes: &[u8]) -> Result<Option<Allocation>, ArenaError> {
        let Some(allocation) = self.alloc(bytes.len())? else {
            return Ok(None);
        };
        self.write(allocation, bytes)?;
        Ok(Some(allocation))
    }

    // ── Freeing ─────────────────────────────────────────────────

    /// Free an allocation. `size` is required by some strategies and
    /// checked by others.
    pub fn free(&mut self, allocation: Allocation, size: Option<usize>) -> Result<Freed, ArenaError> {
        let strategy = self.strategy();
        let address = allocation.addr();
        let freed = match &mut self.kind {
            Kind::Redirect(raw) => {
                if !raw.deallocate(allocation) {
                    return Err(violation(ArenaError::UnknownAllocation { address }));
                }
                self.counters.record_free(size.unwrap_or(0));
                Freed { size }
            }
            Kind::Alias(source) => return borrow_source_mut(source)?.free(allocation, size),
            Kind::StdHeap(heap) => {
                if !heap.deallocate(allocation) {
                    return Err(violation(ArenaError::UnknownAllocation { address }));
                }
                self.counters.record_free(size.unwrap_or(0));
                Freed { size }
            }
            Kind::FixedHeap { backing, list } => {
                let offset = backing
                    .offset_of(allocation, 0)
                    .map_err(|_| violation(ArenaError::UnknownAllocation { address }))?;
                let freed = list.free(backing.base_addr(), offset, size)?;
                self.counters.record_free_at(list.len(), list.used());
                Freed { size: Some(freed) }
            }
            Kind::PagedHeap(heap) => {
                let (freed, emptied) = heap.free(allocation, size)?;
                self.counters.record_free_at(heap.size(), heap.used());
                if let Some(page) = emptied {
                    heap.return_page(page)?;
                }
                Freed { size: Some(freed) }
            }
            Kind::MarkedStack(_) => return Err(unsupported(Operation::Free, strategy)),
            Kind::Buffer(buffer) => {
                let released = buffer.free(self.counters.used, allocation, size)?;
                self.counters
                    .record_free(self.counters.used - released.used);
                Freed {
                    size: Some(released.size),
                }
            }
        };
        log::trace!("{strategy} free at {allocation}");
        Ok(freed)
    }

    /// Free an allocation that may be absent. `None` is a no-op that
    /// returns `Ok(None)`.
    pub fn soft_free(
        &mut self,
        allocation: Option<Allocation>,
        size: Option<usize>,
    ) -> Result<Option<Freed>, ArenaError> {
        allocation.map(|a| self.free(a, size)).transpose()
    }

    // ── Reallocation ────────────────────────────────────────────

    /// Resize an allocation, moving it if needed.
    ///
    /// - A `None` allocation behaves like [`alloc_aligned`](Self::alloc_aligned).
    /// - `new_size == 0` frees the allocation and returns `None`.
    /// - Asking for the size it already has, at an alignment it already
    ///   satisfies, returns the same handle.
    /// - If the new block cannot be had, the old one is freed anyway and
    ///   `None` is returned.
    pub fn realloc(
        &mut self,
        allocation: Option<Allocation>,
        new_size: usize,
        old_size: Option<usize>,
        align: Alignment,
    ) -> Result<Reallocated, ArenaError> {
        let effective = align.or(self.alignment);
        if let Some(old) = allocation {
            if new_size > 0 && old_size == Some(new_size) && old.is_aligned(effective) {
                return Ok(Reallocated {
                    allocation: Some(old),
                    old_size,
                });
            }
        }

        if new_size == 0 {
            let freed = self.soft_free(allocation, old_size)?;
            return Ok(Reallocated {
                allocation: None,
                old_size: freed.and_then(|f| f.size).or(old_size),
            });
        }

        let Some(old) = allocation else {
            return Ok(Reallocated {
                allocation: self.alloc_aligned(new_size, align)?,
                old_size: None,
            });
        };

        let strategy = self.strategy();
        match strategy {
            Strategy::Alias => match &mut self.kind {
                Kind::Alias(source) => {
                    borrow_source_mut(source)?.realloc(Some(old), new_size, old_size, align)
                }
                _ => Err(violation(ArenaError::Corrupt {
                    detail: "strategy tag disagrees with arena state".into(),
                })),
            },
            Strategy::StdHeap => self.realloc_system(old, new_size, old_size, effective),
            Strategy::MarkedStack => Err(unsupported(Operation::Realloc, strategy)),
            Strategy::Buffer => self.realloc_lifo(old, new_size, old_size, align),
            Strategy::Redirect | Strategy::FixedHeap | Strategy::PagedHeap => {
                self.realloc_by_copy(old, new_size, old_size, align)
            }
        }
    }

    fn realloc_system(
        &mut self,
        old: Allocation,
        new_size: usize,
        old_size: Option<usize>,
        effective: Alignment,
    ) -> Result<Reallocated, ArenaError> {
        reject_alignment(Strategy::StdHeap, effective)?;
        let Kind::StdHeap(heap) = &mut self.kind else {
            return Err(violation(ArenaError::Corrupt {
                detail: "strategy tag disagrees with arena state".into(),
            }));
        };
        let moved = heap.resize(old, new_size).ok_or_else(|| {
            violation(ArenaError::UnknownAllocation {
                address: old.addr(),
            })
        })?;
        self.counters
            .record_resize(old_size.unwrap_or(0), new_size);
        Ok(Reallocated {
            allocation: Some(moved),
            old_size,
        })
    }

    /// Allocate, copy, then free the old block.
    ///
    /// If the copy or the free fails, the new block is freed again before
    /// the error is returned.
    fn realloc_by_copy(
        &mut self,
        old: Allocation,
        new_size: usize,
        old_size: Option<usize>,
        align: Alignment,
    ) -> Result<Reallocated, ArenaError> {
        let known = self.checked_size(old, old_size)?;
        let Some(new) = self.alloc_aligned(new_size, align)? else {
            let freed = self.free(old, old_size)?;
            log::debug!("realloc to {new_size} bytes failed; old allocation {old} freed");
            return Ok(Reallocated {
                allocation: None,
                old_size: freed.size.or(known),
            });
        };
        let moved = match known {
            Some(len) => self.copy_within(old, new, len.min(new_size)),
            None => Ok(()),
        }
        .and_then(|()| self.free(old, old_size));
        match moved {
            Ok(freed) => Ok(Reallocated {
                allocation: Some(new),
                old_size: freed.size.or(known),
            }),
            Err(err) => {
                if let Err(undo) = self.free(new, Some(new_size)) {
                    log::warn!("block {new} from a failed realloc was not returned: {undo}");
                }
                Err(err)
            }
        }
    }

    /// Size of `allocation`, checked against the caller's `size`.
    ///
    /// Strategies that record sizes must know the allocation; the others
    /// take the caller's word.
    fn checked_size(
        &self,
        allocation: Allocation,
        size: Option<usize>,
    ) -> Result<Option<usize>, ArenaError> {
        let address = allocation.addr();
        match (self.alloc_size(allocation), size) {
            (Some(actual), Some(given)) if given != actual => {
                Err(violation(ArenaError::SizeMismatch {
                    address,
                    given,
                    actual,
                }))
            }
            (None, _) if self.records_sizes() => {
                Err(violation(ArenaError::UnknownAllocation { address }))
            }
            (known, given) => Ok(known.or(given)),
        }
    }

    fn records_sizes(&self) -> bool {
        matches!(
            self.kind,
            Kind::StdHeap(_) | Kind::FixedHeap { .. } | Kind::PagedHeap(_) | Kind::Buffer(_)
        )
    }

    /// Buffers only free their top block, so the old block has to go
    /// before the new one is taken. Its bytes are staged in between.
    fn realloc_lifo(
        &mut self,
        old: Allocation,
        new_size: usize,
        old_size: Option<usize>,
        align: Alignment,
    ) -> Result<Reallocated, ArenaError> {
        let len = old_size
            .or_else(|| self.alloc_size(old))
            .ok_or_else(|| {
                violation(ArenaError::SizeRequired {
                    address: old.addr(),
                })
            })?;
        let staged = self.read(old, len)?;
        let freed = self.free(old, Some(len))?;
        let new = self.alloc_aligned(new_size, align)?;
        if let Some(new) = new {
            self.write(new, &staged[..len.min(new_size)])?;
        }
        Ok(Reallocated {
            allocation: new,
            old_size: freed.size,
        })
    }

    // ── In-place resizing ───────────────────────────────────────

    /// How many bytes `allocation`, currently `size` bytes long, could grow
    /// by without moving.
    ///
    /// Heaps report the free block that follows it. Bump strategies report
    /// the unused tail when the allocation is the most recent one; on a
    /// marked stack it must also sit above the top mark. Process heap and
    /// redirect arenas always report `0`.
    pub fn grow_query(&self, allocation: Allocation, size: usize) -> Result<usize, ArenaError> {
        let address = allocation.addr();
        match &self.kind {
            Kind::Redirect(_) | Kind::StdHeap(_) => Ok(0),
            Kind::Alias(source) => borrow_source(source)?.grow_query(allocation, size),
            Kind::FixedHeap { backing, list } => {
                let offset = backing
                    .offset_of(allocation, 0)
                    .map_err(|_| violation(ArenaError::UnknownAllocation { address }))?;
                list.room_after(backing.base_addr(), offset, size)
            }
            Kind::PagedHeap(heap) => heap.room_after(allocation, size),
            Kind::MarkedStack(region) => {
                let top = region.can_resize(self.counters.used, allocation, size)?;
                Ok(if top { region.backing.len() - self.counters.used } else { 0 })
            }
            Kind::Buffer(buffer) => {
                let top = buffer.is_top(self.counters.used, allocation, size)?;
                Ok(if top { buffer.backing.len() - self.counters.used } else { 0 })
            }
        }
    }

    /// Grow `allocation` from `old_size` to `new_size` bytes in place.
    ///
    /// Returns `false`, changing nothing, when the room reported by
    /// [`grow_query`](Self::grow_query) is too small.
    pub fn grow(
        &mut self,
        allocation: Allocation,
        old_size: usize,
        new_size: usize,
    ) -> Result<bool, ArenaError> {
        if new_size < old_size || old_size == 0 {
            return Err(violation(ArenaError::InvalidResize {
                address: allocation.addr(),
                from: old_size,
                to: new_size,
            }));
        }
        if let Kind::Alias(source) = &mut self.kind {
            return borrow_source_mut(source)?.grow(allocation, old_size, new_size);
        }
        let room = self.grow_query(allocation, old_size)?;
        if new_size == old_size {
            return Ok(true);
        }
        if new_size - old_size > room {
            log::trace!(
                "{} grow of {allocation} to {new_size} bytes refused: {room} bytes free after it",
                self.strategy()
            );
            return Ok(false);
        }
        match &mut self.kind {
            Kind::FixedHeap { backing, list } => {
                let offset = backing.offset_of(allocation, 0)?;
                list.grow(backing.base_addr(), offset, old_size, new_size)?;
                self.counters.sync(list.len(), list.used());
            }
            Kind::PagedHeap(heap) => {
                heap.grow(allocation, old_size, new_size)?;
                self.counters.sync(heap.size(), heap.used());
            }
            Kind::MarkedStack(_) | Kind::Buffer(_) => {
                self.counters.record_resize(old_size, new_size);
            }
            Kind::Redirect(_) | Kind::Alias(_) | Kind::StdHeap(_) => return Ok(false),
        }
        log::trace!("{} grew {allocation} from {old_size} to {new_size} bytes", self.strategy());
        Ok(true)
    }

    /// Shrink `allocation` from `old_size` to `new_size` bytes in place.
    /// Returns the size the allocation has afterwards.
    ///
    /// Heaps always shrink. Bump strategies shrink only their most recent
    /// allocation; any other keeps `old_size`, as do process heap and
    /// redirect arenas.
    pub fn shrink(
        &mut self,
        allocation: Allocation,
        old_size: usize,
        new_size: usize,
    ) -> Result<usize, ArenaError> {
        if new_size > old_size || new_size == 0 {
            return Err(violation(ArenaError::InvalidResize {
                address: allocation.addr(),
                from: old_size,
                to: new_size,
            }));
        }
        if matches!(self.kind, Kind::StdHeap(_)) {
            self.checked_size(allocation, Some(old_size))?;
            return Ok(old_size);
        }
        let address = allocation.addr();
        let used = self.counters.used;
        let shrunk = match &mut self.kind {
            Kind::Alias(source) => {
                return borrow_source_mut(source)?.shrink(allocation, old_size, new_size)
            }
            Kind::Redirect(_) | Kind::StdHeap(_) => false,
            Kind::FixedHeap { backing, list } => {
                let offset = backing
                    .offset_of(allocation, 0)
                    .map_err(|_| violation(ArenaError::UnknownAllocation { address }))?;
                list.shrink(backing.base_addr(), offset, old_size, new_size)?;
                self.counters.sync(list.len(), list.used());
                true
            }
            Kind::PagedHeap(heap) => {
                heap.shrink(allocation, old_size, new_size)?;
                self.counters.sync(heap.size(), heap.used());
                true
            }
            Kind::MarkedStack(region) => {
                let top = region.can_resize(used, allocation, old_size)?;
                if top {
                    self.counters.record_resize(old_size, new_size);
                }
                top
            }
            Kind::Buffer(buffer) => {
                let top = buffer.is_top(used, allocation, old_size)?;
                if top {
                    self.counters.record_resize(old_size, new_size);
                }
                top
            }
        };
        Ok(if shrunk { new_size } else { old_size })
    }

    fn copy_within(&mut self, from: Allocation, to: Allocation, len: usize) -> Result<(), ArenaError> {
        let bytes = self.read(from, len)?;
        self.write(to, &bytes)
    }

    // ── Marks ───────────────────────────────────────────────────

    /// Save the current `used` watermark. Returns the mark.
    pub fn push_mark(&mut self) -> Result<usize, ArenaError> {
        let strategy = self.strategy();
        match &mut self.kind {
            Kind::MarkedStack(region) => {
                region.push(self.counters.used)?;
                Ok(self.counters.used)
            }
            Kind::Alias(source) => borrow_source_mut(source)?.push_mark(),
            _ => Err(unsupported(Operation::PushMark, strategy)),
        }
    }

    /// Rewind `used` to the most recent mark and drop it. Returns the mark.
    ///
    /// The allocation count is not rewound.
    pub fn pop_mark(&mut self) -> Result<usize, ArenaError> {
        self.pop_mark_checked(None)
    }

    /// Like [`pop_mark`](Self::pop_mark), but fails with
    /// [`ArenaError::MarkMismatch`] unless the top mark is `mark`.
    pub fn pop_mark_expecting(&mut self, mark: usize) -> Result<(), ArenaError> {
        self.pop_mark_checked(Some(mark)).map(drop)
    }

    fn pop_mark_checked(&mut self, expected: Option<usize>) -> Result<usize, ArenaError> {
        let strategy = self.strategy();
        match &mut self.kind {
            Kind::MarkedStack(region) => {
                let mark = region.pop(expected)?;
                self.counters.rewind(mark);
                Ok(mark)
            }
            Kind::Alias(source) => {
                let mut source = borrow_source_mut(source)?;
                match expected {
                    Some(mark) => source.pop_mark_expecting(mark).map(|()| mark),
                    None => source.pop_mark(),
                }
            }
            _ => Err(unsupported(Operation::PopMark, strategy)),
        }
    }

    // ── Whole-arena operations ──────────────────────────────────

    /// Drop every allocation (and every mark) at once.
    pub fn clear(&mut self) -> Result<(), ArenaError> {
        let strategy = self.strategy();
        match &mut self.kind {
            Kind::Alias(source) => return borrow_source_mut(source)?.clear(),
            Kind::FixedHeap { list, .. } => {
                list.clear();
                self.counters.clear(list.len());
            }
            Kind::PagedHeap(heap) => {
                let cleared = heap.clear();
                self.counters.clear(heap.size());
                cleared?;
            }
            Kind::MarkedStack(region) => {
                region.clear();
                self.counters.clear(region.backing.len());
            }
            Kind::Buffer(buffer) => {
                buffer.clear();
                self.counters.clear(buffer.backing.len());
            }
            Kind::Redirect(_) | Kind::StdHeap(_) => {
                return Err(unsupported(Operation::Clear, strategy))
            }
        }
        Ok(())
    }

    /// Check internal bookkeeping for consistency.
    pub fn verify(&self) -> Result<(), ArenaError> {
        let used = self.counters.used;
        let detail = match &self.kind {
            Kind::Alias(source) => return borrow_source(source)?.verify(),
            Kind::Redirect(_) | Kind::StdHeap(_) => None,
            Kind::FixedHeap { list, .. } => list
                .verify()
                .err()
                .or_else(|| (list.used() != used).then(|| format!("used {used} vs records {}", list.used()))),
            Kind::PagedHeap(heap) => heap
                .verify()
                .err()
                .or_else(|| (heap.used() != used).then(|| format!("used {used} vs pages {}", heap.used()))),
            Kind::MarkedStack(region) => region.verify(used).err(),
            Kind::Buffer(buffer) => buffer.verify(used).err().or_else(|| {
                (buffer.live() != self.counters.num_allocations).then(|| {
                    format!(
                        "{} records vs {} allocations",
                        buffer.live(),
                        self.counters.num_allocations
                    )
                })
            }),
        };
        let bounded = !matches!(self.kind, Kind::Redirect(_) | Kind::StdHeap(_));
        let detail = detail.or_else(|| {
            (bounded && used > self.counters.size)
                .then(|| format!("used {used} exceeds size {}", self.counters.size))
        });
        match detail {
            Some(detail) => Err(violation(ArenaError::Corrupt { detail })),
            None => Ok(()),
        }
    }

    // ── Byte access ─────────────────────────────────────────────

    /// Run `f` over `len` bytes starting at `allocation`.
    pub fn with_bytes<R>(
        &self,
        allocation: Allocation,
        len: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, ArenaError> {
        match &self.kind {
            Kind::Redirect(raw) => raw
                .bytes(allocation, len)
                .map(f)
                .ok_or_else(|| out_of_bounds(allocation, len)),
            Kind::Alias(source) => borrow_source(source)?.with_bytes(allocation, len, f),
            Kind::StdHeap(heap) => heap
                .bytes(allocation, len)
                .map(f)
                .ok_or_else(|| out_of_bounds(allocation, len)),
            Kind::FixedHeap { backing, .. } => backing.with_bytes(allocation, len, f),
            Kind::PagedHeap(heap) => heap.with_bytes(allocation, len, f),
            Kind::MarkedStack(region) => region.backing.with_bytes(allocation, len, f),
            Kind::Buffer(buffer) => buffer.backing.with_bytes(allocation, len, f),
        }
    }

    /// Run `f` over `len` mutable bytes starting at `allocation`.
    pub fn with_bytes_mut<R>(
        &mut self,
        allocation: Allocation,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, ArenaError> {
        match &mut self.kind {
            Kind::Redirect(raw) => raw
                .bytes_mut(allocation, len)
                .map(f)
                .ok_or_else(|| out_of_bounds(allocation, len)),
            Kind::Alias(source) => {
                borrow_source_mut(source)?.with_bytes_mut(allocation, len, f)
            }
            Kind::StdHeap(heap) => heap
                .bytes_mut(allocation, len)
                .map(f)
                .ok_or_else(|| out_of_bounds(allocation, len)),
            Kind::FixedHeap { backing, .. } => backing.with_bytes_mut(allocation, len, f),
            Kind::PagedHeap(heap) => heap.with_bytes_mut(allocation, len, f),
            Kind::MarkedStack(region) => region.backing.with_bytes_mut(allocation, len, f),
            Kind::Buffer(buffer) => buffer.backing.with_bytes_mut(allocation, len, f),
        }
    }

    /// Copy `len` bytes out of the arena.
    pub fn read(&self, allocation: Allocation, len: usize) -> Result<Vec<u8>, ArenaError> {
        self.with_bytes(allocation, len, <[u8]>::to_vec)
    }

    /// Copy `bytes` into the arena at `allocation`.
    pub fn write(&mut self, allocation: Allocation, bytes: &[u8]) -> Result<(), ArenaError> {
        self.with_bytes_mut(allocation, bytes.len(), |dst| dst.copy_from_slice(bytes))
    }
}

impl fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("strategy", &self.strategy())
            .field("alignment", &self.alignment)
            .field("flags", &self.flags)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_test_utils::{AlignedBuffer, CountingAllocator, FailingAllocator};

    fn all_bounded(buf: &mut [u8]) -> Vec<Arena<'_>> {
        let len = buf.len();
        let (a, rest) = buf.split_at_mut(len / 3);
        let (b, c) = rest.split_at_mut(len / 3);
        vec![
            Arena::fixed_heap(a, Alignment::None).unwrap(),
            Arena::marked_stack(b, 4, Alignment::None).unwrap(),
            Arena::buffer(c, Alignment::None).unwrap(),
        ]
    }

    #[test]
    fn zero_byte_alloc_changes_nothing() {
        let mut buf = AlignedBuffer::<192>::new();
        let mut arenas = all_bounded(buf.as_mut_slice());
        arenas.push(Arena::std_heap());
        arenas.push(Arena::redirect(SystemHeap::new()));
        arenas.push(Arena::paged_heap(PagedHeapConfig::new(64), PageSource::system()).unwrap());
        arenas.push(Arena::alias(Arena::std_heap().into_shared()));
        for arena in &mut arenas {
            let before = arena.stats();
            assert_eq!(arena.alloc(0).unwrap(), None, "{}", arena.strategy());
            assert_eq!(arena.stats(), before, "{}", arena.strategy());
        }
    }

    #[test]
    fn default_alignment_applies_when_no_override() {
        let mut buf = AlignedBuffer::<128>::new();
        let mut arena = Arena::buffer(buf.as_mut_slice(), Alignment::Bytes16).unwrap();
        arena.alloc(3).unwrap().unwrap();
        let b = arena.alloc(3).unwrap().unwrap();
        assert!(b.is_aligned(Alignment::Bytes16));
        let c = arena.alloc_aligned(1, Alignment::Bytes4).unwrap().unwrap();
        assert!(c.is_aligned(Alignment::Bytes4));
    }

    #[test]
    fn heap_forwarders_reject_alignment() {
        let mut heap = Arena::std_heap();
        assert!(matches!(
            heap.alloc_aligned(8, Alignment::Bytes8),
            Err(ArenaError::UnsupportedAlignment {
                strategy: Strategy::StdHeap,
                ..
            })
        ));
        let mut redirect = Arena::redirect(SystemHeap::new());
        assert!(redirect.alloc_aligned(8, Alignment::Bytes16).is_err());
        assert_eq!(redirect.num_allocations(), 0);
    }

    #[test]
    fn redirect_counts_only_supplied_sizes() {
        let mut arena = Arena::redirect(SystemHeap::new());
        let a = arena.alloc(10).unwrap().unwrap();
        let b = arena.alloc(20).unwrap().unwrap();
        assert_eq!(arena.used(), 30);

        assert_eq!(arena.free(a, None).unwrap().size, None);
        assert_eq!(arena.used(), 30, "unsized free cannot lower used");
        assert_eq!(arena.num_allocations(), 1);

        assert_eq!(arena.free(b, Some(20)).unwrap().size, Some(20));
        assert_eq!(arena.used(), 10);
        assert!(matches!(
            arena.free(b, Some(20)),
            Err(ArenaError::UnknownAllocation { .. })
        ));
    }

    #[test]
    fn redirect_exhaustion_is_not_an_error() {
        let mut arena = Arena::redirect(FailingAllocator::after(1));
        assert!(arena.alloc(8).unwrap().is_some());
        assert_eq!(arena.alloc(8).unwrap(), None);
        assert_eq!(arena.num_allocations(), 1);
    }

    #[test]
    fn alias_reads_source_counters_live() {
        let source = Arena::std_heap().into_shared();
        let mut alias = Arena::alias(Rc::clone(&source));
        let a = alias.alloc(24).unwrap().unwrap();
        assert_eq!(alias.used(), 24);

        // A call made directly on the source is visible through the alias.
        source.borrow_mut().alloc(8).unwrap().unwrap();
        assert_eq!(alias.used(), 32);
        assert_eq!(alias.num_allocations(), 2);

        assert_eq!(alias.free(a, Some(24)).unwrap().size, Some(24));
        assert_eq!(source.borrow().used(), 8);
        assert_eq!(alias.strategy(), Strategy::Alias);
        assert_eq!(alias.alloc_size(a), None);
    }

    #[test]
    fn alias_with_borrowed_source_reports_busy() {
        let source = Arena::std_heap().into_shared();
        let mut alias = Arena::alias(Rc::clone(&source));
        let _held = source.borrow_mut();
        assert!(matches!(alias.alloc(4), Err(ArenaError::SourceBusy)));
    }

    #[test]
    fn single_alloc_refuses_second_request() {
        let mut buf = [0u8; 32];
        let mut arena = Arena::buffer(&mut buf[..], Alignment::None)
            .unwrap()
            .with_single_alloc(true);
        let a = arena.alloc(32).unwrap().unwrap();
        assert_eq!(arena.alloc(1).unwrap(), None);
        assert_eq!(arena.num_allocations(), 1);
        arena.free(a, None).unwrap();
        assert!(arena.alloc(4).unwrap().is_some());
    }

    #[test]
    fn fixed_heap_free_reports_size_and_checks_it() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::fixed_heap(&mut buf[..], Alignment::None).unwrap();
        let a = arena.alloc(16).unwrap().unwrap();
        let b = arena.alloc(16).unwrap().unwrap();
        assert_eq!(arena.alloc_size(a), Some(16));
        assert!(matches!(
            arena.free(a, Some(15)),
            Err(ArenaError::SizeMismatch { .. })
        ));
        assert_eq!(arena.free(a, None).unwrap().size, Some(16));
        assert!(matches!(
            arena.free(a, None),
            Err(ArenaError::DoubleFree { .. })
        ));
        arena.free(b, Some(16)).unwrap();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.num_allocations(), 0);
        arena.verify().unwrap();
    }

    #[test]
    fn marked_stack_rejects_free_and_realloc() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::marked_stack(&mut buf[..], 2, Alignment::None).unwrap();
        let a = arena.alloc(8).unwrap().unwrap();
        assert!(matches!(
            arena.free(a, Some(8)),
            Err(ArenaError::Unsupported {
                operation: Operation::Free,
                strategy: Strategy::MarkedStack,
            })
        ));
        assert!(matches!(
            arena.realloc(Some(a), 16, Some(8), Alignment::None),
            Err(ArenaError::Unsupported {
                operation: Operation::Realloc,
                ..
            })
        ));
        assert_eq!(arena.used(), 8);
    }

    #[test]
    fn marks_are_unsupported_elsewhere() {
        let mut arena = Arena::std_heap();
        assert!(matches!(
            arena.push_mark(),
            Err(ArenaError::Unsupported {
                operation: Operation::PushMark,
                ..
            })
        ));
        assert!(arena.pop_mark().is_err());
        assert!(!arena.supports_marks());
        assert!(arena.supports_freeing());
    }

    #[test]
    fn pop_mark_expecting_checks_the_mark() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::marked_stack(&mut buf[..], 4, Alignment::None).unwrap();
        let outer = arena.push_mark().unwrap();
        arena.alloc(8).unwrap().unwrap();
        let inner = arena.push_mark().unwrap();
        assert_eq!((outer, inner), (0, 8));
        assert!(matches!(
            arena.pop_mark_expecting(outer),
            Err(ArenaError::MarkMismatch { .. })
        ));
        arena.pop_mark_expecting(inner).unwrap();
        arena.pop_mark_expecting(outer).unwrap();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.stats().high_mark_count, 2);
    }

    #[test]
    fn realloc_same_size_returns_same_handle() {
        let mut buf = AlignedBuffer::<64>::new();
        let mut arena = Arena::fixed_heap(buf.as_mut_slice(), Alignment::None).unwrap();
        let a = arena.alloc(12).unwrap().unwrap();
        let r = arena.realloc(Some(a), 12, Some(12), Alignment::None).unwrap();
        assert_eq!(r.allocation, Some(a));
        assert_eq!(arena.num_allocations(), 1);
    }

    #[test]
    fn realloc_to_zero_frees() {
        let mut arena = Arena::std_heap();
        let a = arena.alloc(12).unwrap().unwrap();
        let r = arena.realloc(Some(a), 0, Some(12), Alignment::None).unwrap();
        assert_eq!(r.allocation, None);
        assert_eq!(r.old_size, Some(12));
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.num_allocations(), 0);
    }

    #[test]
    fn realloc_from_nothing_allocates() {
        let mut arena = Arena::std_heap();
        let r = arena.realloc(None, 8, None, Alignment::None).unwrap();
        assert!(r.allocation.is_some());
        assert_eq!(arena.num_allocations(), 1);
    }

    #[test]
    fn fixed_heap_realloc_copies_bytes() {
        let mut buf = [0u8; 128];
        let mut arena = Arena::fixed_heap(&mut buf[..], Alignment::None).unwrap();
        let a = arena.alloc_copy(b"hello").unwrap().unwrap();
        let r = arena.realloc(Some(a), 10, None, Alignment::None).unwrap();
        let b = r.allocation.unwrap();
        assert_eq!(r.old_size, Some(5));
        assert_eq!(arena.read(b, 5).unwrap(), b"hello");
        assert_eq!(arena.num_allocations(), 1);
        assert_eq!(arena.used(), 10);
        arena.verify().unwrap();
    }

    #[test]
    fn failed_growth_frees_the_original() {
        let mut buf = [0u8; 32];
        let mut arena = Arena::fixed_heap(&mut buf[..], Alignment::None).unwrap();
        let a = arena.alloc(20).unwrap().unwrap();
        let r = arena.realloc(Some(a), 30, Some(20), Alignment::None).unwrap();
        assert_eq!(r.allocation, None);
        assert_eq!(r.old_size, Some(20));
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.num_allocations(), 0);
    }

    #[test]
    fn realloc_with_wrong_old_size_allocates_nothing() {
        let mut buf = [0u8; 128];
        let mut arena = Arena::fixed_heap(&mut buf[..], Alignment::None).unwrap();
        let a = arena.alloc(8).unwrap().unwrap();
        assert!(matches!(
            arena.realloc(Some(a), 16, Some(9), Alignment::None),
            Err(ArenaError::SizeMismatch {
                given: 9,
                actual: 8,
                ..
            })
        ));
        assert_eq!(arena.used(), 8);
        assert_eq!(arena.num_allocations(), 1);
        arena.verify().unwrap();

        arena.free(a, Some(8)).unwrap();
        assert!(matches!(
            arena.realloc(Some(a), 16, None, Alignment::None),
            Err(ArenaError::UnknownAllocation { .. })
        ));
        assert_eq!(arena.num_allocations(), 0);
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn redirect_realloc_of_freed_handle_returns_the_new_block() {
        let mut counting = CountingAllocator::new();
        {
            let mut arena = Arena::redirect(&mut counting);
            let a = arena.alloc(8).unwrap().unwrap();
            // Keeps the freed block from merging into anything the
            // larger request could land on.
            let guard = arena.alloc(8).unwrap().unwrap();
            arena.free(a, Some(8)).unwrap();

            assert!(arena.realloc(Some(a), 4096, Some(8), Alignment::None).is_err());
            assert_eq!(arena.num_allocations(), 1);
            assert_eq!(arena.used(), 8);
            arena.free(guard, Some(8)).unwrap();
        }
        assert_eq!(counting.allocations, 3);
        assert_eq!(counting.outstanding(), 0);
    }

    #[test]
    fn refused_page_return_still_updates_counters() {
        let source = FailingAllocator::after(usize::MAX).refusing_frees();
        let mut arena =
            Arena::paged_heap(PagedHeapConfig::new(64), PageSource::Allocator(Box::new(source)))
                .unwrap();
        let a = arena.alloc(40).unwrap().unwrap();
        let b = arena.alloc(70).unwrap().unwrap();
        assert_eq!(arena.page_count(), Some(2));

        assert!(matches!(
            arena.free(b, Some(70)),
            Err(ArenaError::UnknownAllocation { .. })
        ));
        assert_eq!(arena.page_count(), Some(1));
        assert_eq!(arena.size(), 104);
        assert_eq!(arena.used(), 40);
        assert_eq!(arena.num_allocations(), 1);
        arena.verify().unwrap();

        for _ in 0..2 {
            arena.alloc(70).unwrap().unwrap();
        }
        assert!(arena.clear().is_err());
        assert_eq!(arena.page_count(), Some(1));
        assert_eq!(arena.size(), 104);
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.num_allocations(), 0);
        arena.verify().unwrap();
        assert!(arena.alloc_size(a).is_none());
    }

    #[test]
    fn fixed_heap_grows_into_the_following_hole() {
        let mut buf = AlignedBuffer::<128>::new();
        let mut arena = Arena::fixed_heap(buf.as_mut_slice(), Alignment::None).unwrap();
        let a = arena.alloc_copy(b"abcd").unwrap().unwrap();
        let b = arena.alloc(16).unwrap().unwrap();
        assert_eq!(arena.grow_query(a, 4).unwrap(), 0);

        arena.free(b, Some(16)).unwrap();
        assert_eq!(arena.grow_query(a, 4).unwrap(), 124);
        assert!(arena.grow(a, 4, 32).unwrap());
        assert_eq!(arena.alloc_size(a), Some(32));
        assert_eq!(arena.used(), 32);
        assert_eq!(arena.read(a, 4).unwrap(), b"abcd");
        assert!(!arena.grow(a, 32, 200).unwrap());
        assert_eq!(arena.used(), 32);

        assert_eq!(arena.shrink(a, 32, 8).unwrap(), 8);
        assert_eq!(arena.used(), 8);
        assert_eq!(arena.grow_query(a, 8).unwrap(), 120);
        arena.verify().unwrap();

        assert!(matches!(
            arena.grow(a, 4, 16),
            Err(ArenaError::SizeMismatch {
                given: 4,
                actual: 8,
                ..
            })
        ));
        assert!(matches!(
            arena.shrink(a, 8, 0),
            Err(ArenaError::InvalidResize { .. })
        ));
        assert!(matches!(
            arena.grow(a, 8, 4),
            Err(ArenaError::InvalidResize { .. })
        ));
    }

    #[test]
    fn paged_heap_resizes_within_its_page() {
        let mut arena =
            Arena::paged_heap(PagedHeapConfig::new(256), PageSource::system()).unwrap();
        let a = arena.alloc(16).unwrap().unwrap();
        assert_eq!(arena.grow_query(a, 16).unwrap(), 240);
        assert!(arena.grow(a, 16, 100).unwrap());
        assert_eq!(arena.used(), 100);
        assert_eq!(arena.shrink(a, 100, 10).unwrap(), 10);
        assert_eq!(arena.used(), 10);
        assert_eq!(arena.free(a, None).unwrap().size, Some(10));
        arena.verify().unwrap();
    }

    #[test]
    fn buffer_resizes_only_its_top() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::buffer(&mut buf[..], Alignment::None).unwrap();
        let a = arena.alloc(8).unwrap().unwrap();
        let b = arena.alloc(8).unwrap().unwrap();
        assert_eq!(arena.grow_query(a, 8).unwrap(), 0);
        assert_eq!(arena.grow_query(b, 8).unwrap(), 48);
        assert!(!arena.grow(a, 8, 12).unwrap());
        assert!(arena.grow(b, 8, 20).unwrap());
        assert_eq!(arena.used(), 28);

        assert_eq!(arena.shrink(a, 8, 4).unwrap(), 8);
        assert_eq!(arena.shrink(b, 20, 10).unwrap(), 10);
        assert_eq!(arena.used(), 18);
        arena.free(b, Some(10)).unwrap();
        arena.free(a, Some(8)).unwrap();
        assert_eq!(arena.used(), 0);
        arena.verify().unwrap();
    }

    #[test]
    fn marked_stack_resize_stops_at_the_top_mark() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::marked_stack(&mut buf[..], 2, Alignment::None).unwrap();
        let a = arena.alloc(8).unwrap().unwrap();
        assert_eq!(arena.grow_query(a, 8).unwrap(), 56);
        assert!(arena.grow(a, 8, 24).unwrap());
        assert_eq!(arena.used(), 24);

        arena.push_mark().unwrap();
        assert_eq!(arena.grow_query(a, 24).unwrap(), 0);
        assert_eq!(arena.shrink(a, 24, 4).unwrap(), 24);
        arena.pop_mark().unwrap();
        assert_eq!(arena.shrink(a, 24, 4).unwrap(), 4);
        assert_eq!(arena.used(), 4);
        arena.verify().unwrap();
    }

    #[test]
    fn resize_forwards_through_alias_and_stays_put_on_heaps() {
        let source = Arena::fixed_heap(vec![0u8; 64], Alignment::None)
            .unwrap()
            .into_shared();
        let mut alias = Arena::alias(Rc::clone(&source));
        let a = alias.alloc(8).unwrap().unwrap();
        assert_eq!(alias.grow_query(a, 8).unwrap(), 56);
        assert!(alias.grow(a, 8, 16).unwrap());
        assert_eq!(source.borrow().alloc_size(a), Some(16));
        assert_eq!(alias.shrink(a, 16, 2).unwrap(), 2);
        assert_eq!(source.borrow().used(), 2);

        let mut heap = Arena::std_heap();
        let b = heap.alloc(8).unwrap().unwrap();
        assert_eq!(heap.grow_query(b, 8).unwrap(), 0);
        assert!(!heap.grow(b, 8, 9).unwrap());
        assert_eq!(heap.shrink(b, 8, 4).unwrap(), 8);
        assert_eq!(heap.used(), 8);

        let mut redirect = Arena::redirect(SystemHeap::new());
        let c = redirect.alloc(8).unwrap().unwrap();
        assert_eq!(redirect.grow_query(c, 8).unwrap(), 0);
        assert_eq!(redirect.shrink(c, 8, 4).unwrap(), 8);
    }

    #[test]
    fn buffer_realloc_of_top_keeps_bytes() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::buffer(&mut buf[..], Alignment::None).unwrap();
        arena.alloc(4).unwrap().unwrap();
        let top = arena.alloc_copy(b"abc").unwrap().unwrap();
        let r = arena.realloc(Some(top), 6, Some(3), Alignment::None).unwrap();
        let grown = r.allocation.unwrap();
        assert_eq!(grown, top, "top block regrows in place");
        assert_eq!(arena.read(grown, 3).unwrap(), b"abc");
        assert_eq!(arena.used(), 10);
        assert_eq!(arena.num_allocations(), 2);
    }

    #[test]
    fn std_heap_realloc_adjusts_used_by_delta() {
        let mut arena = Arena::std_heap();
        let a = arena.alloc_copy(&[1, 2, 3, 4]).unwrap().unwrap();
        let r = arena.realloc(Some(a), 8, Some(4), Alignment::None).unwrap();
        let b = r.allocation.unwrap();
        assert_eq!(arena.used(), 8);
        assert_eq!(arena.num_allocations(), 1);
        assert_eq!(arena.read(b, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn clear_resets_region_strategies() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::marked_stack(&mut buf[..], 2, Alignment::None).unwrap();
        arena.push_mark().unwrap();
        arena.alloc(32).unwrap().unwrap();
        arena.clear().unwrap();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.num_marks(), 0);
        assert!(matches!(
            Arena::std_heap().clear(),
            Err(ArenaError::Unsupported {
                operation: Operation::Clear,
                ..
            })
        ));
    }

    #[test]
    fn empty_backing_is_rejected() {
        let mut empty: [u8; 0] = [];
        assert!(matches!(
            Arena::buffer(&mut empty[..], Alignment::None),
            Err(ArenaError::InvalidConfig { .. })
        ));
        assert!(matches!(
            Arena::marked_stack(vec![0u8; 8], 0, Alignment::None),
            Err(ArenaError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn buffer_from_source_is_single_alloc_and_returns_its_region() {
        let source = Arena::std_heap().into_shared();
        let mut arena = Arena::buffer_from(&source, 48).unwrap().unwrap();
        assert!(arena.flags().single_alloc);
        assert_eq!(source.borrow().used(), 48);

        let a = arena.alloc_copy(&[7; 48]).unwrap().unwrap();
        assert_eq!(arena.alloc(1).unwrap(), None);
        assert_eq!(arena.read(a, 2).unwrap(), vec![7, 7]);
        arena.free(a, None).unwrap();
        arena.release().unwrap();
        assert_eq!(source.borrow().num_allocations(), 0);
        assert_eq!(source.borrow().used(), 0);
    }

    #[test]
    fn telemetry_tracks_high_water() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::buffer(&mut buf[..], Alignment::None).unwrap();
        let a = arena.alloc(10).unwrap().unwrap();
        let b = arena.alloc(20).unwrap().unwrap();
        arena.free(b, Some(20)).unwrap();
        arena.free(a, Some(10)).unwrap();
        let stats = arena.stats();
        assert_eq!(stats.high_used_mark, 30);
        assert_eq!(stats.high_alloc_mark, 2);
        arena.reset_high_used_mark();
        assert_eq!(arena.stats().resettable_high_used_mark, 0);
        assert_eq!(arena.stats().high_used_mark, 30);
    }

    #[test]
    fn debug_shows_strategy() {
        let arena = Arena::std_heap();
        assert!(format!("{arena:?}").contains("StdHeap"));
    }
}
