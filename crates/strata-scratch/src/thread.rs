//! The per-thread scratch pool and its scoped guard.
//!
//! Each thread installs its own [`ScratchPool`]; nothing here is shared
//! across threads, so no locking is involved. Guards are `!Send` and must
//! be dropped (or released) in the reverse order they were acquired.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;

use strata_arena::{Alignment, Allocation, Arena, SharedArena};

use crate::config::ScratchConfig;
use crate::error::ScratchError;
use crate::pool::{ScratchId, ScratchPool};

thread_local! {
    static THREAD_POOL: RefCell<Option<ScratchPool<'static>>> = const { RefCell::new(None) };
}

fn install(pool: ScratchPool<'static>) -> Result<u64, ScratchError> {
    THREAD_POOL.with(|cell| {
        let mut current = cell.try_borrow_mut().map_err(|_| ScratchError::PoolBusy)?;
        let id = pool.id();
        if let Some(old) = current.replace(pool) {
            log::debug!("thread scratch pool {} replaced by {id}", old.id());
        }
        Ok(id)
    })
}

/// Give this thread a heap-backed scratch pool, replacing any existing one.
///
/// Returns the new pool's id. A config with `slot_size == 0` installs a
/// disabled pool.
pub fn init_thread_scratch(config: &ScratchConfig) -> Result<u64, ScratchError> {
    install(ScratchPool::with_heap(config)?)
}

/// Give this thread a scratch pool carved from `source`.
pub fn init_thread_scratch_from(
    source: &SharedArena<'static>,
    config: &ScratchConfig,
) -> Result<u64, ScratchError> {
    install(ScratchPool::from_source(source, config)?)
}

/// Tear down this thread's pool. Returns whether one was installed.
///
/// Guards still alive afterwards fail to release with
/// [`ScratchError::ForeignSlot`].
pub fn free_thread_scratch() -> Result<bool, ScratchError> {
    THREAD_POOL.with(|cell| {
        let pool = cell
            .try_borrow_mut()
            .map_err(|_| ScratchError::PoolBusy)?
            .take();
        if let Some(pool) = &pool {
            log::debug!("thread scratch pool {} freed", pool.id());
        }
        Ok(pool.is_some())
    })
}

/// Whether this thread has an enabled scratch pool.
pub fn thread_scratch_enabled() -> bool {
    THREAD_POOL
        .try_with(|cell| {
            cell.try_borrow()
                .is_ok_and(|pool| pool.as_ref().is_some_and(ScratchPool::is_enabled))
        })
        .unwrap_or(false)
}

/// Whether this thread's pool has no outstanding acquires.
///
/// A thread without a pool counts as idle.
pub fn thread_scratch_idle() -> bool {
    THREAD_POOL
        .try_with(|cell| {
            cell.try_borrow()
                .is_ok_and(|pool| pool.as_ref().is_none_or(ScratchPool::is_idle))
        })
        .unwrap_or(true)
}

/// Acquire a scratch arena on this thread, skipping the slots behind
/// `avoid1` and `avoid2`.
///
/// Pass the ids of any scratch arenas the caller is still holding, so
/// the new one cannot alias them. Returns `Ok(None)` when the thread has
/// no pool or its pool is disabled.
pub fn acquire_scratch(
    avoid1: Option<ScratchId>,
    avoid2: Option<ScratchId>,
) -> Result<Option<ScratchArena>, ScratchError> {
    THREAD_POOL.with(|cell| {
        let pool = cell.try_borrow().map_err(|_| ScratchError::PoolBusy)?;
        let Some(pool) = pool.as_ref() else {
            return Ok(None);
        };
        Ok(pool
            .acquire_marked(avoid1, avoid2)?
            .map(|(id, mark)| ScratchArena {
                id,
                mark,
                released: false,
                _not_send: PhantomData,
            }))
    })
}

fn with_thread_pool<R>(
    id: ScratchId,
    f: impl FnOnce(&ScratchPool<'static>) -> Result<R, ScratchError>,
) -> Result<R, ScratchError> {
    let gone = || ScratchError::ForeignSlot {
        pool: id.pool(),
        index: id.index(),
    };
    THREAD_POOL
        .try_with(|cell| {
            let pool = cell.try_borrow().map_err(|_| ScratchError::PoolBusy)?;
            f(pool.as_ref().ok_or_else(gone)?)
        })
        .map_err(|_| gone())?
}

/// A scratch arena held for the current scope.
///
/// Dropping the guard pops the mark taken at acquire time, releasing
/// everything allocated through it.
pub struct ScratchArena {
    id: ScratchId,
    mark: usize,
    released: bool,
    _not_send: PhantomData<*const ()>,
}

impl ScratchArena {
    /// Handle of the slot, for passing as an avoid argument.
    pub fn id(&self) -> ScratchId {
        self.id
    }

    /// The `used` watermark this guard rewinds to.
    pub fn mark(&self) -> usize {
        self.mark
    }

    /// Run `f` against the underlying arena.
    pub fn with<R>(&self, f: impl FnOnce(&mut Arena<'static>) -> R) -> Result<R, ScratchError> {
        with_thread_pool(self.id, |pool| pool.with_slot(self.id, f))
    }

    /// Allocate `size` bytes.
    pub fn alloc(&self, size: usize) -> Result<Option<Allocation>, ScratchError> {
        self.alloc_aligned(size, Alignment::None)
    }

    /// Allocate `size` bytes at `align`.
    pub fn alloc_aligned(
        &self,
        size: usize,
        align: Alignment,
    ) -> Result<Option<Allocation>, ScratchError> {
        self.with(|arena| arena.alloc_aligned(size, align))?.map_err(ScratchError::from)
    }

    /// Allocate and fill from `bytes`.
    pub fn alloc_copy(&self, bytes: &[u8]) -> Result<Option<Allocation>, ScratchError> {
        self.with(|arena| arena.alloc_copy(bytes))?.map_err(ScratchError::from)
    }

    /// Copy `len` bytes out of the arena.
    pub fn read(&self, allocation: Allocation, len: usize) -> Result<Vec<u8>, ScratchError> {
        self.with(|arena| arena.read(allocation, len))?.map_err(ScratchError::from)
    }

    /// Copy `bytes` into the arena at `allocation`.
    pub fn write(&self, allocation: Allocation, bytes: &[u8]) -> Result<(), ScratchError> {
        self.with(|arena| arena.write(allocation, bytes))?.map_err(ScratchError::from)
    }

    /// Bytes in use in the slot, including outer scopes.
    pub fn used(&self) -> Result<usize, ScratchError> {
        self.with(|arena| arena.used())
    }

    /// Release now and report failures, which dropping only logs.
    pub fn release(mut self) -> Result<(), ScratchError> {
        self.released = true;
        with_thread_pool(self.id, |pool| pool.release_expecting(self.id, self.mark))
    }
}

impl Drop for ScratchArena {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = with_thread_pool(self.id, |pool| pool.release_expecting(self.id, self.mark)) {
            log::warn!("scratch arena {} not released on drop: {err}", self.id);
        }
    }
}

impl fmt::Debug for ScratchArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchArena")
            .field("id", &self.id)
            .field("mark", &self.mark)
            .finish()
    }
}
