//! Paged heap: a free list per page, pages grown on demand.

use strata_core::{Alignment, Allocation, RawAllocator, MAX_ALIGNMENT};

use crate::backing::{borrow_source, borrow_source_mut, SharedArena};
use crate::config::PagedHeapConfig;
use crate::error::{violation, ArenaError};
use crate::free_list::FreeList;

/// Where a paged heap gets its pages.
pub enum PageSource<'buf> {
    /// Pages are allocated from another arena.
    Arena(SharedArena<'buf>),
    /// Pages come from an external allocator.
    Allocator(Box<dyn RawAllocator + 'buf>),
}

impl<'buf> PageSource<'buf> {
    /// Pages from the process heap.
    pub fn system() -> Self {
        Self::Allocator(Box::new(strata_core::SystemHeap::new()))
    }

    fn allocate(&mut self, len: usize) -> Result<Option<Allocation>, ArenaError> {
        match self {
            Self::Arena(source) => borrow_source_mut(source)?.alloc(len),
            Self::Allocator(raw) => Ok(raw.allocate(len)),
        }
    }

    fn deallocate(&mut self, start: Allocation, len: usize) -> Result<(), ArenaError> {
        match self {
            Self::Arena(source) => borrow_source_mut(source)?.free(start, Some(len)).map(drop),
            Self::Allocator(raw) => {
                if raw.deallocate(start) {
                    Ok(())
                } else {
                    Err(violation(ArenaError::UnknownAllocation {
                        address: start.addr(),
                    }))
                }
            }
        }
    }

    fn with_bytes<R>(
        &self,
        at: Allocation,
        len: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, ArenaError> {
        match self {
            Self::Arena(source) => borrow_source(source)?.with_bytes(at, len, f),
            Self::Allocator(raw) => raw.bytes(at, len).map(f).ok_or(ArenaError::OutOfBounds {
                address: at.addr(),
                len,
            }),
        }
    }

    fn with_bytes_mut<R>(
        &mut self,
        at: Allocation,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, ArenaError> {
        match self {
            Self::Arena(source) => borrow_source_mut(source)?.with_bytes_mut(at, len, f),
            Self::Allocator(raw) => raw
                .bytes_mut(at, len)
                .map(f)
                .ok_or(ArenaError::OutOfBounds {
                    address: at.addr(),
                    len,
                }),
        }
    }
}

struct Page {
    start: Allocation,
    list: FreeList,
}

/// A page taken off the heap after its last allocation was freed.
pub(crate) struct EmptyPage {
    index: usize,
    start: Allocation,
    len: usize,
}

impl Page {
    fn contains(&self, at: Allocation) -> bool {
        at.addr() >= self.start.addr() && at.addr() < self.start.addr() + self.list.len()
    }

    fn data_offset(&self, at: Allocation) -> usize {
        at.addr() - self.start.addr()
    }
}

pub(crate) struct PagedHeap<'buf> {
    config: PagedHeapConfig,
    source: PageSource<'buf>,
    pages: Vec<Page>,
}

impl<'buf> PagedHeap<'buf> {
    pub(crate) fn new(config: PagedHeapConfig, source: PageSource<'buf>) -> Self {
        Self {
            config,
            source,
            pages: Vec::new(),
        }
    }

    pub(crate) fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Total bytes across all pages.
    pub(crate) fn size(&self) -> usize {
        self.pages.iter().map(|p| p.list.len()).sum()
    }

    pub(crate) fn used(&self) -> usize {
        self.pages.iter().map(|p| p.list.used()).sum()
    }

    pub(crate) fn alloc(
        &mut self,
        size: usize,
        align: Alignment,
    ) -> Result<Option<Allocation>, ArenaError> {
        for page in &mut self.pages {
            if let Some(offset) = page.list.alloc(page.start.addr(), size, align) {
                return Ok(Some(page.start.offset(offset)));
            }
        }

        if self.config.max_pages != 0 && self.pages.len() >= self.config.max_pages {
            return Ok(None);
        }
        let page_len = self
            .config
            .page_size
            .max(size.saturating_add(MAX_ALIGNMENT));
        let Some(start) = self.source.allocate(page_len)? else {
            return Ok(None);
        };
        log::debug!(
            "paged heap grew to {} pages (+{page_len} bytes)",
            self.pages.len() + 1
        );
        let mut page = Page {
            start,
            list: FreeList::new(page_len),
        };
        let allocation = page
            .list
            .alloc(start.addr(), size, align)
            .map(|offset| start.offset(offset));
        self.pages.push(page);
        Ok(allocation)
    }

    /// Free an allocation and return its size.
    ///
    /// A page left empty is detached from the heap here but not yet given
    /// back; pass it to [`return_page`](Self::return_page).
    pub(crate) fn free(
        &mut self,
        allocation: Allocation,
        size: Option<usize>,
    ) -> Result<(usize, Option<EmptyPage>), ArenaError> {
        let index = self.page_of(allocation)?;
        let page = &mut self.pages[index];
        let base = page.start.addr();
        let offset = page.data_offset(allocation);
        let freed = page.list.free(base, offset, size)?;

        let emptied = (self.config.auto_free_pages && index > 0 && page.list.is_empty())
            .then(|| self.pages.remove(index))
            .map(|page| EmptyPage {
                index,
                start: page.start,
                len: page.list.len(),
            });
        Ok((freed, emptied))
    }

    /// Hand a detached page back to the source.
    pub(crate) fn return_page(&mut self, page: EmptyPage) -> Result<(), ArenaError> {
        log::debug!("paged heap returned empty page {}", page.index);
        self.source.deallocate(page.start, page.len)
    }

    /// Free bytes directly after an allocation of `size` bytes.
    pub(crate) fn room_after(&self, allocation: Allocation, size: usize) -> Result<usize, ArenaError> {
        let page = &self.pages[self.page_of(allocation)?];
        page.list
            .room_after(page.start.addr(), page.data_offset(allocation), size)
    }

    pub(crate) fn grow(
        &mut self,
        allocation: Allocation,
        old: usize,
        new: usize,
    ) -> Result<bool, ArenaError> {
        let index = self.page_of(allocation)?;
        let page = &mut self.pages[index];
        let base = page.start.addr();
        let offset = page.data_offset(allocation);
        page.list.grow(base, offset, old, new)
    }

    pub(crate) fn shrink(
        &mut self,
        allocation: Allocation,
        old: usize,
        new: usize,
    ) -> Result<(), ArenaError> {
        let index = self.page_of(allocation)?;
        let page = &mut self.pages[index];
        let base = page.start.addr();
        let offset = page.data_offset(allocation);
        page.list.shrink(base, offset, old, new)
    }

    pub(crate) fn data_size(&self, allocation: Allocation) -> Option<usize> {
        let page = self.pages.iter().find(|p| p.contains(allocation))?;
        page.list.data_size(page.data_offset(allocation))
    }

    /// Empty the heap, keeping only the first page.
    ///
    /// Every other page is detached even when the source refuses one; the
    /// first refusal is reported.
    pub(crate) fn clear(&mut self) -> Result<(), ArenaError> {
        let mut refused = Ok(());
        while self.pages.len() > 1 {
            if let Some(page) = self.pages.pop() {
                let returned = self.source.deallocate(page.start, page.list.len());
                refused = refused.and(returned);
            }
        }
        if let Some(first) = self.pages.first_mut() {
            first.list.clear();
        }
        refused
    }

    /// Return every page to the source.
    pub(crate) fn release(&mut self) -> Result<(), ArenaError> {
        while let Some(page) = self.pages.pop() {
            self.source.deallocate(page.start, page.list.len())?;
        }
        Ok(())
    }

    pub(crate) fn verify(&self) -> Result<(), String> {
        for (index, page) in self.pages.iter().enumerate() {
            page.list
                .verify()
                .map_err(|detail| format!("page {index}: {detail}"))?;
            if self.config.auto_free_pages && index > 0 && page.list.is_empty() {
                return Err(format!("page {index} is empty but was not returned"));
            }
        }
        if self.config.max_pages != 0 && self.pages.len() > self.config.max_pages {
            return Err(format!(
                "{} pages exceed the limit of {}",
                self.pages.len(),
                self.config.max_pages
            ));
        }
        Ok(())
    }

    pub(crate) fn with_bytes<R>(
        &self,
        at: Allocation,
        len: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, ArenaError> {
        self.check_range(at, len)?;
        self.source.with_bytes(at, len, f)
    }

    pub(crate) fn with_bytes_mut<R>(
        &mut self,
        at: Allocation,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, ArenaError> {
        self.check_range(at, len)?;
        self.source.with_bytes_mut(at, len, f)
    }

    fn check_range(&self, at: Allocation, len: usize) -> Result<(), ArenaError> {
        let page = self
            .pages
            .iter()
            .find(|p| p.contains(at))
            .ok_or(ArenaError::OutOfBounds {
                address: at.addr(),
                len,
            })?;
        if page.data_offset(at) + len > page.list.len() {
            return Err(ArenaError::OutOfBounds {
                address: at.addr(),
                len,
            });
        }
        Ok(())
    }

    fn page_of(&self, allocation: Allocation) -> Result<usize, ArenaError> {
        self.pages
            .iter()
            .position(|p| p.contains(allocation))
            .ok_or_else(|| {
                violation(ArenaError::UnknownAllocation {
                    address: allocation.addr(),
                })
            })
    }
}

impl Drop for PagedHeap<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("paged heap pages not returned to source: {err}");
        }
    }
}
