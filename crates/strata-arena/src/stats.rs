//! Usage counters and high-water telemetry.

/// Point-in-time view of an arena's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Capacity in bytes. `0` for unbounded strategies.
    pub size: usize,
    /// Bytes in use, including alignment padding.
    pub used: usize,
    /// Allocations made and not yet freed.
    ///
    /// Only exact for strategies that track every free. Marked stacks
    /// never decrease it.
    pub num_allocations: usize,
    /// Highest `used` ever observed.
    pub high_used_mark: usize,
    /// Highest `used` since the last [`reset_high_used_mark`](crate::Arena::reset_high_used_mark).
    pub resettable_high_used_mark: usize,
    /// Highest `num_allocations` ever observed.
    pub high_alloc_mark: usize,
    /// Marks currently pushed.
    pub num_marks: usize,
    /// Highest `num_marks` ever observed.
    pub high_mark_count: usize,
}

/// Mutable counters owned by an arena.
#[derive(Clone, Debug, Default)]
pub(crate) struct Counters {
    pub(crate) size: usize,
    pub(crate) used: usize,
    pub(crate) num_allocations: usize,
    high_used_mark: usize,
    resettable_high_used_mark: usize,
    high_alloc_mark: usize,
    telemetry: bool,
}

impl Counters {
    pub(crate) fn new(size: usize, used: usize, telemetry: bool) -> Self {
        let mut counters = Self {
            size,
            used,
            telemetry,
            ..Self::default()
        };
        counters.observe();
        counters
    }

    pub(crate) fn set_telemetry(&mut self, enabled: bool) {
        self.telemetry = enabled;
    }

    /// A successful allocation charged `bytes` to `used`.
    pub(crate) fn record_alloc(&mut self, bytes: usize) {
        self.used = self.used.saturating_add(bytes);
        self.num_allocations += 1;
        self.observe();
    }

    /// A free released `bytes` from `used`.
    pub(crate) fn record_free(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes);
        self.num_allocations = self.num_allocations.saturating_sub(1);
    }

    /// A successful allocation by a strategy that computes its own totals.
    pub(crate) fn record_alloc_at(&mut self, size: usize, used: usize) {
        self.num_allocations += 1;
        self.sync(size, used);
    }

    /// A free by a strategy that computes its own totals.
    pub(crate) fn record_free_at(&mut self, size: usize, used: usize) {
        self.num_allocations = self.num_allocations.saturating_sub(1);
        self.sync(size, used);
    }

    /// An allocation changed size in place (or moved) from `old` to `new` bytes.
    pub(crate) fn record_resize(&mut self, old: usize, new: usize) {
        self.used = self.used.saturating_sub(old).saturating_add(new);
        self.observe();
    }

    /// Rewind `used` to a mark. The allocation count is left alone.
    pub(crate) fn rewind(&mut self, used: usize) {
        self.used = used;
    }

    /// Forget every allocation.
    pub(crate) fn clear(&mut self, size: usize) {
        self.size = size;
        self.used = 0;
        self.num_allocations = 0;
    }

    /// Overwrite `used` (and `size`) from a strategy that computes them.
    pub(crate) fn sync(&mut self, size: usize, used: usize) {
        self.size = size;
        self.used = used;
        self.observe();
    }

    pub(crate) fn reset_high_used_mark(&mut self) {
        self.resettable_high_used_mark = self.used;
    }

    fn observe(&mut self) {
        if !self.telemetry {
            return;
        }
        self.high_used_mark = self.high_used_mark.max(self.used);
        self.resettable_high_used_mark = self.resettable_high_used_mark.max(self.used);
        self.high_alloc_mark = self.high_alloc_mark.max(self.num_allocations);
    }

    pub(crate) fn snapshot(&self, num_marks: usize, high_mark_count: usize) -> ArenaStats {
        ArenaStats {
            size: self.size,
            used: self.used,
            num_allocations: self.num_allocations,
            high_used_mark: self.high_used_mark,
            resettable_high_used_mark: self.resettable_high_used_mark,
            high_alloc_mark: self.high_alloc_mark,
            num_marks,
            high_mark_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_marks_never_decrease() {
        let mut c = Counters::new(100, 0, true);
        c.record_alloc(40);
        c.record_alloc(20);
        c.record_free(20);
        c.record_free(40);
        let s = c.snapshot(0, 0);
        assert_eq!(s.used, 0);
        assert_eq!(s.num_allocations, 0);
        assert_eq!(s.high_used_mark, 60);
        assert_eq!(s.high_alloc_mark, 2);
    }

    #[test]
    fn resettable_mark_restarts_from_current_use() {
        let mut c = Counters::new(100, 0, true);
        c.record_alloc(50);
        c.record_free(30);
        c.reset_high_used_mark();
        assert_eq!(c.snapshot(0, 0).resettable_high_used_mark, 20);
        c.record_alloc(10);
        let s = c.snapshot(0, 0);
        assert_eq!(s.resettable_high_used_mark, 30);
        assert_eq!(s.high_used_mark, 50);
    }

    #[test]
    fn disabled_telemetry_freezes_marks() {
        let mut c = Counters::new(100, 0, false);
        c.record_alloc(50);
        assert_eq!(c.snapshot(0, 0).high_used_mark, 0);
        assert_eq!(c.snapshot(0, 0).used, 50);
    }

    #[test]
    fn free_saturates_at_zero() {
        let mut c = Counters::new(0, 0, true);
        c.record_free(10);
        assert_eq!(c.used, 0);
        assert_eq!(c.num_allocations, 0);
    }
}
