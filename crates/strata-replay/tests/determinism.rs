//! Record against every strategy, replay against a fresh arena of the same
//! configuration, and check the counters come out the same.

use proptest::prelude::*;
use strata_arena::{Alignment, Allocation, Arena, ArenaStats, PageSource, PagedHeapConfig};
use strata_replay::{
    compare_stats, replay_and_compare, ActionLog, Counter, Recorder, ReplayError,
};
use strata_test_utils::{init_logging, AlignedBuffer, CountingAllocator};

// ── Helpers ─────────────────────────────────────────────────────

/// Alloc three, free the top, grow the next, free it. One allocation is
/// left live. Every free is LIFO so the script also suits buffers.
fn record_script(arena: &mut Arena<'_>) -> ActionLog {
    let mut log = ActionLog::new();
    let mut rec = Recorder::new(&mut log, arena);
    rec.alloc(24).unwrap().unwrap();
    let b = rec.alloc(40).unwrap().unwrap();
    let c = rec.alloc(8).unwrap().unwrap();
    rec.free(c, Some(8)).unwrap();
    let grown = rec
        .realloc(Some(b), 96, Some(40), Alignment::None)
        .unwrap()
        .allocation
        .unwrap();
    rec.free(grown, Some(96)).unwrap();
    log
}

fn assert_replays(mut make: impl FnMut() -> Arena<'static>) {
    init_logging();
    let mut recorded = make();
    let log = record_script(&mut recorded);
    assert_eq!(log.len(), 6);

    let mut fresh = make();
    let report = replay_and_compare(&log, &mut fresh, &recorded.stats()).unwrap();
    assert!(report.is_none(), "{:?} diverged: {report:?}", recorded.strategy());
    assert_eq!(fresh.used(), recorded.used());
    assert_eq!(fresh.num_allocations(), 1);
}

// ── Per-strategy replay ─────────────────────────────────────────

#[test]
fn redirect_replays() {
    assert_replays(|| Arena::redirect(CountingAllocator::new()));
}

#[test]
fn std_heap_replays() {
    assert_replays(Arena::std_heap);
}

#[test]
fn fixed_heap_replays() {
    assert_replays(|| Arena::fixed_heap(vec![0u8; 512], Alignment::None).unwrap());
}

#[test]
fn paged_heap_replays() {
    assert_replays(|| {
        Arena::paged_heap(PagedHeapConfig::new(128), PageSource::system()).unwrap()
    });
}

#[test]
fn buffer_replays() {
    assert_replays(|| Arena::buffer(vec![0u8; 512], Alignment::None).unwrap());
}

#[test]
fn alias_replays() {
    assert_replays(|| {
        let source = Arena::fixed_heap(vec![0u8; 512], Alignment::None)
            .unwrap()
            .into_shared();
        Arena::alias(source)
    });
}

#[test]
fn marked_stack_replays_allocations() {
    let make = || Arena::marked_stack(vec![0u8; 256], 4, Alignment::None).unwrap();
    let mut recorded = make();
    let mut log = ActionLog::new();
    {
        let mut rec = Recorder::new(&mut log, &mut recorded);
        for size in [3, 17, 40] {
            rec.alloc(size).unwrap().unwrap();
        }
    }
    let mut fresh = make();
    assert!(replay_and_compare(&log, &mut fresh, &recorded.stats())
        .unwrap()
        .is_none());
}

// ── Rebuilt logs ────────────────────────────────────────────────

#[test]
fn log_rebuilt_from_its_actions_replays_identically() {
    let mut recorded = Arena::fixed_heap(vec![0u8; 512], Alignment::None).unwrap();
    let log = record_script(&mut recorded);

    let rebuilt = ActionLog::from_actions(log.actions().to_vec()).unwrap();
    assert_eq!(rebuilt.actions(), log.actions());
    assert_eq!(rebuilt.slot_count(), log.slot_count());

    let mut fresh = Arena::fixed_heap(vec![0u8; 512], Alignment::None).unwrap();
    assert!(replay_and_compare(&rebuilt, &mut fresh, &recorded.stats())
        .unwrap()
        .is_none());
}

// ── Divergence ──────────────────────────────────────────────────

#[test]
fn different_alignment_is_reported() {
    let mut buf = AlignedBuffer::<256>::new();
    let mut recorded = Arena::buffer(buf.as_mut_slice(), Alignment::None).unwrap();
    let mut log = ActionLog::new();
    {
        let mut rec = Recorder::new(&mut log, &mut recorded);
        rec.alloc(3).unwrap().unwrap();
        rec.alloc(8).unwrap().unwrap();
    }
    let recorded_stats = recorded.stats();
    assert_eq!(recorded_stats.used, 11);

    // Same actions, but this arena pads the second allocation to 8.
    let mut other = AlignedBuffer::<256>::new();
    let mut padded = Arena::buffer(other.as_mut_slice(), Alignment::Bytes8).unwrap();
    let report = replay_and_compare(&log, &mut padded, &recorded_stats)
        .unwrap()
        .expect("counters differ");
    assert_eq!(report.divergences.len(), 1);
    assert_eq!(report.divergences[0].counter, Counter::Used);
    assert_eq!(report.divergences[0].replayed, 16);
}

#[test]
fn too_small_replay_arena_diverges() {
    let mut recorded = Arena::std_heap();
    let log = record_script(&mut recorded);
    let mut tiny = Arena::buffer(vec![0u8; 32], Alignment::None).unwrap();
    assert!(matches!(
        log.replay(&mut tiny),
        Err(ReplayError::Diverged { action: 1, .. })
    ));
}

#[test]
fn identical_stats_compare_clean() {
    let stats = ArenaStats {
        size: 10,
        used: 4,
        num_allocations: 1,
        ..ArenaStats::default()
    };
    assert!(compare_stats(&stats, &stats).is_none());
}

// ── Properties ──────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Step {
    Alloc(usize),
    Free(usize),
    Realloc(usize, usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (1usize..96).prop_map(Step::Alloc),
        1 => any::<usize>().prop_map(Step::Free),
        2 => (any::<usize>(), 0usize..128).prop_map(|(i, size)| Step::Realloc(i, size)),
    ]
}

proptest! {
    #[test]
    fn fixed_heap_scripts_replay_exactly(steps in prop::collection::vec(step(), 1..40)) {
        let mut buf = AlignedBuffer::<1024>::new();
        let mut arena = Arena::fixed_heap(buf.as_mut_slice(), Alignment::Bytes8).unwrap();
        let mut log = ActionLog::new();
        let mut live: Vec<Allocation> = Vec::new();
        {
            let mut rec = Recorder::new(&mut log, &mut arena);
            for step in &steps {
                match *step {
                    Step::Alloc(size) => {
                        if let Some(a) = rec.alloc(size).unwrap() {
                            live.push(a);
                        }
                    }
                    Step::Free(i) if !live.is_empty() => {
                        let a = live.remove(i % live.len());
                        rec.free(a, None).unwrap();
                    }
                    Step::Realloc(i, size) if !live.is_empty() => {
                        let a = live.remove(i % live.len());
                        let moved = rec.realloc(Some(a), size, None, Alignment::None).unwrap();
                        live.extend(moved.allocation);
                    }
                    _ => {}
                }
            }
        }
        let recorded = arena.stats();

        let mut other = AlignedBuffer::<1024>::new();
        let mut fresh = Arena::fixed_heap(other.as_mut_slice(), Alignment::Bytes8).unwrap();
        let replayed = log.replay(&mut fresh).unwrap();
        prop_assert!(compare_stats(&recorded, &replayed.stats).is_none());
        prop_assert_eq!(replayed.live_slots(), live.len());
    }

    #[test]
    fn buffer_scripts_replay_exactly(steps in prop::collection::vec(step(), 1..40)) {
        let mut buf = AlignedBuffer::<2048>::new();
        let mut arena = Arena::buffer(buf.as_mut_slice(), Alignment::Bytes4).unwrap();
        let mut log = ActionLog::new();
        let mut live: Vec<Allocation> = Vec::new();
        {
            let mut rec = Recorder::new(&mut log, &mut arena);
            for step in &steps {
                match *step {
                    Step::Alloc(size) => {
                        if let Some(a) = rec.alloc(size).unwrap() {
                            live.push(a);
                        }
                    }
                    Step::Free(_) => {
                        if let Some(top) = live.pop() {
                            let size = rec.arena().alloc_size(top);
                            rec.free(top, size).unwrap();
                        }
                    }
                    Step::Realloc(_, size) => {
                        if let Some(top) = live.pop() {
                            let old_size = rec.arena().alloc_size(top);
                            let moved = rec.realloc(Some(top), size, old_size, Alignment::None).unwrap();
                            live.extend(moved.allocation);
                        }
                    }
                }
            }
        }
        let recorded = arena.stats();

        let mut other = AlignedBuffer::<2048>::new();
        let mut fresh = Arena::buffer(other.as_mut_slice(), Alignment::Bytes4).unwrap();
        let replayed = log.replay(&mut fresh).unwrap();
        prop_assert!(compare_stats(&recorded, &replayed.stats).is_none());
        prop_assert_eq!(replayed.live_slots(), live.len());
    }
}
