//! Criterion micro-benchmarks for per-strategy alloc/free, marks, and replay.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use strata_arena::{Alignment, Arena, PageSource, PagedHeapConfig};
use strata_bench::{churn_log, mixed_sizes};

const ROUNDS: usize = 256;

/// Allocate every size, then free newest first.
fn alloc_free_lifo(arena: &mut Arena<'_>, sizes: &[usize]) {
    let mut live = Vec::with_capacity(sizes.len());
    for &size in sizes {
        if let Some(a) = arena.alloc(size).unwrap() {
            live.push((a, size));
        }
    }
    while let Some((a, size)) = live.pop() {
        black_box(arena.free(a, Some(size)).unwrap());
    }
}

/// Benchmark: LIFO alloc/free on every strategy that can free.
fn bench_alloc_free(c: &mut Criterion) {
    let sizes = mixed_sizes(ROUNDS, 64, 42);
    let mut group = c.benchmark_group("alloc_free_256");

    let mut buffer = Arena::buffer(vec![0u8; 64 * 1024], Alignment::None).unwrap();
    group.bench_function("buffer", |b| b.iter(|| alloc_free_lifo(&mut buffer, &sizes)));

    let mut fixed = Arena::fixed_heap(vec![0u8; 64 * 1024], Alignment::None).unwrap();
    group.bench_function("fixed_heap", |b| b.iter(|| alloc_free_lifo(&mut fixed, &sizes)));

    let mut paged =
        Arena::paged_heap(PagedHeapConfig::new(4096), PageSource::system()).unwrap();
    group.bench_function("paged_heap", |b| b.iter(|| alloc_free_lifo(&mut paged, &sizes)));

    let mut std_heap = Arena::std_heap();
    group.bench_function("std_heap", |b| b.iter(|| alloc_free_lifo(&mut std_heap, &sizes)));

    group.finish();
}

/// Benchmark: push a mark, bump-allocate, pop the mark.
fn bench_marked_stack(c: &mut Criterion) {
    let sizes = mixed_sizes(ROUNDS, 64, 7);
    let mut stack = Arena::marked_stack(vec![0u8; 64 * 1024], 4, Alignment::Bytes8).unwrap();
    c.bench_function("marked_stack_mark_cycle_256", |b| {
        b.iter(|| {
            stack.push_mark().unwrap();
            for &size in &sizes {
                black_box(stack.alloc(size).unwrap());
            }
            black_box(stack.pop_mark().unwrap());
        });
    });
}

/// Benchmark: replay a recorded churn log into a fresh buffer.
fn bench_replay(c: &mut Criterion) {
    let sizes = mixed_sizes(ROUNDS, 64, 99);
    let mut recorded = Arena::buffer(vec![0u8; 64 * 1024], Alignment::None).unwrap();
    let log = churn_log(&mut recorded, &sizes).unwrap();
    c.bench_function("replay_churn_256", |b| {
        b.iter(|| {
            let mut fresh = Arena::buffer(vec![0u8; 64 * 1024], Alignment::None).unwrap();
            black_box(log.replay(&mut fresh).unwrap());
        });
    });
}

criterion_group!(benches, bench_alloc_free, bench_marked_stack, bench_replay);
criterion_main!(benches);
