//! Workload profiles for benchmarking Strata arenas.
//!
//! - [`mixed_sizes`]: deterministic allocation sizes from a seed
//! - [`churn_log`]: a recorded alloc/realloc/free workload for replay benches

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use strata_arena::{Alignment, Arena};
use strata_replay::{ActionLog, Recorder, ReplayError};

/// Generate `count` allocation sizes in `1..=max`.
///
/// Same seed, same sizes. Uses a 64-bit LCG; the sizes only need to be
/// spread out, not random.
pub fn mixed_sizes(count: usize, max: usize, seed: u64) -> Vec<usize> {
    let max = max.max(1) as u64;
    let mut state = seed;
    (0..count)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) % max) as usize + 1
        })
        .collect()
}

/// Record a churn workload against `arena`.
///
/// Allocates every size, grows every third allocation by half, then frees
/// all of them newest first, so the log also replays on a buffer big
/// enough to hold the peak.
pub fn churn_log(arena: &mut Arena<'_>, sizes: &[usize]) -> Result<ActionLog, ReplayError> {
    let mut log = ActionLog::new();
    let mut rec = Recorder::new(&mut log, arena);
    let mut live = Vec::with_capacity(sizes.len());
    for (i, &size) in sizes.iter().enumerate() {
        let Some(mut a) = rec.alloc(size)? else {
            break;
        };
        let mut len = size;
        if i % 3 == 2 {
            let grown = size + size / 2;
            match rec.realloc(Some(a), grown, Some(size), Alignment::None)?.allocation {
                Some(b) => {
                    a = b;
                    len = grown;
                }
                None => continue,
            }
        }
        live.push((a, len));
    }
    while let Some((a, len)) = live.pop() {
        rec.free(a, Some(len))?;
    }
    Ok(log)
}
