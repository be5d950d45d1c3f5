//! Counter comparison between a recorded and a replayed arena.
//!
//! Only `size`, `used` and `num_allocations` are compared. High-water
//! marks depend on telemetry settings, not on the actions.

use std::fmt;

use strata_arena::{Arena, ArenaStats};

use crate::action_log::ActionLog;
use crate::error::ReplayError;

/// A counter a replay is expected to reproduce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Counter {
    /// Bytes in use.
    Used,
    /// Live allocations.
    NumAllocations,
    /// Capacity.
    Size,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Used => "used",
            Self::NumAllocations => "num_allocations",
            Self::Size => "size",
        })
    }
}

/// One counter that came out differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterDivergence {
    /// Which counter.
    pub counter: Counter,
    /// Value after recording.
    pub recorded: usize,
    /// Value after replay.
    pub replayed: usize,
}

/// Everything that differed after a replay.
#[derive(Clone, Debug)]
pub struct DivergenceReport {
    /// Counters that differ. Never empty.
    pub divergences: Vec<CounterDivergence>,
    /// Full counters of the replay arena.
    pub replayed: ArenaStats,
}

/// Compare recorded counters against replayed ones.
///
/// Returns `None` when all three counters match.
pub fn compare_stats(recorded: &ArenaStats, replayed: &ArenaStats) -> Option<DivergenceReport> {
    let divergences: Vec<_> = [
        (Counter::Used, recorded.used, replayed.used),
        (Counter::NumAllocations, recorded.num_allocations, replayed.num_allocations),
        (Counter::Size, recorded.size, replayed.size),
    ]
    .into_iter()
    .filter(|&(_, r, p)| r != p)
    .map(|(counter, recorded, replayed)| CounterDivergence {
        counter,
        recorded,
        replayed,
    })
    .collect();
    if divergences.is_empty() {
        return None;
    }
    Some(DivergenceReport {
        divergences,
        replayed: *replayed,
    })
}

/// Replay `log` into `arena` and compare the result with the counters
/// the recording arena ended with.
///
/// `Ok(None)` means the replay reproduced every counter. A replay that
/// cannot run to completion is an error, not a report.
pub fn replay_and_compare(
    log: &ActionLog,
    arena: &mut Arena<'_>,
    recorded: &ArenaStats,
) -> Result<Option<DivergenceReport>, ReplayError> {
    let replayed = log.replay(arena)?;
    let report = compare_stats(recorded, &replayed.stats);
    if let Some(report) = &report {
        for d in &report.divergences {
            log::warn!(
                "replay diverged: {} was {} when recorded, {} on replay",
                d.counter,
                d.recorded,
                d.replayed
            );
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(size: usize, used: usize, num_allocations: usize) -> ArenaStats {
        ArenaStats {
            size,
            used,
            num_allocations,
            ..ArenaStats::default()
        }
    }

    #[test]
    fn matching_counters_return_none() {
        assert!(compare_stats(&stats(64, 10, 1), &stats(64, 10, 1)).is_none());
    }

    #[test]
    fn high_water_marks_are_not_compared() {
        let recorded = stats(64, 10, 1);
        let busier = ArenaStats {
            high_used_mark: 60,
            high_alloc_mark: 5,
            ..recorded
        };
        assert!(compare_stats(&recorded, &busier).is_none());
    }

    #[test]
    fn report_lists_only_changed_counters() {
        let report = compare_stats(&stats(64, 10, 1), &stats(64, 12, 1)).unwrap();
        assert_eq!(
            report.divergences,
            vec![CounterDivergence {
                counter: Counter::Used,
                recorded: 10,
                replayed: 12,
            }]
        );
        assert_eq!(report.replayed.used, 12);
    }
}
