//! Runner counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by the runner, its driver and every epoch.
#[derive(Debug, Default)]
pub struct Counters {
    pub(crate) ticks: AtomicU64,
    pub(crate) swaps: AtomicU64,
    pub(crate) failed_swaps: AtomicU64,
    pub(crate) crossfades: AtomicU64,
    pub(crate) gen_panics: AtomicU64,
    pub(crate) non_finite_blocks: AtomicU64,
    pub(crate) dropped_frames: AtomicU64,
    pub(crate) epochs_retired: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> RunnerStats {
        RunnerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
            failed_swaps: self.failed_swaps.load(Ordering::Relaxed),
            crossfades: self.crossfades.load(Ordering::Relaxed),
            gen_panics: self.gen_panics.load(Ordering::Relaxed),
            non_finite_blocks: self.non_finite_blocks.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            epochs_retired: self.epochs_retired.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot returned by [`Runner::stats`](crate::Runner::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    /// Frames produced.
    pub ticks: u64,
    /// Epochs adopted by the driver.
    pub swaps: u64,
    /// `set_graph` calls rejected during construction.
    pub failed_swaps: u64,
    /// Crossfades completed.
    pub crossfades: u64,
    /// `generate` calls that panicked.
    pub gen_panics: u64,
    /// Blocks in which non-finite samples were zeroed.
    pub non_finite_blocks: u64,
    /// Frames a full subscriber missed.
    pub dropped_frames: u64,
    /// Epochs stopped.
    pub epochs_retired: u64,
}
