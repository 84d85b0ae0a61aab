//! State owned by a single batch run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::progress::{BatchSummary, RunCounts};
use crate::types::Outcome;

/// Shared flag a caller can set to stop a run between images.
///
/// Clones share the same flag. The image in flight when the flag is set
/// still finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Holds the orchestrator's running flag for the lifetime of a run.
///
/// The flag is cleared on drop, so every exit path releases it. The run
/// shares the guard with each blocking unit it spawns, so a unit still
/// writing after its caller went away keeps the flag set until it returns.
pub(crate) struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    /// Set `flag`, or return `None` if it was already set.
    pub(crate) fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Counters for one run.
#[derive(Debug)]
pub(crate) struct BatchRun {
    total: usize,
    counts: RunCounts,
    attempted: usize,
    cancelled: bool,
    started: Instant,
}

impl BatchRun {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            counts: RunCounts::default(),
            attempted: 0,
            cancelled: false,
            started: Instant::now(),
        }
    }

    pub(crate) fn record(&mut self, outcome: Outcome) {
        self.attempted += 1;
        match outcome {
            Outcome::Completed => self.counts.completed += 1,
            Outcome::Retagged => {
                self.counts.completed += 1;
                self.counts.retagged += 1;
            }
            Outcome::Skipped => self.counts.skipped += 1,
            Outcome::Failed => self.counts.failed += 1,
        }
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn counts(&self) -> RunCounts {
        self.counts
    }

    pub(crate) fn summary(&self) -> BatchSummary {
        BatchSummary {
            completed: self.counts.completed,
            skipped: self.counts.skipped,
            failed: self.counts.failed,
            retagged: self.counts.retagged,
            total: self.total,
            attempted: self.attempted,
            cancelled: self.cancelled,
            elapsed: self.started.elapsed(),
        }
    }
}
