//! Progress reporting for batch runs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::types::Outcome;

/// Running totals at the moment an event is emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    /// Images tagged and written, retagged ones included
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Subset of `completed` that replaced a stale tag file
    pub retagged: usize,
}

/// Emitted once per image, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// 1-based position in the batch
    pub index: usize,
    pub total: usize,
    pub image: PathBuf,
    pub outcome: Outcome,
    /// Tag preview, skip/retag note, or error text
    pub detail: String,
    pub counts: RunCounts,
}

/// Emitted once when a run ends, whether it finished or was cancelled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub retagged: usize,
    /// Images in the request
    pub total: usize,
    /// Images actually processed before the run ended
    pub attempted: usize,
    pub cancelled: bool,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Images per second over the whole run.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempted as f64 / secs
        } else {
            0.0
        }
    }
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// Receives progress from a running batch.
///
/// Calls happen on the task driving the batch, never concurrently.
pub trait ProgressObserver {
    fn on_image(&mut self, event: &ProgressEvent);

    fn on_finish(&mut self, _summary: &BatchSummary) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_image(&mut self, _event: &ProgressEvent) {}
}
