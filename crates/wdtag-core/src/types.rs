//! Core data types shared across the tagging engine.

use serde::{Deserialize, Serialize};

/// Separator between tags in a persisted tag string.
pub const TAG_SEPARATOR: &str = ", ";

/// Tags emitted for one image in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagResult {
    /// General tags in vocabulary order, then character tags in vocabulary order
    pub tags: Vec<String>,

    /// Threshold the tags were selected with
    pub threshold: f32,
}

impl TagResult {
    /// The comma-space-joined form written to tag files.
    pub fn joined(&self) -> String {
        self.tags.join(TAG_SEPARATOR)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// What the reconciler decided for an image's existing tag file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// No tag file yet
    New,
    /// A valid tag file exists; leave it alone
    Skip,
    /// The tag file looks stale; delete it and tag again
    Retag,
}

/// Final result of one image within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Tagged and written for the first time
    Completed,
    /// Existing tag file kept
    Skipped,
    /// Stale tag file replaced
    Retagged,
    /// Something went wrong; see the event detail
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Skipped => "skipped",
            Outcome::Retagged => "retagged",
            Outcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
