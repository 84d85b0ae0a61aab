//! Tag file reconciliation: deciding whether an image needs tagging and
//! writing the result.
//!
//! Each image `photo.jpg` maps to `<output_dir>/photo.txt`. An existing file
//! at or under the stale threshold (1024 bytes by default) is trusted and the
//! image is skipped. Anything larger is assumed to be an error dump from an
//! earlier run and is regenerated. The size check is a heuristic: an unusually
//! long but legitimate tag list will also be regenerated.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::types::Disposition;

/// Default size above which an existing tag file is considered stale.
pub const DEFAULT_STALE_THRESHOLD_BYTES: u64 = 1024;

/// Extension of tag files.
const ARTIFACT_EXTENSION: &str = "txt";

/// Prefix that marks a tag string as an error message rather than tags.
pub const ERROR_MARKER: &str = "Error:";

/// Decides and persists tag files in one output directory.
#[derive(Debug, Clone)]
pub struct OutputReconciler {
    output_dir: PathBuf,
    stale_threshold: u64,
}

impl OutputReconciler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stale_threshold: DEFAULT_STALE_THRESHOLD_BYTES,
        }
    }

    /// Override the stale-file size threshold.
    pub fn with_stale_threshold(mut self, bytes: u64) -> Self {
        self.stale_threshold = bytes;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where the tag file for `image` lives: the image's file stem plus `.txt`.
    ///
    /// Only the final extension is replaced, so `shot.1.jpg` maps to
    /// `shot.1.txt`.
    pub fn artifact_path(&self, image: &Path) -> PathBuf {
        let mut name = image
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "unknown".into());
        name.push(".");
        name.push(ARTIFACT_EXTENSION);
        self.output_dir.join(name)
    }

    /// Inspect the existing tag file for `image`.
    ///
    /// A tag file whose size cannot be read is treated as present and
    /// trusted, so the image is skipped rather than retagged.
    pub fn reconcile(&self, image: &Path) -> Result<Disposition, PipelineError> {
        let artifact = self.artifact_path(image);

        let metadata = match std::fs::metadata(&artifact) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::trace!("{:?} does not exist", artifact);
                return Ok(Disposition::New);
            }
            Err(e) => {
                tracing::warn!(
                    "Cannot read size of {:?} ({}), keeping it and skipping",
                    artifact,
                    e
                );
                return Ok(Disposition::Skip);
            }
        };

        let size = metadata.len();
        if size > self.stale_threshold {
            tracing::debug!(
                "{:?} is {} bytes (> {}), scheduling retag",
                artifact,
                size,
                self.stale_threshold
            );
            Ok(Disposition::Retag)
        } else {
            tracing::trace!("{:?} is {} bytes, skipping", artifact, size);
            Ok(Disposition::Skip)
        }
    }

    /// Delete the stale tag file for `image`.
    pub fn remove_stale(&self, image: &Path) -> Result<(), PipelineError> {
        let artifact = self.artifact_path(image);
        std::fs::remove_file(&artifact).map_err(|e| PipelineError::Delete {
            path: artifact.clone(),
            message: e.to_string(),
        })?;
        tracing::debug!("Removed stale tag file {:?}", artifact);
        Ok(())
    }

    /// Write `joined_tags` as the complete contents of the tag file for
    /// `image` and return its path.
    ///
    /// Refuses empty strings and strings carrying [`ERROR_MARKER`]. The write
    /// goes to a temporary file in the output directory that is then renamed
    /// over the target, so readers never see a partial file.
    pub fn persist(&self, image: &Path, joined_tags: &str) -> Result<PathBuf, PipelineError> {
        let contents = joined_tags.trim();
        if contents.is_empty() || contents.starts_with(ERROR_MARKER) {
            return Err(PipelineError::EmptyOrErrorTags {
                path: image.to_path_buf(),
            });
        }

        let artifact = self.artifact_path(image);
        let write_err = |message: String| PipelineError::Write {
            path: artifact.clone(),
            message,
        };

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| write_err(format!("Cannot create output directory: {e}")))?;

        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = self.output_dir.join(format!(".{file_name}.tmp"));

        let write_tmp = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(write_err(e.to_string()));
        }

        if let Err(e) = std::fs::rename(&tmp_path, &artifact) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(write_err(format!("Cannot move tag file into place: {e}")));
        }

        tracing::debug!("Wrote {} bytes to {:?}", contents.len(), artifact);
        Ok(artifact)
    }
}
