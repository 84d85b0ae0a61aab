//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.tagging.threshold) {
            return Err(ConfigError::ValidationError(
                "tagging.threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.tagging.image_size == 0 {
            return Err(ConfigError::ValidationError(
                "tagging.image_size must be > 0".into(),
            ));
        }
        if self.output.stale_threshold_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "output.stale_threshold_bytes must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.general.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "general.model must not be empty".into(),
            ));
        }
        Ok(())
    }
}
