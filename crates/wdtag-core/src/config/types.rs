//! Sub-configuration structs and their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Model used when nothing else is configured or installed.
pub const DEFAULT_MODEL: &str = "wd-convnext-tagger-v3";

/// Model location and selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding one sub-directory per model bundle
    pub model_dir: PathBuf,

    /// Name of the bundle to tag with
    pub model: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.wdtag/models"),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Tagging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Minimum score for a tag to be emitted (inclusive)
    pub threshold: f32,

    /// Square input edge used when the model does not declare one
    pub image_size: u32,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.35,
            image_size: 448,
        }
    }
}

/// Tag file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving `<image stem>.txt` files
    pub dir: PathBuf,

    /// Existing tag files larger than this are treated as stale and regenerated.
    ///
    /// Size is only a proxy for "contains an error dump"; a very long legitimate
    /// tag list will also trip it.
    pub stale_threshold_bytes: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./output"),
            stale_threshold_bytes: 1024,
        }
    }
}

/// Input discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// File extensions picked up when walking directories
    pub supported_formats: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            supported_formats: ["jpg", "jpeg", "png", "webp", "bmp", "gif", "tiff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
