//! Error types for the tagging engine.
//!
//! Errors are grouped by the component that raises them. Everything that can
//! go wrong while tagging a single image is a [`PipelineError`], which the
//! batch orchestrator records against that image and then moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for wdtag operations.
#[derive(Error, Debug)]
pub enum TaggerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Model discovery or loading errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Per-image processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Batch admission errors
    #[error("Batch error: {0}")]
    Run(#[from] RunError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised while resolving or loading a model bundle.
#[derive(Error, Debug, Clone)]
pub enum ModelError {
    /// The model directory or its weights file is missing
    #[error("Model not found: {name} (expected {path})")]
    ModelNotFound { name: String, path: PathBuf },

    /// The weights exist but the tag vocabulary file does not
    #[error("Vocabulary missing for model {name} (expected {path})")]
    VocabularyMissing { name: String, path: PathBuf },

    /// Reading files or creating the inference session failed
    #[error("Failed to load model {name}: {message}")]
    Load { name: String, message: String },
}

/// Errors local to one image. None of these abort a batch.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image could not be read, validated, or decoded
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// The inference session failed or produced unusable output
    #[error("Inference failed for {path}: {message}")]
    Inference { path: PathBuf, message: String },

    /// Nothing worth persisting: no tags passed the threshold, or the
    /// string carries an error marker
    #[error("Tags for {path} are empty or invalid")]
    EmptyOrErrorTags { path: PathBuf },

    /// Writing the tag file failed
    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    /// Removing a stale tag file failed
    #[error("Failed to delete stale tag file {path}: {message}")]
    Delete { path: PathBuf, message: String },

    /// The model for this image could not be acquired
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The blocking worker running this image panicked or was cancelled
    #[error("Worker failed for {path}: {message}")]
    Worker { path: PathBuf, message: String },
}

/// Reasons a batch run is refused before it starts.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunError {
    /// Another run is already active on this orchestrator
    #[error("A tagging run is already in progress")]
    AlreadyRunning,

    /// No images were supplied
    #[error("No images to tag")]
    EmptyInput,
}

/// Convenience type alias for wdtag results.
pub type Result<T> = std::result::Result<T, TaggerError>;

/// Convenience type alias for per-image results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
