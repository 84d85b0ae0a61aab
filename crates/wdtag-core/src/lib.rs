//! wdtag Core - batch tagging engine for WD14-style image classifiers.
//!
//! Takes a list of images and a model bundle (`model.onnx` plus
//! `selected_tags.csv`) and writes one comma-separated tag file per image.
//!
//! # Architecture
//!
//! ```text
//! Images → Reconcile → Decode → Pad/Resize → ONNX → Threshold → <stem>.txt
//! ```
//!
//! Existing tag files are reused when they look valid and regenerated when
//! they look stale. Images are processed one at a time on tokio's blocking
//! pool, with progress reported per image.
//!
//! # Usage
//!
//! ```rust,ignore
//! use wdtag_core::{Config, NoopObserver, Tagger};
//!
//! #[tokio::main]
//! async fn main() -> wdtag_core::Result<()> {
//!     let config = Config::load()?;
//!     let tagger = Tagger::new(config);
//!
//!     let images = tagger.discover(&["./photos".into()]);
//!     let summary = tagger.run(tagger.request(images), &mut NoopObserver).await?;
//!     println!("Tagged {} image(s)", summary.completed);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod batch;
pub mod config;
pub mod error;
pub mod inference;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

// Re-exports for convenient access
pub use batch::{
    BatchOrchestrator, BatchRequest, BatchSummary, CancelToken, NoopObserver, OnnxBackend,
    ProgressEvent, ProgressObserver, RunCounts, TagBackend,
};
pub use config::Config;
pub use error::{
    ConfigError, ModelError, PipelineError, PipelineResult, Result, RunError, TaggerError,
};
pub use inference::{decode_tags, InferenceEngine};
pub use model::{CachedModelProvider, ModelBundle, ModelProvider, ModelRegistry, TagVocabulary};
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{FileDiscovery, ImagePreprocessor};
pub use reconcile::OutputReconciler;
pub use types::{Disposition, Outcome, TagResult};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point wiring configuration, model loading and the orchestrator.
pub struct Tagger {
    config: Config,
    discovery: FileDiscovery,
    orchestrator: BatchOrchestrator,
}

impl Tagger {
    /// Create a tagger that reloads the model for every image.
    pub fn new(config: Config) -> Self {
        let provider = Arc::new(ModelRegistry::new(config.model_dir()));
        Self::with_provider(config, provider)
    }

    /// Create a tagger that keeps the last loaded model in memory.
    pub fn with_cached_model(config: Config) -> Self {
        let provider = Arc::new(CachedModelProvider::new(ModelRegistry::new(
            config.model_dir(),
        )));
        Self::with_provider(config, provider)
    }

    /// Create a tagger using `provider` for model bundles.
    pub fn with_provider(config: Config, provider: Arc<dyn ModelProvider>) -> Self {
        let preprocessor =
            ImagePreprocessor::new(config.limits.clone(), config.tagging.image_size);
        let backend = Arc::new(OnnxBackend::new(provider, preprocessor));
        Self::with_backend(config, backend)
    }

    /// Create a tagger around an arbitrary backend.
    pub fn with_backend(config: Config, backend: Arc<dyn TagBackend>) -> Self {
        tracing::debug!("Initializing wdtag v{}", VERSION);
        Self {
            discovery: FileDiscovery::new(config.processing.clone()),
            orchestrator: BatchOrchestrator::new(backend),
            config,
        }
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Expand files and directories into the images a run should tag.
    pub fn discover(&self, inputs: &[PathBuf]) -> Vec<PathBuf> {
        self.discovery.discover_all(inputs)
    }

    /// A request for `images` using the configured model, threshold and
    /// output directory.
    pub fn request(&self, images: Vec<PathBuf>) -> BatchRequest {
        BatchRequest::new(
            images,
            self.config.general.model.clone(),
            self.config.tagging.threshold,
            self.config.output_dir(),
        )
        .with_stale_threshold(self.config.output.stale_threshold_bytes)
    }

    /// Run a batch. See [`BatchOrchestrator::start`].
    pub async fn run(
        &self,
        request: BatchRequest,
        observer: &mut dyn ProgressObserver,
    ) -> Result<BatchSummary> {
        Ok(self.orchestrator.start(request, observer).await?)
    }

    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }
}
