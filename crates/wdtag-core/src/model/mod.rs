//! Model bundle discovery and loading.
//!
//! A bundle is a directory under the model root holding `model.onnx` and
//! `selected_tags.csv`:
//!
//! ```text
//! ~/.wdtag/models/
//! └── wd-convnext-tagger-v3/
//!     ├── model.onnx
//!     └── selected_tags.csv
//! ```
//!
//! [`ModelRegistry`] re-reads the bundle from disk on every call so the session
//! always matches the requested name. [`CachedModelProvider`] trades that for
//! throughput by keeping the most recent bundle until a different name is asked
//! for.

pub mod session;
pub mod vocabulary;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::DEFAULT_MODEL;
use crate::error::ModelError;

pub use self::session::TaggerSession;
pub use self::vocabulary::TagVocabulary;

/// Weights file expected in every bundle.
pub const MODEL_FILENAME: &str = "model.onnx";

/// Vocabulary file expected in every bundle.
pub const VOCABULARY_FILENAME: &str = "selected_tags.csv";

/// Rating scores that precede the general tags in the first output.
pub const RATING_SLOTS: usize = 4;

/// A loaded model: session plus its vocabulary.
pub struct ModelBundle {
    pub name: String,
    pub dir: PathBuf,
    pub session: TaggerSession,
    pub vocabulary: TagVocabulary,
}

/// Source of model bundles for the batch pipeline.
pub trait ModelProvider: Send + Sync {
    /// Return a ready-to-run bundle for `name`.
    fn acquire(&self, name: &str) -> Result<Arc<ModelBundle>, ModelError>;
}

/// Scans and loads bundles from a model root directory.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
}

impl ModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all complete bundles under the root, sorted.
    ///
    /// Falls back to `[DEFAULT_MODEL]` when nothing is installed; that name is
    /// unverified and loading it will fail unless it gets installed. Use
    /// [`ModelRegistry::is_installed`] to tell the two cases apart.
    pub fn list_available(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .filter_map(|e| e.file_name().to_str().map(str::to_string))
                    .filter(|name| self.is_installed(name))
                    .collect()
            })
            .unwrap_or_default();

        if names.is_empty() {
            tracing::debug!(
                "No model bundles under {:?}, falling back to {}",
                self.root,
                DEFAULT_MODEL
            );
            return vec![DEFAULT_MODEL.to_string()];
        }

        names.sort();
        names
    }

    /// Whether `name` has both its weights and vocabulary on disk.
    pub fn is_installed(&self, name: &str) -> bool {
        let dir = self.bundle_dir(name);
        dir.join(MODEL_FILENAME).is_file() && dir.join(VOCABULARY_FILENAME).is_file()
    }

    /// Directory a bundle named `name` lives in.
    pub fn bundle_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Load a bundle from disk. Nothing is cached.
    pub fn load(&self, name: &str) -> Result<ModelBundle, ModelError> {
        let dir = self.bundle_dir(name);
        let model_path = dir.join(MODEL_FILENAME);
        let vocab_path = dir.join(VOCABULARY_FILENAME);

        if !model_path.is_file() {
            return Err(ModelError::ModelNotFound {
                name: name.to_string(),
                path: model_path,
            });
        }
        if !vocab_path.is_file() {
            return Err(ModelError::VocabularyMissing {
                name: name.to_string(),
                path: vocab_path,
            });
        }

        let vocabulary = TagVocabulary::load(&vocab_path).map_err(|e| ModelError::Load {
            name: name.to_string(),
            message: format!("Failed to read {:?}: {e}", vocab_path),
        })?;

        tracing::info!("Loading model {} from {:?}", name, model_path);
        let session = TaggerSession::load(name, &model_path)?;
        check_output_widths(name, session.output_widths(), &vocabulary)?;

        tracing::info!(
            "Model {} ready ({} general, {} character tags)",
            name,
            vocabulary.general.len(),
            vocabulary.character.len()
        );

        Ok(ModelBundle {
            name: name.to_string(),
            dir,
            session,
            vocabulary,
        })
    }
}

impl ModelProvider for ModelRegistry {
    fn acquire(&self, name: &str) -> Result<Arc<ModelBundle>, ModelError> {
        self.load(name).map(Arc::new)
    }
}

/// Verify the vocabulary fits the outputs the model declares.
///
/// Dynamic widths are not checked. The first output must cover the rating
/// slots plus every general tag; the second, if present, every character tag.
fn check_output_widths(
    name: &str,
    widths: &[Option<usize>],
    vocabulary: &TagVocabulary,
) -> Result<(), ModelError> {
    let mismatch = |message: String| ModelError::Load {
        name: name.to_string(),
        message,
    };

    if widths.is_empty() {
        return Err(mismatch("Model declares no outputs".to_string()));
    }

    if let Some(width) = widths[0] {
        let needed = RATING_SLOTS + vocabulary.general.len();
        if width < needed {
            return Err(mismatch(format!(
                "General output width {width} is smaller than {needed} \
                 ({RATING_SLOTS} ratings + {} general tags)",
                vocabulary.general.len()
            )));
        }
    }

    if let Some(Some(width)) = widths.get(1) {
        if *width < vocabulary.character.len() {
            return Err(mismatch(format!(
                "Character output width {width} is smaller than {} character tags",
                vocabulary.character.len()
            )));
        }
    }

    Ok(())
}

/// Keeps the last loaded bundle and reuses it while the name stays the same.
///
/// Asking for a different name drops the cached bundle and loads afresh.
/// Failed loads are never cached.
pub struct CachedModelProvider {
    registry: ModelRegistry,
    cached: Mutex<Option<Arc<ModelBundle>>>,
}

impl CachedModelProvider {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            registry,
            cached: Mutex::new(None),
        }
    }

    /// Name of the currently cached bundle, if any.
    pub fn cached_name(&self) -> Option<String> {
        self.cached
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|b| b.name.clone()))
    }

    /// Drop the cached bundle.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = None;
        }
    }
}

impl ModelProvider for CachedModelProvider {
    fn acquire(&self, name: &str) -> Result<Arc<ModelBundle>, ModelError> {
        let mut guard = self.cached.lock().map_err(|e| ModelError::Load {
            name: name.to_string(),
            message: format!("Model cache lock poisoned: {e}"),
        })?;

        if let Some(bundle) = guard.as_ref().filter(|b| b.name == name) {
            tracing::debug!("Reusing cached model {}", name);
            return Ok(Arc::clone(bundle));
        }

        // Release the previous session before opening the next one.
        *guard = None;
        let bundle = Arc::new(self.registry.load(name)?);
        *guard = Some(Arc::clone(&bundle));
        Ok(bundle)
    }
}
