//! Running the tagger and turning scores into tags.
//!
//! The first model output holds 4 rating scores followed by one score per
//! general tag. The optional second output holds one score per character tag.
//! A tag is emitted when its score is at or above the threshold.

use std::path::Path;

use ndarray::Array4;

use crate::error::PipelineError;
use crate::model::{ModelBundle, TagVocabulary, RATING_SLOTS};
use crate::types::TagResult;

/// Select tags whose score is `>= threshold`.
///
/// General tag `i` is read from `general[i + RATING_SLOTS]`; character tag `i`
/// from `character[i]`. Scores past the end of a vocabulary are ignored, as are
/// vocabulary entries past the end of the scores.
pub fn decode_tags(
    general: &[f32],
    character: Option<&[f32]>,
    vocabulary: &TagVocabulary,
    threshold: f32,
) -> Vec<String> {
    let general_tags = general
        .iter()
        .skip(RATING_SLOTS)
        .zip(&vocabulary.general)
        .filter(|(&score, _)| score >= threshold)
        .map(|(_, tag)| tag.clone());

    let character_tags = character
        .unwrap_or_default()
        .iter()
        .zip(&vocabulary.character)
        .filter(|(&score, _)| score >= threshold)
        .map(|(_, tag)| tag.clone());

    general_tags.chain(character_tags).collect()
}

/// Runs a loaded model on prepared tensors.
pub struct InferenceEngine;

impl InferenceEngine {
    /// Tag one image tensor with `bundle`.
    ///
    /// Session failures come back as [`PipelineError::Inference`]; a model
    /// with no outputs at all is treated the same way.
    pub fn tag(
        tensor: &Array4<f32>,
        bundle: &ModelBundle,
        threshold: f32,
        path: &Path,
    ) -> Result<TagResult, PipelineError> {
        let outputs = bundle.session.run(tensor, path)?;

        let general = outputs.first().ok_or_else(|| PipelineError::Inference {
            path: path.to_path_buf(),
            message: "Model produced no outputs".to_string(),
        })?;
        let character = outputs.get(1).map(Vec::as_slice);

        let tags = decode_tags(general, character, &bundle.vocabulary, threshold);
        tracing::debug!(
            "{} tag(s) for {:?} at threshold {}",
            tags.len(),
            path,
            threshold
        );

        Ok(TagResult { tags, threshold })
    }
}
