//! ONNX Runtime session wrapper for WD14-style taggers.
//!
//! The session is opened once per model load and records the declared input
//! and output shapes so preprocessing can pick the right layout and size.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::Session;
use ort::value::{Value, ValueType};

use crate::error::{ModelError, PipelineError};

/// Wraps an ONNX Runtime session for multi-label tagging.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct TaggerSession {
    session: Mutex<Session>,
    input_name: String,
    /// Declared input dims; negative values are dynamic.
    input_shape: Vec<i64>,
    /// Declared width of each output's last axis, when static.
    output_widths: Vec<Option<usize>>,
}

impl TaggerSession {
    /// Open a tagger model from an ONNX file.
    pub fn load(name: &str, model_path: &Path) -> Result<Self, ModelError> {
        let load_err = |message: String| ModelError::Load {
            name: name.to_string(),
            message,
        };

        let session = Session::builder()
            .map_err(|e| load_err(format!("Failed to create ONNX session builder: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| load_err(format!("Failed to load ONNX model: {e}")))?;

        let first_input = session
            .inputs()
            .first()
            .ok_or_else(|| load_err("Model declares no inputs".to_string()))?;
        let input_name = first_input.name().to_string();
        let input_shape = tensor_dims(first_input.dtype());

        let output_widths = session
            .outputs()
            .iter()
            .map(|o| {
                tensor_dims(o.dtype())
                    .last()
                    .and_then(|&d| usize::try_from(d).ok())
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Opened session {:?} (input: {:?} {:?}, output widths: {:?})",
            model_path,
            input_name,
            input_shape,
            output_widths
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            input_shape,
            output_widths,
        })
    }

    /// Declared input dims (dynamic dims are negative).
    pub fn input_shape(&self) -> &[i64] {
        &self.input_shape
    }

    /// Static square input edge declared by the model, if any.
    pub fn input_size(&self) -> Option<u32> {
        declared_input_size(&self.input_shape)
    }

    /// Declared last-axis widths of the outputs, in output order.
    pub fn output_widths(&self) -> &[Option<usize>] {
        &self.output_widths
    }

    /// Run the model on one preprocessed image and return every output's
    /// scores, in output order.
    pub fn run(&self, tensor: &Array4<f32>, path: &Path) -> Result<Vec<Vec<f32>>, PipelineError> {
        let inference_err = |message: String| PipelineError::Inference {
            path: path.to_path_buf(),
            message,
        };

        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = tensor.iter().copied().collect();

        let input_value = Value::from_array((shape, flat_data))
            .map_err(|e| inference_err(format!("Failed to create input tensor: {e}")))?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self
            .session
            .lock()
            .map_err(|e| inference_err(format!("Session lock poisoned: {e}")))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| inference_err(format!("ONNX inference failed: {e}")))?;

        let mut scores = Vec::new();
        for (name, value) in outputs.iter() {
            let (_, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| inference_err(format!("Failed to extract output {name}: {e}")))?;
            scores.push(data.to_vec());
        }

        Ok(scores)
    }
}

fn tensor_dims(value_type: &ValueType) -> Vec<i64> {
    match value_type {
        ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
        _ => Vec::new(),
    }
}

/// Square edge from a declared 4-D input shape, NHWC or NCHW.
pub(crate) fn declared_input_size(shape: &[i64]) -> Option<u32> {
    if shape.len() != 4 {
        return None;
    }
    let (h, w) = if shape[1] == 3 {
        (shape[2], shape[3])
    } else {
        (shape[1], shape[2])
    };
    if h > 0 && h == w {
        u32::try_from(h).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_input_size_nhwc() {
        assert_eq!(declared_input_size(&[-1, 448, 448, 3]), Some(448));
    }

    #[test]
    fn test_declared_input_size_nchw() {
        assert_eq!(declared_input_size(&[1, 3, 384, 384]), Some(384));
    }

    #[test]
    fn test_declared_input_size_dynamic() {
        assert_eq!(declared_input_size(&[-1, -1, -1, 3]), None);
        assert_eq!(declared_input_size(&[1, 448, 448]), None);
    }

    #[test]
    fn test_declared_input_size_non_square() {
        assert_eq!(declared_input_size(&[1, 448, 320, 3]), None);
    }
}
