//! Image preprocessing for WD14-style taggers.
//!
//! The taggers expect:
//! - Input size: 448×448 (or whatever the model declares)
//! - Square input: the image is centered on a white canvas, never stretched
//! - Channel order: BGR
//! - Values: raw 0–255 floats, no normalization
//! - Tensor layout: NHWC, unless the model declares NCHW

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, Rgb32FImage};
use ndarray::Array4;

use crate::config::LimitsConfig;
use crate::error::PipelineError;
use crate::model::TaggerSession;

use super::decode::decode_file;
use super::validate::Validator;

/// Input edge used by the published WD14 taggers.
pub const DEFAULT_TARGET_SIZE: u32 = 448;

/// Number of color channels.
const CHANNELS: usize = 3;

/// Padding color in the `[0, 1]` space of `Rgb32FImage`.
const PAD_WHITE: f32 = 1.0;

/// Scale from `Rgb32FImage` values to the model's 0–255 range.
const PIXEL_SCALE: f32 = 255.0;

/// Axis order of the input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[batch, height, width, channels]`
    Nhwc,
    /// `[batch, channels, height, width]`
    Nchw,
}

impl TensorLayout {
    /// Pick the layout the model wants for an NHWC tensor of `tensor_shape`.
    ///
    /// Dynamic declared dims (negative) match anything. If the declared shape
    /// doesn't match and has 3 in the channel-first slot, the model is NCHW.
    pub fn detect(declared: &[i64], tensor_shape: &[usize]) -> Self {
        let matches = declared.len() == tensor_shape.len()
            && declared
                .iter()
                .zip(tensor_shape)
                .all(|(&d, &t)| d < 0 || d as usize == t);

        if !matches && declared.len() == 4 && declared[1] == CHANNELS as i64 {
            TensorLayout::Nchw
        } else {
            TensorLayout::Nhwc
        }
    }

    /// Rearrange an NHWC tensor into this layout.
    pub fn apply(self, tensor: Array4<f32>) -> Array4<f32> {
        match self {
            TensorLayout::Nhwc => tensor,
            TensorLayout::Nchw => tensor
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .into_owned(),
        }
    }
}

/// Turns image files into model input tensors.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    validator: Validator,
    target_size: u32,
}

impl ImagePreprocessor {
    /// `target_size` is used when the model doesn't declare a static input size.
    pub fn new(limits: LimitsConfig, target_size: u32) -> Self {
        Self {
            validator: Validator::new(limits),
            target_size,
        }
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Validate, decode and convert `path` into an NHWC tensor of
    /// `[1, target, target, 3]`.
    pub fn prepare(&self, path: &Path, target_size: u32) -> Result<Array4<f32>, PipelineError> {
        self.validator.validate(path)?;
        let decoded = decode_file(path)?;
        tracing::trace!(
            "Preprocessing {:?} ({}x{}) to {}",
            path,
            decoded.width,
            decoded.height,
            target_size
        );
        Ok(image_to_tensor(&decoded.image, target_size))
    }

    /// Prepare `path` for a specific session: size and layout follow what the
    /// session declares.
    pub fn prepare_for(
        &self,
        path: &Path,
        session: &TaggerSession,
    ) -> Result<Array4<f32>, PipelineError> {
        let target = session.input_size().unwrap_or(self.target_size);
        let tensor = self.prepare(path, target)?;
        let layout = TensorLayout::detect(session.input_shape(), tensor.shape());
        tracing::trace!("Input layout for {:?}: {:?}", path, layout);
        Ok(layout.apply(tensor))
    }
}

/// Convert a decoded image into a `[1, target, target, 3]` BGR tensor.
///
/// The image is padded with white to a square of side `max(w, h)` (left/top
/// pad is the floor of half the difference), then resized: area averaging
/// when shrinking, Lanczos when enlarging.
pub fn image_to_tensor(image: &DynamicImage, target_size: u32) -> Array4<f32> {
    let square = pad_to_square(&image.to_rgb32f());
    let side = square.width();

    let resized = if side > target_size {
        resize_area(&square, target_size, target_size)
    } else if side < target_size {
        imageops::resize(&square, target_size, target_size, FilterType::Lanczos3)
    } else {
        square
    };

    let size = target_size as usize;
    Array4::from_shape_fn((1, size, size, CHANNELS), |(_, y, x, c)| {
        // RGB -> BGR
        resized.get_pixel(x as u32, y as u32)[CHANNELS - 1 - c] * PIXEL_SCALE
    })
}

/// Center `image` on a white square canvas.
fn pad_to_square(image: &Rgb32FImage) -> Rgb32FImage {
    let (width, height) = image.dimensions();
    let side = width.max(height);
    if width == height {
        return image.clone();
    }

    let pad_left = (side - width) / 2;
    let pad_top = (side - height) / 2;

    let mut canvas = Rgb32FImage::from_pixel(side, side, Rgb([PAD_WHITE; CHANNELS]));
    imageops::replace(&mut canvas, image, pad_left as i64, pad_top as i64);
    canvas
}

/// Source pixels (and their weights) covering each destination pixel when
/// shrinking `src_len` to `dst_len`.
fn area_weights(src_len: u32, dst_len: u32) -> Vec<Vec<(u32, f32)>> {
    let scale = src_len as f64 / dst_len as f64;

    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = start + scale;
            let first = start.floor() as u32;
            let last = (end.ceil() as u32).min(src_len);

            (first..last)
                .filter_map(|s| {
                    let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (overlap > 1e-9).then_some((s, (overlap / scale) as f32))
                })
                .collect()
        })
        .collect()
}

/// Area-averaging downscale: every output pixel is the coverage-weighted mean
/// of the source pixels it spans.
fn resize_area(src: &Rgb32FImage, dst_width: u32, dst_height: u32) -> Rgb32FImage {
    let (src_width, src_height) = src.dimensions();
    let x_weights = area_weights(src_width, dst_width);
    let y_weights = area_weights(src_height, dst_height);

    let mut horizontal = Rgb32FImage::new(dst_width, src_height);
    for y in 0..src_height {
        for (dx, weights) in x_weights.iter().enumerate() {
            let mut acc = [0.0f32; CHANNELS];
            for &(sx, w) in weights {
                let px = src.get_pixel(sx, y);
                for (a, v) in acc.iter_mut().zip(px.0) {
                    *a += v * w;
                }
            }
            horizontal.put_pixel(dx as u32, y, Rgb(acc));
        }
    }

    let mut out = Rgb32FImage::new(dst_width, dst_height);
    for (dy, weights) in y_weights.iter().enumerate() {
        for x in 0..dst_width {
            let mut acc = [0.0f32; CHANNELS];
            for &(sy, w) in weights {
                let px = horizontal.get_pixel(x, sy);
                for (a, v) in acc.iter_mut().zip(px.0) {
                    *a += v * w;
                }
            }
            out.put_pixel(x, dy as u32, Rgb(acc));
        }
    }

    out
}
