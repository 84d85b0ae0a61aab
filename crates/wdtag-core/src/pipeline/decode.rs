//! Image decoding with content-based format detection.
//!
//! Decoding is synchronous; callers are expected to already be on a blocking
//! worker.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;

use crate::error::PipelineError;

/// Result of decoding an image.
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

/// Decode an image file, detecting the format from its content first and its
/// extension second.
pub fn decode_file(path: &Path) -> Result<DecodedImage, PipelineError> {
    let reader = image::ImageReader::open(path)
        .map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot open image: {e}"),
        })?
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot detect image format: {e}"),
        })?;

    let format = match reader.format() {
        Some(f) => f,
        None => ImageFormat::from_path(path).map_err(|_| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!(
                "Unsupported format: {}",
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown")
            ),
        })?,
    };

    let image = reader.decode().map_err(|e| PipelineError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let (width, height) = image.dimensions();
    tracing::trace!("Decoded {:?} as {:?} ({}x{})", path, format, width, height);

    Ok(DecodedImage {
        image,
        format,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detected_by_content() {
        // A PNG saved under a .jpg name should still decode as PNG
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("source.png");
        image::RgbImage::new(8, 6).save(&png).unwrap();
        let misnamed = dir.path().join("misnamed.jpg");
        std::fs::copy(&png, &misnamed).unwrap();

        let decoded = decode_file(&misnamed).unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!((decoded.width, decoded.height), (8, 6));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G', 0, 0, 0, 0]).unwrap();

        assert!(matches!(
            decode_file(&path),
            Err(PipelineError::Decode { .. })
        ));
    }
}
