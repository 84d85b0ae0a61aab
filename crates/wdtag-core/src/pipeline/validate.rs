//! Input validation before decoding.

use std::io::Read;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Validates image files before they are decoded.
#[derive(Debug, Clone)]
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Cheap checks ahead of a full decode:
    /// - file exists and is readable
    /// - file size is within limits
    /// - header carries a known image signature
    pub fn validate(&self, path: &Path) -> Result<(), PipelineError> {
        let decode_err = |message: String| PipelineError::Decode {
            path: path.to_path_buf(),
            message,
        };

        let metadata = std::fs::metadata(path)
            .map_err(|e| decode_err(format!("Cannot read metadata: {e}")))?;
        if !metadata.is_file() {
            return Err(decode_err("Not a regular file".to_string()));
        }

        let max_bytes = self.limits.max_file_size_mb.saturating_mul(1024 * 1024);
        if metadata.len() > max_bytes {
            return Err(decode_err(format!(
                "File too large ({}MB > {}MB)",
                metadata.len() / (1024 * 1024),
                self.limits.max_file_size_mb
            )));
        }

        let mut file =
            std::fs::File::open(path).map_err(|e| decode_err(format!("Cannot open file: {e}")))?;
        let mut header = [0u8; 12];
        let bytes_read = file.read(&mut header).unwrap_or(0);

        if bytes_read < 4 {
            return Err(decode_err("File too small to be a valid image".to_string()));
        }
        if !has_image_signature(&header[..bytes_read]) {
            return Err(decode_err(
                "Unrecognized image format (invalid magic bytes)".to_string(),
            ));
        }

        Ok(())
    }
}

/// Whether the leading bytes match a format the decoder understands.
fn has_image_signature(header: &[u8]) -> bool {
    const PREFIXES: &[&[u8]] = &[
        &[0xFF, 0xD8, 0xFF],             // JPEG
        &[0x89, b'P', b'N', b'G'],       // PNG
        b"GIF8",                         // GIF
        b"BM",                           // BMP
        &[b'I', b'I', 0x2A, 0x00],       // TIFF little-endian
        &[b'M', b'M', 0x00, 0x2A],       // TIFF big-endian
    ];

    if PREFIXES.iter().any(|p| header.starts_with(p)) {
        return true;
    }

    // WebP: RIFF....WEBP
    if header.starts_with(b"RIFF") {
        return header.len() < 12 || &header[8..12] == b"WEBP";
    }

    // AVIF and friends: ftyp box at offset 4
    header.len() >= 8 && &header[4..8] == b"ftyp"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_jpeg_png_webp() {
        assert!(has_image_signature(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]));
        assert!(has_image_signature(&[
            0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A
        ]));
        assert!(has_image_signature(b"RIFF\0\0\0\0WEBP"));
    }

    #[test]
    fn test_signature_riff_non_webp_rejected() {
        assert!(!has_image_signature(b"RIFF\0\0\0\0WAVE"));
    }

    #[test]
    fn test_signature_tiff_requires_version() {
        assert!(has_image_signature(&[b'I', b'I', 0x2A, 0x00]));
        assert!(has_image_signature(&[b'M', b'M', 0x00, 0x2A]));
        assert!(!has_image_signature(&[b'I', b'I', 0x00, 0x00]));
    }

    #[test]
    fn test_signature_invalid() {
        assert!(!has_image_signature(&[0, 0, 0, 0, 0, 0, 0, 0]));
        assert!(!has_image_signature(b"cat, hat"));
    }

    #[test]
    fn test_validate_missing_file() {
        let validator = Validator::new(LimitsConfig::default());
        let err = validator
            .validate(Path::new("/nonexistent/photo.jpg"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }

    #[test]
    fn test_validate_text_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, "definitely not an image").unwrap();

        let validator = Validator::new(LimitsConfig::default());
        let err = validator.validate(&path).unwrap_err();
        assert!(err.to_string().contains("magic bytes"));
    }

    #[test]
    fn test_validate_real_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("real.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();

        let validator = Validator::new(LimitsConfig::default());
        assert!(validator.validate(&path).is_ok());
    }

    #[test]
    fn test_validate_huge_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("real.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();

        let validator = Validator::new(LimitsConfig {
            max_file_size_mb: u64::MAX,
        });
        assert!(validator.validate(&path).is_ok());
    }
}
