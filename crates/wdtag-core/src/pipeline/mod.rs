//! Per-image input stages.
//!
//! - **discovery**: Find image files in directories
//! - **validate**: Cheap checks before decoding
//! - **decode**: Load and decode images
//! - **preprocess**: Pad, resize and lay out the model input tensor

pub mod decode;
pub mod discovery;
pub mod preprocess;
pub mod validate;

// Re-exports for convenient access
pub use decode::{decode_file, DecodedImage};
pub use discovery::FileDiscovery;
pub use preprocess::{image_to_tensor, ImagePreprocessor, TensorLayout, DEFAULT_TARGET_SIZE};
pub use validate::Validator;
