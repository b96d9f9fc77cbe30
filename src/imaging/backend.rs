//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the whole pixel-level surface the option
//! engine relies on: read, write, per-image transforms and list transforms.
//! Nothing above this layer touches pixels directly.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording [`MockBackend`](tests::MockBackend).

use super::params::{ListTransform, ReadParams, Transform, WriteParams};
use crate::image::Image;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

/// What a per-image transform did to its input.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Nothing to do; keep the input as is.
    Unchanged,
    /// Same image, new pixels or metadata. The caller keeps its node.
    Mutated(Image),
    /// A new image stands in for the input.
    Replaced(Image),
    /// The input becomes a sub-list at its position (`-crop` tiles,
    /// `-separate` channels).
    Split(Vec<Image>),
}

/// A coder entry for `-list format`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatInfo {
    pub name: String,
    pub description: String,
    pub readable: bool,
    pub writable: bool,
}

/// Trait for image processing backends.
///
/// Transform calls never modify their input; a backend that cannot perform an
/// operation returns [`BackendError::Unsupported`] and the caller keeps the
/// original image.
pub trait ImageBackend: Sync {
    /// Read a file, a directory of files, or a pseudo image (`xc:red`).
    fn read(&self, params: &ReadParams) -> Result<Vec<Image>, BackendError>;

    /// Write images to a destination.
    fn write(&self, images: &[Image], params: &WriteParams) -> Result<(), BackendError>;

    /// Apply a per-image operation.
    fn transform(&self, image: &Image, op: &Transform) -> Result<Outcome, BackendError>;

    /// Apply an operation to an ordered set of images, producing the
    /// replacement list.
    fn apply_list(&self, images: &[Image], op: &ListTransform)
    -> Result<Vec<Image>, BackendError>;

    /// Coders this backend can read or write.
    fn formats(&self) -> Vec<FormatInfo>;

    /// Fonts available to `-annotate` and `-draw text`.
    fn fonts(&self) -> Vec<String>;
}
