//! Face detection capability.
//!
//! The pipeline only consumes presence: zero faces vs. at least one.
//! Detector errors never escape the pipeline; they become a status update
//! and a retry.

use crate::types::CapturedImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("face detection failed: {0}")]
    Failed(String),
}

/// External face-detection capability.
pub trait FaceDetector: Send + Sync {
    /// Number of face regions found in the image.
    fn count_faces(&self, image: &CapturedImage) -> Result<usize, DetectionError>;
}
