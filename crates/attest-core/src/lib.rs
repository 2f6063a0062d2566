//! attest-core — shared verification types and recognition capabilities.
//!
//! Owns the data model of the identity verification flow plus the two
//! capability traits the pipeline consumes (text recognition and face
//! detection) and the SCRFD-backed face-presence adapter.

pub mod detector;
pub mod face;
pub mod text;
pub mod types;

pub use detector::ScrfdPresence;
pub use face::{DetectionError, FaceDetector};
pub use text::{outcome_from_lines, RecognitionError, RecognizedLine, TextRecognizer};
pub use types::{
    CameraPosition, CapturePhase, CapturedImage, IdentityRecord, RecognitionOutcome,
    VerificationDecision,
};

/// Default directory for ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        })
        .join("attest/models")
}
