//! Text recognition capability and ID readability parsing.
//!
//! The recognizer itself is an external capability; this module owns the
//! trait plus the heuristics that turn recognized lines into a readability
//! verdict and an extracted display name.

use crate::types::{CapturedImage, RecognitionOutcome};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("text recognition failed: {0}")]
    Failed(String),
    #[error("image could not be decoded")]
    BadImage,
}

/// One recognized text line with its best candidate string.
#[derive(Debug, Clone)]
pub struct RecognizedLine {
    pub text: String,
    pub confidence: f32,
}

impl RecognizedLine {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// External text-recognition capability. One finite pass per image; the
/// output is not restartable.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &CapturedImage) -> Result<Vec<RecognizedLine>, RecognitionError>;
}

/// Derive the readability verdict and extracted name from recognized lines.
///
/// The document is readable when any non-empty text was produced. The name
/// comes from the first line containing a `Name:` marker, taking the
/// substring after the last colon, trimmed. A marker line with nothing
/// after the colon yields no name.
pub fn outcome_from_lines(lines: &[RecognizedLine]) -> RecognitionOutcome {
    let readable = lines.iter().any(|l| !l.text.trim().is_empty());
    RecognitionOutcome {
        readable,
        extracted_name: extract_name(lines),
    }
}

fn extract_name(lines: &[RecognizedLine]) -> Option<String> {
    let marker_line = lines.iter().find(|l| l.text.contains("Name:"))?;
    let name = marker_line.text.rsplit(':').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
