//! Tesseract-subprocess text recognition adapter.
//!
//! Writes the capture to a temporary PNG and shells out to `tesseract`.
//! Thin by design; any OCR engine that yields text lines can stand behind
//! the same trait.

use attest_core::{CapturedImage, RecognitionError, RecognizedLine, TextRecognizer};
use std::process::Command;

pub struct TesseractRecognizer;

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &CapturedImage) -> Result<Vec<RecognizedLine>, RecognitionError> {
        let gray: image::GrayImage = image.to_gray_image().ok_or(RecognitionError::BadImage)?;

        let path = std::env::temp_dir().join(format!("attest-ocr-{}.png", std::process::id()));
        gray.save(&path)
            .map_err(|e| RecognitionError::Failed(format!("write temp image: {e}")))?;

        let output = Command::new("tesseract").arg(&path).arg("stdout").output();
        let _ = std::fs::remove_file(&path);

        let output =
            output.map_err(|e| RecognitionError::Failed(format!("spawn tesseract: {e}")))?;
        if !output.status.success() {
            return Err(RecognitionError::Failed(format!(
                "tesseract exited with {}",
                output.status
            )));
        }

        Ok(lines_from_text(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn lines_from_text(text: &str) -> Vec<RecognizedLine> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| RecognizedLine::new(l, 1.0))
        .collect()
}
