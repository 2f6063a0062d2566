use serde::{Deserialize, Serialize};

/// Physical camera selector. `Back` faces away from the user (documents),
/// `Front` faces the user (selfies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraPosition {
    Front,
    Back,
}

impl std::fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraPosition::Front => write!(f, "front"),
            CameraPosition::Back => write!(f, "back"),
        }
    }
}

/// Which phase of the verification flow an image was captured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    IdDocument,
    LiveFace,
}

/// A single-shot grayscale capture, tagged with the position and phase it
/// was taken under.
#[derive(Clone)]
pub struct CapturedImage {
    /// Grayscale pixel data (width * height bytes).
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub position: CameraPosition,
    pub phase: CapturePhase,
}

impl CapturedImage {
    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        self.pixels.iter().map(|&b| b as f32).sum::<f32>() / self.pixels.len() as f32
    }

    /// View the buffer as a `GrayImage` for adapters that need an encoded
    /// raster (e.g. subprocess OCR). Returns `None` when the buffer does
    /// not match the stated dimensions.
    pub fn to_gray_image(&self) -> Option<image::GrayImage> {
        image::GrayImage::from_raw(self.width, self.height, self.pixels.clone())
    }
}

impl std::fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("position", &self.position)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Result of running text recognition over an ID capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOutcome {
    /// Whether any usable text was found at all.
    pub readable: bool,
    /// Name pulled from a `Name:` line, if one was present.
    pub extracted_name: Option<String>,
}

/// Inputs to the terminal verification decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationDecision {
    pub id_face_detected: bool,
    pub live_face_detected: bool,
}

impl VerificationDecision {
    /// Verified iff a face was found in both the document and the live shot.
    pub fn verified(&self) -> bool {
        self.id_face_detected && self.live_face_detected
    }
}

/// The persisted identity state, written once on a successful completion
/// and cleared by an explicit re-verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub verified: bool,
    pub display_name: String,
}

impl IdentityRecord {
    /// The unverified empty record.
    pub fn unverified() -> Self {
        Self {
            verified: false,
            display_name: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_requires_both_faces() {
        let both = VerificationDecision {
            id_face_detected: true,
            live_face_detected: true,
        };
        assert!(both.verified());

        let id_only = VerificationDecision {
            id_face_detected: true,
            live_face_detected: false,
        };
        assert!(!id_only.verified());

        let live_only = VerificationDecision {
            id_face_detected: false,
            live_face_detected: true,
        };
        assert!(!live_only.verified());
    }

    #[test]
    fn test_avg_brightness() {
        let img = CapturedImage {
            pixels: vec![0, 255, 0, 255],
            width: 2,
            height: 2,
            position: CameraPosition::Back,
            phase: CapturePhase::IdDocument,
        };
        assert!((img.avg_brightness() - 127.5).abs() < 1e-6);
    }

    #[test]
    fn test_to_gray_image_dimension_mismatch() {
        let img = CapturedImage {
            pixels: vec![0; 3],
            width: 2,
            height: 2,
            position: CameraPosition::Back,
            phase: CapturePhase::IdDocument,
        };
        assert!(img.to_gray_image().is_none());
    }
}
