//! The verification state machine.
//!
//! A pure transition function: `(current state, event) -> side-effect list`,
//! with all camera and recognition work expressed as [`Effect`]s for the
//! driver to execute. No async, no I/O — every transition is independently
//! testable.

use attest_core::{
    CameraPosition, CapturePhase, CapturedImage, IdentityRecord, RecognitionOutcome,
    VerificationDecision,
};

/// Coarse step, as observed by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStep {
    CaptureId,
    CaptureFace,
    Verifying,
    Completed,
}

/// Fine-grained phase within the ID step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPhase {
    /// Capturable; nothing in flight.
    Idle,
    /// Capture issued, waiting for the image callback.
    AwaitingImage,
    /// Image stored, waiting for text recognition.
    AwaitingText,
    /// Readable ID stored; the advance affordance is available.
    Ready,
}

/// Fine-grained phase within the face step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacePhase {
    /// Camera switch to Front in flight.
    Switching,
    /// Capturable.
    Ready,
    /// Capture issued, waiting for the image callback.
    AwaitingImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CaptureId(IdPhase),
    CaptureFace(FacePhase),
    Verifying,
    Completed,
}

impl Step {
    pub fn coarse(&self) -> VerificationStep {
        match self {
            Step::CaptureId(_) => VerificationStep::CaptureId,
            Step::CaptureFace(_) => VerificationStep::CaptureFace,
            Step::Verifying => VerificationStep::Verifying,
            Step::Completed => VerificationStep::Completed,
        }
    }
}

/// Everything that can happen to the machine: user triggers, controller
/// completions, and recognition completions.
#[derive(Debug)]
pub enum Event {
    // User triggers.
    IdCaptureRequested,
    AdvanceRequested,
    FaceCaptureRequested,
    ReverifyRequested,
    // Capture controller completions.
    ImageCaptured(CapturedImage),
    CaptureFailed(String),
    SwitchCompleted(bool),
    // Recognition completions.
    TextRecognized(RecognitionOutcome),
    TextFailed(String),
    FacesChecked(Result<VerificationDecision, String>),
}

/// Work the driver must perform on the machine's behalf.
#[derive(Debug)]
pub enum Effect {
    RequestPosition(CameraPosition),
    RequestCapture(CapturePhase),
    RecognizeText(CapturedImage),
    CheckFaces {
        id: CapturedImage,
        live: CapturedImage,
    },
    Commit(IdentityRecord),
    ClearRecord,
}

const STATUS_INITIAL: &str = "Awaiting verification...";

pub struct Machine {
    step: Step,
    /// Bumped on every re-verify; async completions issued under an older
    /// generation are discarded by the driver.
    generation: u64,
    id_image: Option<CapturedImage>,
    face_image: Option<CapturedImage>,
    extracted_name: Option<String>,
    readable: bool,
    status: String,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self {
            step: Step::CaptureId(IdPhase::Idle),
            generation: 0,
            id_image: None,
            face_image: None,
            extracted_name: None,
            readable: false,
            status: STATUS_INITIAL.to_string(),
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn readable(&self) -> bool {
        self.readable
    }

    pub fn extracted_name(&self) -> Option<&str> {
        self.extracted_name.as_deref()
    }

    pub fn id_image(&self) -> Option<&CapturedImage> {
        self.id_image.as_ref()
    }

    pub fn face_image(&self) -> Option<&CapturedImage> {
        self.face_image.as_ref()
    }

    /// Apply one event. Events that the current step does not expect are
    /// ignored and produce no effects.
    pub fn apply(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::IdCaptureRequested => self.on_id_capture_requested(),
            Event::AdvanceRequested => self.on_advance_requested(),
            Event::FaceCaptureRequested => self.on_face_capture_requested(),
            Event::ReverifyRequested => self.on_reverify_requested(),
            Event::ImageCaptured(image) => self.on_image_captured(image),
            Event::CaptureFailed(reason) => self.on_capture_failed(reason),
            Event::SwitchCompleted(success) => self.on_switch_completed(success),
            Event::TextRecognized(outcome) => self.on_text_recognized(outcome),
            Event::TextFailed(reason) => self.on_text_failed(reason),
            Event::FacesChecked(result) => self.on_faces_checked(result),
        }
    }

    fn ignore(&self, event: &str) -> Vec<Effect> {
        tracing::debug!(event, step = ?self.step, "ignoring event in current step");
        Vec::new()
    }

    fn on_id_capture_requested(&mut self) -> Vec<Effect> {
        match self.step {
            // Retry is allowed any time no ID operation is in flight.
            Step::CaptureId(IdPhase::Idle) | Step::CaptureId(IdPhase::Ready) => {
                self.step = Step::CaptureId(IdPhase::AwaitingImage);
                self.status = "Capturing ID...".to_string();
                vec![
                    Effect::RequestPosition(CameraPosition::Back),
                    Effect::RequestCapture(CapturePhase::IdDocument),
                ]
            }
            _ => self.ignore("IdCaptureRequested"),
        }
    }

    fn on_advance_requested(&mut self) -> Vec<Effect> {
        match self.step {
            Step::CaptureId(IdPhase::Ready) => {
                self.step = Step::CaptureFace(FacePhase::Switching);
                self.status = "Switching to front camera...".to_string();
                vec![Effect::RequestPosition(CameraPosition::Front)]
            }
            _ => self.ignore("AdvanceRequested"),
        }
    }

    fn on_face_capture_requested(&mut self) -> Vec<Effect> {
        match self.step {
            Step::CaptureFace(FacePhase::Ready) => {
                self.step = Step::CaptureFace(FacePhase::AwaitingImage);
                self.status = "Capturing face...".to_string();
                vec![Effect::RequestCapture(CapturePhase::LiveFace)]
            }
            _ => self.ignore("FaceCaptureRequested"),
        }
    }

    fn on_reverify_requested(&mut self) -> Vec<Effect> {
        match self.step {
            Step::Completed => {
                self.step = Step::CaptureId(IdPhase::Idle);
                self.generation += 1;
                self.id_image = None;
                self.face_image = None;
                self.extracted_name = None;
                self.readable = false;
                self.status = STATUS_INITIAL.to_string();
                vec![Effect::ClearRecord]
            }
            _ => self.ignore("ReverifyRequested"),
        }
    }

    fn on_image_captured(&mut self, image: CapturedImage) -> Vec<Effect> {
        match self.step {
            Step::CaptureId(IdPhase::AwaitingImage) => {
                self.id_image = Some(image.clone());
                self.step = Step::CaptureId(IdPhase::AwaitingText);
                self.status = "Checking ID readability...".to_string();
                vec![Effect::RecognizeText(image)]
            }
            Step::CaptureFace(FacePhase::AwaitingImage) => {
                let live = image.clone();
                self.face_image = Some(image);
                let Some(id) = self.id_image.clone() else {
                    // Unreachable through the machine's own transitions:
                    // the advance gate requires a stored ID image.
                    debug_assert!(false, "face comparison attempted without an ID image");
                    self.step = Step::CaptureFace(FacePhase::Ready);
                    self.status =
                        "Both ID and live images are needed for comparison.".to_string();
                    return Vec::new();
                };
                self.step = Step::Verifying;
                self.status = "Comparing faces...".to_string();
                vec![Effect::CheckFaces { id, live }]
            }
            _ => self.ignore("ImageCaptured"),
        }
    }

    fn on_capture_failed(&mut self, reason: String) -> Vec<Effect> {
        match self.step {
            Step::CaptureId(IdPhase::AwaitingImage) => {
                self.step = Step::CaptureId(IdPhase::Idle);
                self.status = format!("ID capture failed: {reason}");
                Vec::new()
            }
            Step::CaptureFace(FacePhase::AwaitingImage) => {
                self.step = Step::CaptureFace(FacePhase::Ready);
                self.status = format!("Face capture failed: {reason}");
                Vec::new()
            }
            _ => self.ignore("CaptureFailed"),
        }
    }

    fn on_switch_completed(&mut self, success: bool) -> Vec<Effect> {
        match self.step {
            Step::CaptureFace(FacePhase::Switching) => {
                if success {
                    self.step = Step::CaptureFace(FacePhase::Ready);
                    self.status = "Position your face within the frame and capture.".to_string();
                } else {
                    // Controller kept the previous input; let the user retry
                    // the advance.
                    self.step = Step::CaptureId(IdPhase::Ready);
                    self.status = "Front camera unavailable.".to_string();
                }
                Vec::new()
            }
            // Back-position confirmations before an ID capture arrive here
            // and carry no transition.
            _ => self.ignore("SwitchCompleted"),
        }
    }

    fn on_text_recognized(&mut self, outcome: RecognitionOutcome) -> Vec<Effect> {
        match self.step {
            Step::CaptureId(IdPhase::AwaitingText) => {
                self.readable = outcome.readable;
                if outcome.readable {
                    self.extracted_name = outcome.extracted_name;
                    self.step = Step::CaptureId(IdPhase::Ready);
                    self.status =
                        "ID captured and readable. Proceed to face capture.".to_string();
                } else {
                    self.step = Step::CaptureId(IdPhase::Idle);
                    self.status = "Not readable (no text found)".to_string();
                }
                Vec::new()
            }
            _ => self.ignore("TextRecognized"),
        }
    }

    fn on_text_failed(&mut self, reason: String) -> Vec<Effect> {
        match self.step {
            Step::CaptureId(IdPhase::AwaitingText) => {
                self.readable = false;
                self.step = Step::CaptureId(IdPhase::Idle);
                self.status = format!("Not readable ({reason})");
                Vec::new()
            }
            _ => self.ignore("TextFailed"),
        }
    }

    fn on_faces_checked(&mut self, result: Result<VerificationDecision, String>) -> Vec<Effect> {
        match self.step {
            Step::Verifying => match result {
                Ok(decision) if decision.verified() => {
                    self.step = Step::Completed;
                    self.status = "ID and Face Verified!".to_string();
                    let record = IdentityRecord {
                        verified: true,
                        display_name: self.extracted_name.clone().unwrap_or_default(),
                    };
                    vec![Effect::Commit(record)]
                }
                Ok(decision) => {
                    self.step = Step::CaptureFace(FacePhase::Ready);
                    self.status = if !decision.id_face_detected {
                        "No face detected in ID image.".to_string()
                    } else {
                        "No face detected in live image.".to_string()
                    };
                    Vec::new()
                }
                Err(reason) => {
                    self.step = Step::CaptureFace(FacePhase::Ready);
                    self.status = reason;
                    Vec::new()
                }
            },
            _ => self.ignore("FacesChecked"),
        }
    }
}
