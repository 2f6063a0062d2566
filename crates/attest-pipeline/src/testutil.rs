//! Deterministic fakes for controller and driver tests: canned capture
//! backends, scripted recognizers/detectors, and a shared in-memory sink.

use crate::store::{OutcomeSink, StoreError};
use attest_core::{
    CameraPosition, CapturePhase, CapturedImage, DetectionError, FaceDetector, IdentityRecord,
    RecognitionError, RecognizedLine, TextRecognizer,
};
use attest_hw::{CameraError, CaptureBackend, DeviceProvider, Photo};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One scripted capture result. `ok(v)` yields a 2x2 photo filled with `v`.
#[derive(Clone)]
pub struct Shot(Result<u8, String>);

impl Shot {
    pub fn ok(fill: u8) -> Self {
        Shot(Ok(fill))
    }

    pub fn fail(msg: &str) -> Self {
        Shot(Err(msg.to_string()))
    }
}

struct FakeBackend {
    shots: VecDeque<Shot>,
    warmups: Arc<AtomicUsize>,
}

impl CaptureBackend for FakeBackend {
    fn take_photo(&mut self) -> Result<Photo, CameraError> {
        match self.shots.pop_front() {
            Some(Shot(Ok(fill))) => Ok(Photo {
                gray: vec![fill; 4],
                width: 2,
                height: 2,
            }),
            Some(Shot(Err(msg))) => Err(CameraError::CaptureFailed(msg)),
            None => Err(CameraError::CaptureFailed("no scripted shots left".into())),
        }
    }

    fn warm_up(&mut self, frames: usize) {
        self.warmups.fetch_add(frames, Ordering::SeqCst);
    }
}

/// Provider with per-position scripted shot sequences. Positions without a
/// script behave like absent devices. Each open re-clones the script, so a
/// position can be re-installed after switching away.
pub struct FakeProvider {
    front: Option<Vec<Shot>>,
    back: Option<Vec<Shot>>,
    opens: Arc<AtomicUsize>,
    warmups: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            front: None,
            back: None,
            opens: Arc::new(AtomicUsize::new(0)),
            warmups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_front(mut self, shots: Vec<Shot>) -> Self {
        self.front = Some(shots);
        self
    }

    pub fn with_back(mut self, shots: Vec<Shot>) -> Self {
        self.back = Some(shots);
        self
    }

    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        self.opens.clone()
    }

    pub fn warmup_counter(&self) -> Arc<AtomicUsize> {
        self.warmups.clone()
    }
}

impl DeviceProvider for FakeProvider {
    fn open(&self, position: CameraPosition) -> Result<Box<dyn CaptureBackend>, CameraError> {
        let script = match position {
            CameraPosition::Front => &self.front,
            CameraPosition::Back => &self.back,
        };
        match script {
            Some(shots) => {
                self.opens.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FakeBackend {
                    shots: shots.clone().into(),
                    warmups: self.warmups.clone(),
                }))
            }
            None => Err(CameraError::DeviceNotFound(format!("{position} camera"))),
        }
    }
}

/// Recognizer that always yields the same lines (or the same error).
pub struct ScriptedRecognizer {
    result: Result<Vec<RecognizedLine>, String>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedRecognizer {
    pub fn with_lines(texts: &[&str]) -> Self {
        Self {
            result: Ok(texts
                .iter()
                .map(|t| RecognizedLine::new(*t, 0.9))
                .collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            result: Err(msg.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&self, _image: &CapturedImage) -> Result<Vec<RecognizedLine>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.result {
            Ok(lines) => Ok(lines.clone()),
            Err(msg) => Err(RecognitionError::Failed(msg.clone())),
        }
    }
}

/// Detector scripted per capture phase (ID document vs. live face).
pub struct ScriptedDetector {
    id_result: Result<usize, String>,
    live_result: Result<usize, String>,
}

impl ScriptedDetector {
    pub fn new(id_result: Result<usize, String>, live_result: Result<usize, String>) -> Self {
        Self {
            id_result,
            live_result,
        }
    }

    pub fn faces_everywhere() -> Self {
        Self::new(Ok(1), Ok(1))
    }
}

impl FaceDetector for ScriptedDetector {
    fn count_faces(&self, image: &CapturedImage) -> Result<usize, DetectionError> {
        let result = match image.phase {
            CapturePhase::IdDocument => &self.id_result,
            CapturePhase::LiveFace => &self.live_result,
        };
        match result {
            Ok(count) => Ok(*count),
            Err(msg) => Err(DetectionError::Failed(msg.clone())),
        }
    }
}

/// Sink whose record is observable from the test through a shared handle.
pub struct SharedSink {
    record: Arc<Mutex<IdentityRecord>>,
}

impl SharedSink {
    pub fn new() -> (Self, Arc<Mutex<IdentityRecord>>) {
        let record = Arc::new(Mutex::new(IdentityRecord::unverified()));
        (
            Self {
                record: record.clone(),
            },
            record,
        )
    }
}

impl OutcomeSink for SharedSink {
    fn commit(&mut self, record: &IdentityRecord) -> Result<(), StoreError> {
        *self.record.lock().unwrap() = record.clone();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        *self.record.lock().unwrap() = IdentityRecord::unverified();
        Ok(())
    }

    fn load(&self) -> Result<IdentityRecord, StoreError> {
        Ok(self.record.lock().unwrap().clone())
    }
}
