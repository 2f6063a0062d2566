//! Async driver for the verification state machine.
//!
//! Owns the machine and executes its effects: camera operations go through
//! the [`ControllerHandle`], recognition runs on the blocking worker pool,
//! and terminal outcomes land in the [`OutcomeSink`]. Every transition
//! publishes a [`PipelineView`] snapshot over a `watch` channel; the
//! presentation layer reads that and nothing else.

use crate::controller::ControllerHandle;
use crate::machine::{Effect, Event, Machine, VerificationStep};
use crate::store::OutcomeSink;
use attest_core::{FaceDetector, TextRecognizer, VerificationDecision};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// UI-observable snapshot of the pipeline. Read-only; state changes only
/// through the named trigger methods on [`PipelineHandle`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineView {
    pub step: VerificationStep,
    pub status: String,
    pub readable: bool,
    pub extracted_name: Option<String>,
    pub has_id_image: bool,
    pub has_face_image: bool,
}

enum Command {
    /// User trigger; always applies to the current run.
    Trigger(Event),
    /// Async completion tagged with the generation it was issued under.
    /// Completions from a run that has since been reset are discarded.
    Completion { generation: u64, event: Event },
}

/// Clone-safe handle to a running pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<Command>,
    controller: ControllerHandle,
    view: watch::Receiver<PipelineView>,
}

impl PipelineHandle {
    pub async fn request_id_capture(&self) {
        self.trigger(Event::IdCaptureRequested).await;
    }

    pub async fn advance_to_face_capture(&self) {
        self.trigger(Event::AdvanceRequested).await;
    }

    pub async fn request_face_capture(&self) {
        self.trigger(Event::FaceCaptureRequested).await;
    }

    pub async fn request_reverify(&self) {
        self.trigger(Event::ReverifyRequested).await;
    }

    /// The capture surface became visible; start the camera session.
    pub async fn surface_visible(&self) {
        if let Err(e) = self.controller.start().await {
            tracing::warn!(error = %e, "failed to start camera session");
        }
    }

    /// The capture surface was hidden; stop the camera session.
    pub async fn surface_hidden(&self) {
        if let Err(e) = self.controller.stop().await {
            tracing::warn!(error = %e, "failed to stop camera session");
        }
    }

    /// Subscribe to pipeline snapshots.
    pub fn watch_view(&self) -> watch::Receiver<PipelineView> {
        self.view.clone()
    }

    async fn trigger(&self, event: Event) {
        if self.tx.send(Command::Trigger(event)).await.is_err() {
            tracing::error!("pipeline task is gone; trigger dropped");
        }
    }
}

/// Spawn the pipeline task.
pub fn spawn_pipeline(
    controller: ControllerHandle,
    recognizer: Arc<dyn TextRecognizer>,
    detector: Arc<dyn FaceDetector>,
    sink: Box<dyn OutcomeSink>,
) -> PipelineHandle {
    let machine = Machine::new();
    let (tx, rx) = mpsc::channel::<Command>(16);
    let (view_tx, view_rx) = watch::channel(snapshot(&machine));

    let handle = PipelineHandle {
        tx: tx.clone(),
        controller: controller.clone(),
        view: view_rx,
    };

    tokio::spawn(run(
        machine, rx, tx, view_tx, controller, recognizer, detector, sink,
    ));

    handle
}

#[allow(clippy::too_many_arguments)]
async fn run(
    mut machine: Machine,
    mut rx: mpsc::Receiver<Command>,
    tx: mpsc::Sender<Command>,
    view_tx: watch::Sender<PipelineView>,
    controller: ControllerHandle,
    recognizer: Arc<dyn TextRecognizer>,
    detector: Arc<dyn FaceDetector>,
    mut sink: Box<dyn OutcomeSink>,
) {
    while let Some(cmd) = rx.recv().await {
        let event = match cmd {
            Command::Trigger(event) => event,
            Command::Completion { generation, event } => {
                if generation != machine.generation() {
                    tracing::debug!(
                        generation,
                        current = machine.generation(),
                        "discarding stale completion"
                    );
                    continue;
                }
                event
            }
        };

        // Camera effects complete inline and can feed further events, so
        // drain a local queue before publishing the next snapshot.
        let mut pending = VecDeque::from([event]);
        while let Some(ev) = pending.pop_front() {
            for effect in machine.apply(ev) {
                let follow_up = run_effect(
                    effect,
                    machine.generation(),
                    &controller,
                    &recognizer,
                    &detector,
                    &mut sink,
                    &tx,
                )
                .await;
                if let Some(next) = follow_up {
                    pending.push_back(next);
                }
            }
        }

        if view_tx.send(snapshot(&machine)).is_err() {
            // Every receiver is gone; keep running for the handles' sake.
            tracing::debug!("no pipeline view subscribers");
        }
    }
    tracing::info!("pipeline task exiting");
}

async fn run_effect(
    effect: Effect,
    generation: u64,
    controller: &ControllerHandle,
    recognizer: &Arc<dyn TextRecognizer>,
    detector: &Arc<dyn FaceDetector>,
    sink: &mut Box<dyn OutcomeSink>,
    tx: &mpsc::Sender<Command>,
) -> Option<Event> {
    match effect {
        Effect::RequestPosition(position) => match controller.configure(position).await {
            Ok(()) => Some(Event::SwitchCompleted(true)),
            Err(e) => {
                tracing::warn!(%position, error = %e, "camera switch failed");
                Some(Event::SwitchCompleted(false))
            }
        },
        Effect::RequestCapture(phase) => match controller.capture(phase).await {
            Ok(image) => Some(Event::ImageCaptured(image)),
            Err(e) => Some(Event::CaptureFailed(e.to_string())),
        },
        Effect::RecognizeText(image) => {
            let recognizer = recognizer.clone();
            let tx = tx.clone();
            tokio::task::spawn_blocking(move || {
                let event = match recognizer.recognize(&image) {
                    Ok(lines) => Event::TextRecognized(attest_core::outcome_from_lines(&lines)),
                    Err(e) => {
                        tracing::warn!(error = %e, "text recognition failed");
                        Event::TextFailed("recognition error".to_string())
                    }
                };
                let _ = tx.blocking_send(Command::Completion { generation, event });
            });
            None
        }
        Effect::CheckFaces { id, live } => {
            let detector = detector.clone();
            let tx = tx.clone();
            tokio::task::spawn_blocking(move || {
                let result = check_faces(detector.as_ref(), &id, &live);
                let _ = tx.blocking_send(Command::Completion {
                    generation,
                    event: Event::FacesChecked(result),
                });
            });
            None
        }
        Effect::Commit(record) => {
            if let Err(e) = sink.commit(&record) {
                tracing::error!(error = %e, "failed to persist identity record");
            }
            None
        }
        Effect::ClearRecord => {
            if let Err(e) = sink.clear() {
                tracing::error!(error = %e, "failed to clear identity record");
            }
            None
        }
    }
}

/// Run both face-presence checks, ID image first. Errors identify which
/// image failed, in the wording the presentation layer shows directly.
fn check_faces(
    detector: &dyn FaceDetector,
    id: &attest_core::CapturedImage,
    live: &attest_core::CapturedImage,
) -> Result<VerificationDecision, String> {
    let id_count = detector.count_faces(id).map_err(|e| {
        tracing::warn!(error = %e, "ID image face detection failed");
        "Error detecting face in ID image.".to_string()
    })?;
    let live_count = detector.count_faces(live).map_err(|e| {
        tracing::warn!(error = %e, "live image face detection failed");
        "Error detecting face in live image.".to_string()
    })?;
    Ok(VerificationDecision {
        id_face_detected: id_count > 0,
        live_face_detected: live_count > 0,
    })
}

fn snapshot(machine: &Machine) -> PipelineView {
    PipelineView {
        step: machine.step().coarse(),
        status: machine.status().to_string(),
        readable: machine.readable(),
        extracted_name: machine.extracted_name().map(str::to_string),
        has_id_image: machine.id_image().is_some(),
        has_face_image: machine.face_image().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::spawn_controller;
    use crate::testutil::{FakeProvider, ScriptedDetector, ScriptedRecognizer, SharedSink, Shot};
    use std::time::Duration;

    const ID_LINES: &[&str] = &["ID Card", "Name: Jane Doe", "DOB: 01/01/1990"];

    struct Fixture {
        handle: PipelineHandle,
        record: std::sync::Arc<std::sync::Mutex<attest_core::IdentityRecord>>,
        recognizer_calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    fn fixture(
        provider: FakeProvider,
        recognizer: ScriptedRecognizer,
        detector: ScriptedDetector,
    ) -> Fixture {
        let recognizer_calls = recognizer.call_counter();
        let controller = spawn_controller(Box::new(provider), 0);
        let (sink, record) = SharedSink::new();
        let handle = spawn_pipeline(
            controller,
            Arc::new(recognizer),
            Arc::new(detector),
            Box::new(sink),
        );
        Fixture {
            handle,
            record,
            recognizer_calls,
        }
    }

    async fn wait_view(
        view: &mut watch::Receiver<PipelineView>,
        pred: impl FnMut(&PipelineView) -> bool,
    ) -> PipelineView {
        tokio::time::timeout(Duration::from_secs(5), view.wait_for(pred))
            .await
            .expect("timed out waiting for pipeline view")
            .expect("pipeline task gone")
            .clone()
    }

    fn two_camera_provider() -> FakeProvider {
        FakeProvider::new()
            .with_back(vec![Shot::ok(10), Shot::ok(11)])
            .with_front(vec![Shot::ok(20), Shot::ok(21)])
    }

    #[tokio::test]
    async fn test_happy_path_completes_and_commits() {
        let f = fixture(
            two_camera_provider(),
            ScriptedRecognizer::with_lines(ID_LINES),
            ScriptedDetector::faces_everywhere(),
        );
        let mut view = f.handle.watch_view();

        f.handle.surface_visible().await;
        f.handle.request_id_capture().await;
        let v = wait_view(&mut view, |v| v.readable).await;
        assert_eq!(v.step, VerificationStep::CaptureId);
        assert_eq!(v.extracted_name.as_deref(), Some("Jane Doe"));
        assert!(v.has_id_image);

        f.handle.advance_to_face_capture().await;
        wait_view(&mut view, |v| {
            v.step == VerificationStep::CaptureFace && v.status.contains("Position your face")
        })
        .await;

        f.handle.request_face_capture().await;
        let v = wait_view(&mut view, |v| v.step == VerificationStep::Completed).await;
        assert_eq!(v.status, "ID and Face Verified!");
        assert!(v.has_face_image);

        let record = f.record.lock().unwrap().clone();
        assert!(record.verified);
        assert_eq!(record.display_name, "Jane Doe");
    }

    #[tokio::test]
    async fn test_capture_failure_skips_recognition() {
        let provider = FakeProvider::new().with_back(vec![Shot::fail("sensor timeout")]);
        let f = fixture(
            provider,
            ScriptedRecognizer::with_lines(ID_LINES),
            ScriptedDetector::faces_everywhere(),
        );
        let mut view = f.handle.watch_view();

        f.handle.surface_visible().await;
        f.handle.request_id_capture().await;
        let v = wait_view(&mut view, |v| v.status.contains("ID capture failed")).await;
        assert_eq!(v.step, VerificationStep::CaptureId);
        assert!(!v.has_id_image);
        assert_eq!(
            f.recognizer_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_capture_without_session_reports_not_ready() {
        let f = fixture(
            two_camera_provider(),
            ScriptedRecognizer::with_lines(ID_LINES),
            ScriptedDetector::faces_everywhere(),
        );
        let mut view = f.handle.watch_view();

        // Surface never became visible: session not running.
        f.handle.request_id_capture().await;
        let v = wait_view(&mut view, |v| v.status.contains("not ready")).await;
        assert_eq!(v.step, VerificationStep::CaptureId);
    }

    #[tokio::test]
    async fn test_unreadable_id_allows_retry() {
        let f = fixture(
            two_camera_provider(),
            ScriptedRecognizer::with_lines(&[]),
            ScriptedDetector::faces_everywhere(),
        );
        let mut view = f.handle.watch_view();

        f.handle.surface_visible().await;
        f.handle.request_id_capture().await;
        let v = wait_view(&mut view, |v| v.status.contains("Not readable")).await;
        assert_eq!(v.step, VerificationStep::CaptureId);
        assert!(!v.readable);
    }

    #[tokio::test]
    async fn test_recognizer_error_reports_not_readable() {
        let f = fixture(
            two_camera_provider(),
            ScriptedRecognizer::failing("engine crashed"),
            ScriptedDetector::faces_everywhere(),
        );
        let mut view = f.handle.watch_view();

        f.handle.surface_visible().await;
        f.handle.request_id_capture().await;
        let v = wait_view(&mut view, |v| v.status.contains("Not readable")).await;
        assert_eq!(v.status, "Not readable (recognition error)");
    }

    #[tokio::test]
    async fn test_live_detection_error_reverts_to_face_step() {
        let f = fixture(
            two_camera_provider(),
            ScriptedRecognizer::with_lines(ID_LINES),
            ScriptedDetector::new(Ok(1), Err("inference failed".to_string())),
        );
        let mut view = f.handle.watch_view();

        f.handle.surface_visible().await;
        f.handle.request_id_capture().await;
        wait_view(&mut view, |v| v.readable).await;
        f.handle.advance_to_face_capture().await;
        wait_view(&mut view, |v| v.status.contains("Position your face")).await;
        f.handle.request_face_capture().await;

        let v = wait_view(&mut view, |v| v.status.contains("Error detecting face")).await;
        assert_eq!(v.status, "Error detecting face in live image.");
        assert_eq!(v.step, VerificationStep::CaptureFace);

        // The identity record was never touched.
        assert!(!f.record.lock().unwrap().verified);
    }

    #[tokio::test]
    async fn test_no_face_in_id_image_reverts_to_face_step() {
        let f = fixture(
            two_camera_provider(),
            ScriptedRecognizer::with_lines(ID_LINES),
            ScriptedDetector::new(Ok(0), Ok(1)),
        );
        let mut view = f.handle.watch_view();

        f.handle.surface_visible().await;
        f.handle.request_id_capture().await;
        wait_view(&mut view, |v| v.readable).await;
        f.handle.advance_to_face_capture().await;
        wait_view(&mut view, |v| v.status.contains("Position your face")).await;
        f.handle.request_face_capture().await;

        let v = wait_view(&mut view, |v| v.status.contains("No face detected")).await;
        assert_eq!(v.status, "No face detected in ID image.");
        assert_eq!(v.step, VerificationStep::CaptureFace);
    }

    #[tokio::test]
    async fn test_reverify_clears_record_and_restarts() {
        let f = fixture(
            two_camera_provider(),
            ScriptedRecognizer::with_lines(ID_LINES),
            ScriptedDetector::faces_everywhere(),
        );
        let mut view = f.handle.watch_view();

        f.handle.surface_visible().await;
        f.handle.request_id_capture().await;
        wait_view(&mut view, |v| v.readable).await;
        f.handle.advance_to_face_capture().await;
        wait_view(&mut view, |v| v.status.contains("Position your face")).await;
        f.handle.request_face_capture().await;
        wait_view(&mut view, |v| v.step == VerificationStep::Completed).await;
        assert!(f.record.lock().unwrap().verified);

        f.handle.request_reverify().await;
        let v = wait_view(&mut view, |v| v.step == VerificationStep::CaptureId).await;
        assert!(!v.readable);
        assert_eq!(v.extracted_name, None);
        assert!(!v.has_id_image);
        assert!(!v.has_face_image);

        let record = f.record.lock().unwrap().clone();
        assert!(!record.verified);
        assert_eq!(record.display_name, "");
    }

    #[tokio::test]
    async fn test_stray_triggers_do_not_move_the_machine() {
        let f = fixture(
            two_camera_provider(),
            ScriptedRecognizer::with_lines(ID_LINES),
            ScriptedDetector::faces_everywhere(),
        );
        let mut view = f.handle.watch_view();

        f.handle.surface_visible().await;
        // Face capture and advance make no sense in the initial step.
        f.handle.request_face_capture().await;
        f.handle.advance_to_face_capture().await;
        f.handle.request_reverify().await;

        // The machine still accepts the legitimate first trigger.
        f.handle.request_id_capture().await;
        let v = wait_view(&mut view, |v| v.readable).await;
        assert_eq!(v.step, VerificationStep::CaptureId);
    }
}
