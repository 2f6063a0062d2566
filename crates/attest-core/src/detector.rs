//! SCRFD face-presence detector via ONNX Runtime.
//!
//! Runs the SCRFD anchor-free detector and reduces its output to what the
//! verification pipeline consumes: how many distinct faces are present.
//! Landmarks and original-space coordinates are not decoded.

use crate::face::{DetectionError, FaceDetector};
use crate::types::CapturedImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;

const INPUT_SIZE: usize = 640;
const INPUT_MEAN: f32 = 127.5;
const INPUT_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU_LIMIT: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// A candidate face box in letterbox space, corner form.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// SCRFD-backed [`FaceDetector`].
///
/// The session is mutex-guarded so a shared detector can serve the trait's
/// `&self` interface; the pipeline never runs two detections concurrently
/// for the same step anyway.
pub struct ScrfdPresence {
    session: Mutex<Session>,
}

impl ScrfdPresence {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectionError> {
        if !Path::new(model_path).exists() {
            return Err(DetectionError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()
            .map_err(ort_err)?
            .with_intra_threads(2)
            .map_err(ort_err)?
            .commit_from_file(model_path)
            .map_err(ort_err)?;

        let num_outputs = session.outputs().len();
        tracing::info!(path = model_path, outputs = num_outputs, "loaded SCRFD model");

        // Standard SCRFD export: [0-2] scores, [3-5] bbox deltas, [6-8] kps,
        // one slot per stride. Only scores and deltas are consumed here.
        if num_outputs < 6 {
            return Err(DetectionError::Failed(format!(
                "SCRFD model requires at least 6 outputs (scores + bboxes per stride), got {num_outputs}"
            )));
        }

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    fn detect(&self, image: &CapturedImage) -> Result<usize, DetectionError> {
        let input = preprocess(&image.pixels, image.width as usize, image.height as usize);

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectionError::Failed("detector session poisoned".into()))?;

        let outputs = session
            .run(ort::inputs![
                TensorRef::from_array_view(input.view()).map_err(ort_err)?
            ])
            .map_err(ort_err)?;

        let mut candidates = Vec::new();
        for (slot, &stride) in STRIDES.iter().enumerate() {
            let (_, scores) = outputs[slot]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectionError::Failed(format!("scores stride {stride}: {e}")))?;
            let (_, deltas) = outputs[slot + 3]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectionError::Failed(format!("bboxes stride {stride}: {e}")))?;
            candidates.extend(decode_stride(scores, deltas, stride));
        }

        let count = count_distinct(candidates, NMS_IOU_LIMIT);
        tracing::debug!(count, "SCRFD presence");
        Ok(count)
    }
}

impl FaceDetector for ScrfdPresence {
    fn count_faces(&self, image: &CapturedImage) -> Result<usize, DetectionError> {
        self.detect(image)
    }
}

fn ort_err(e: ort::Error) -> DetectionError {
    DetectionError::Failed(e.to_string())
}

/// Letterbox the grayscale frame into a 640x640 NCHW tensor, replicating
/// the Y channel across RGB and normalizing to the SCRFD input
/// distribution. Padding uses the mean value so it normalizes to zero.
fn preprocess(pixels: &[u8], width: usize, height: usize) -> Array4<f32> {
    let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
    let fit_w = ((width as f32 * scale).round() as usize).max(1);
    let fit_h = ((height as f32 * scale).round() as usize).max(1);

    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        for x in 0..INPUT_SIZE {
            let value = if x < fit_w && y < fit_h {
                // Nearest-neighbor sample; presence detection does not need
                // sub-pixel accuracy.
                let sx = ((x as f32 / scale) as usize).min(width.saturating_sub(1));
                let sy = ((y as f32 / scale) as usize).min(height.saturating_sub(1));
                pixels.get(sy * width + sx).copied().unwrap_or(0) as f32
            } else {
                INPUT_MEAN
            };

            let normalized = (value - INPUT_MEAN) / INPUT_STD;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    tensor
}

/// Decode one stride level into candidate boxes above the score threshold.
///
/// Scores are one per anchor; deltas are `[left, top, right, bottom]`
/// distances from the anchor center, in stride units.
fn decode_stride(scores: &[f32], deltas: &[f32], stride: usize) -> Vec<Candidate> {
    let grid = INPUT_SIZE / stride;
    let anchors = grid * grid * ANCHORS_PER_CELL;
    let mut found = Vec::new();

    for idx in 0..anchors.min(scores.len()) {
        let score = scores[idx];
        if score <= SCORE_THRESHOLD {
            continue;
        }
        let base = idx * 4;
        let Some(d) = deltas.get(base..base + 4) else {
            continue;
        };

        let cell = idx / ANCHORS_PER_CELL;
        let cx = ((cell % grid) * stride) as f32;
        let cy = ((cell / grid) * stride) as f32;
        let s = stride as f32;

        found.push(Candidate {
            x1: cx - d[0] * s,
            y1: cy - d[1] * s,
            x2: cx + d[2] * s,
            y2: cy + d[3] * s,
            score,
        });
    }

    found
}

/// Count distinct candidates after greedy non-maximum suppression.
fn count_distinct(mut candidates: Vec<Candidate>, iou_limit: f32) -> usize {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        if kept.iter().all(|k| iou(k, &cand) <= iou_limit) {
            kept.push(cand);
        }
    }
    kept.len()
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let iw = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let ih = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = iw * ih;
    let union = (a.x2 - a.x1) * (a.y2 - a.y1) + (b.x2 - b.x1) * (b.y2 - b.y1) - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
