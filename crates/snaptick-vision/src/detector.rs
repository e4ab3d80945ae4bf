//! Face localisation with the SCRFD (det_10g) model.
//!
//! Letterboxes the RGB image into the 640×640 model input, decodes the three
//! anchor-free stride heads (8/16/32) and suppresses overlaps with NMS.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use snaptick_core::BoundingBox;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const CONFIDENCE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model missing at {0}")]
    ModelNotFound(String),
    #[error("unexpected detector output: {0}")]
    BadOutput(String),
    #[error(transparent)]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied when fitting the source image into the model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((INPUT_SIZE as f32 - new_w) / 2.0).floor(),
            pad_y: ((INPUT_SIZE as f32 - new_h) / 2.0).floor(),
        }
    }

    fn resized_dims(&self, width: u32, height: u32) -> (u32, u32) {
        let w = ((width as f32 * self.scale).round() as u32).clamp(1, INPUT_SIZE);
        let h = ((height as f32 * self.scale).round() as u32).clamp(1, INPUT_SIZE);
        (w, h)
    }

    /// Map a point in model-input space back to source-image space.
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Raw tensors of one stride head.
struct StrideTensors<'a> {
    stride: usize,
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// Finds faces and their five landmarks in an RGB image.
pub struct FaceDetector {
    session: Session,
    layout: [StrideOutputs; 3],
}

impl FaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.is_file() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?.with_intra_threads(2)?.commit_from_file(model_path)?;
        let output_names: Vec<String> = session.outputs().iter().map(|output| output.name().to_string()).collect();
        tracing::info!(model = %model_path.display(), outputs = output_names.len(), "detector ready");

        if output_names.len() < 9 {
            return Err(DetectorError::BadOutput(format!(
                "need score, bbox and kps heads for 3 strides (9 outputs), found {}",
                output_names.len()
            )));
        }

        let layout = map_outputs(&output_names);
        tracing::debug!(?layout, "SCRFD output tensor mapping");

        Ok(Self { session, layout })
    }

    /// Detect faces, most confident first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let letterbox = Letterbox::fit(width, height);
        let input = preprocess(image, &letterbox);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in STRIDES.iter().enumerate() {
            let idx = self.layout[slot];
            let extract = |i: usize, what: &str| {
                outputs[i]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::BadOutput(format!("{what} stride {stride}: {e}")))
            };
            let tensors = StrideTensors {
                stride,
                scores: extract(idx.score, "scores")?,
                bboxes: extract(idx.bbox, "bboxes")?,
                kps: extract(idx.kps, "kps")?,
            };
            candidates.extend(decode_stride(&tensors, &letterbox, CONFIDENCE_THRESHOLD));
        }

        let faces = nms(candidates, NMS_IOU_THRESHOLD);
        tracing::debug!(faces = faces.len(), width, height, "SCRFD detection complete");
        Ok(faces)
    }
}

/// Letterbox the image into a normalized NCHW RGB tensor. Padding normalizes to 0.0.
fn preprocess(image: &RgbImage, letterbox: &Letterbox) -> Array4<f32> {
    let (new_w, new_h) = letterbox.resized_dims(image.width(), image.height());
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::zeros((1, 3, size, size));
    let (off_x, off_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + off_x, y as usize + off_y);
        if tx >= size || ty >= size {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - PIXEL_MEAN) / PIXEL_STD;
        }
    }

    tensor
}

/// Assign output tensors to stride slots by name ("score_8", "bbox_16", "kps_32", ...),
/// falling back to the standard positional layout of SCRFD exports.
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|name| *name == wanted)
    };

    let named: Option<Vec<StrideOutputs>> = STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideOutputs {
                score: find("score", stride)?,
                bbox: find("bbox", stride)?,
                kps: find("kps", stride)?,
            })
        })
        .collect();

    match named {
        Some(found) => [found[0], found[1], found[2]],
        None => {
            tracing::info!(?names, "SCRFD output names not recognized; using positional mapping");
            std::array::from_fn(|slot| StrideOutputs {
                score: slot,
                bbox: slot + 3,
                kps: slot + 6,
            })
        }
    }
}

/// Decode the anchors of one stride whose score exceeds `threshold`.
fn decode_stride(t: &StrideTensors<'_>, letterbox: &Letterbox, threshold: f32) -> Vec<BoundingBox> {
    let grid_w = INPUT_SIZE as usize / t.stride;
    let stride = t.stride as f32;

    t.scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score > threshold)
        .filter_map(|(idx, &score)| {
            let cell = idx / ANCHORS_PER_CELL;
            let cx = (cell % grid_w) as f32 * stride;
            let cy = (cell / grid_w) as f32 * stride;

            let d = t.bboxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.to_source(cx - d[0] * stride, cy - d[1] * stride);
            let (x2, y2) = letterbox.to_source(cx + d[2] * stride, cy + d[3] * stride);

            let landmarks = t.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.to_source(cx + k[i * 2] * stride, cy + k[i * 2 + 1] * stride))
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by confidence, highest first.
fn nms(mut candidates: Vec<BoundingBox>, max_overlap: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if keep.iter().all(|kept| overlap(kept, &candidate) <= max_overlap) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection over union.
fn overlap(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
