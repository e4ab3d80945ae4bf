//! ArcFace (w600k_r50) embeddings for detected faces.
//!
//! Each face is warped onto the canonical 112x112 landmark template before
//! inference; the 512-dim output is scaled to unit length so Euclidean
//! distances fall in [0, 2].

use crate::alignment::{self, ALIGNED_SIZE};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use snaptick_core::{BoundingBox, Embedding};
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
pub const ARCFACE_EMBEDDING_DIM: usize = 512;
pub const ARCFACE_MODEL_VERSION: &str = "w600k_r50";
/// Match threshold for unit-length ArcFace embeddings. An L2 distance of 1.1
/// is a cosine similarity of about 0.40.
pub const ARCFACE_MATCH_THRESHOLD: f32 = 1.1;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognizer model missing at {0}")]
    ModelNotFound(String),
    #[error("unexpected recognizer output: {0}")]
    BadOutput(String),
    #[error("cannot align a face without landmarks")]
    NoLandmarks,
    #[error(transparent)]
    Ort(#[from] ort::Error),
}

/// Turns aligned face crops into identity embeddings.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.is_file() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }
        let session = Session::builder()?.with_intra_threads(2)?.commit_from_file(model_path)?;
        tracing::info!(model = %model_path.display(), "recognizer ready");
        Ok(Self { session })
    }

    /// Embedding of the face at `face`, which must carry landmarks.
    pub fn extract(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, RecognizerError> {
        let Some(landmarks) = face.landmarks.as_ref() else {
            return Err(RecognizerError::NoLandmarks);
        };
        let crop = alignment::align_face(image, landmarks);
        let input = to_tensor(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, values) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::BadOutput(e.to_string()))?;
        if values.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::BadOutput(format!(
                "{} values instead of {ARCFACE_EMBEDDING_DIM}",
                values.len()
            )));
        }

        Ok(Embedding {
            values: unit_length(values),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

/// RGB crop to a `1x3xHxW` tensor scaled into roughly [-1, 1].
fn to_tensor(crop: &RgbImage) -> Array4<f32> {
    let side = ALIGNED_SIZE as usize;
    Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        (crop.get_pixel(x as u32, y as u32)[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD
    })
}

fn unit_length(values: &[f32]) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return values.to_vec();
    }
    values.iter().map(|v| v / norm).collect()
}
