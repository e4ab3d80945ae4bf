//! [`FaceEncoder`] backed by the SCRFD detector and ArcFace recognizer.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::{DETECTOR_MODEL_FILE, RECOGNIZER_MODEL_FILE};
use image::RgbImage;
use snaptick_core::{EncodeError, FaceEncoder, FaceEncoding};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detects every face in an image and embeds each one.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models from `model_dir`. Fails fast if either file is missing.
    pub fn load(model_dir: &Path) -> Result<Self, LoadError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }

    /// Encode an already decoded image.
    pub fn encode_image(&mut self, image: &RgbImage) -> Result<Vec<FaceEncoding>, EncodeError> {
        let faces = self
            .detector
            .detect(image)
            .map_err(|e| EncodeError::Backend(e.to_string()))?;

        let mut encodings = Vec::with_capacity(faces.len());
        for bbox in faces {
            if bbox.landmarks.is_none() {
                tracing::debug!(confidence = bbox.confidence, "skipping face without landmarks");
                continue;
            }
            let embedding = self
                .recognizer
                .extract(image, &bbox)
                .map_err(|e| EncodeError::Backend(e.to_string()))?;
            encodings.push(FaceEncoding { bbox, embedding });
        }
        Ok(encodings)
    }
}

/// Decode any format supported by the `image` crate into RGB.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, EncodeError> {
    if bytes.is_empty() {
        return Err(EncodeError::EmptyImage);
    }
    let decoded = image::load_from_memory(bytes).map_err(|e| EncodeError::InvalidImage(e.to_string()))?;
    Ok(decoded.to_rgb8())
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(&mut self, image: &[u8]) -> Result<Vec<FaceEncoding>, EncodeError> {
        let rgb = decode_rgb(image)?;
        self.encode_image(&rgb)
    }
}
