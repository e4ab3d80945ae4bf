//! snaptick-vision — Face detection and embedding for SnapTick.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both running
//! via ONNX Runtime on the CPU, and exposes them as a
//! [`FaceEncoder`](snaptick_core::FaceEncoder).

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod recognizer;

pub use detector::FaceDetector;
pub use encoder::{decode_rgb, LoadError, OnnxFaceEncoder};
pub use recognizer::{FaceRecognizer, ARCFACE_EMBEDDING_DIM, ARCFACE_MATCH_THRESHOLD, ARCFACE_MODEL_VERSION};

use std::path::PathBuf;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/snaptick/models`, falling back to `~/.local/share/snaptick/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("snaptick/models")
}
