//! Seam to the external face embedding capability.

use crate::types::FaceEncoding;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("image is empty")]
    EmptyImage,
    #[error("image could not be decoded: {0}")]
    InvalidImage(String),
    #[error("encoder backend failed: {0}")]
    Backend(String),
}

impl EncodeError {
    /// Whether the failure was caused by the supplied image rather than the encoder itself.
    pub fn is_input_error(&self) -> bool {
        matches!(self, EncodeError::EmptyImage | EncodeError::InvalidImage(_))
    }
}

/// Turns encoded image bytes into zero or more faces.
///
/// Faces are returned in the encoder's own order; callers that need a single
/// face take the first one. Implementations must produce embeddings of the same
/// dimension for every call.
pub trait FaceEncoder {
    fn encode(&mut self, image: &[u8]) -> Result<Vec<FaceEncoding>, EncodeError>;
}

impl<E: FaceEncoder + ?Sized> FaceEncoder for Box<E> {
    fn encode(&mut self, image: &[u8]) -> Result<Vec<FaceEncoding>, EncodeError> {
        (**self).encode(image)
    }
}
