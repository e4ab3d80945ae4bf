use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector. Every embedding in one process shares the same dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// True when the vector is non-empty and every component is finite.
    pub fn is_finite(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| v.is_finite())
    }

    /// Check that the embedding can take part in distance computations,
    /// optionally against an already established dimension.
    pub fn check(&self, expected_dimension: Option<usize>) -> Result<(), EmbeddingDefect> {
        if self.values.is_empty() {
            return Err(EmbeddingDefect::Empty);
        }
        if let Some(expected) = expected_dimension {
            if self.values.len() != expected {
                return Err(EmbeddingDefect::DimensionMismatch {
                    expected,
                    actual: self.values.len(),
                });
            }
        }
        if !self.is_finite() {
            return Err(EmbeddingDefect::NonFinite);
        }
        Ok(())
    }

    /// Euclidean (L2) distance between two embeddings of equal dimension.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Reason an embedding cannot be compared.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingDefect {
    #[error("embedding is empty")]
    Empty,
    #[error("expected {expected}-dim embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding contains non-finite values")]
    NonFinite,
}

/// One face returned by a [`FaceEncoder`](crate::FaceEncoder): where it is and what it looks like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceEncoding {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// A known identity: roster label bound to its single reference embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub label: String,
    pub embedding: Embedding,
}
