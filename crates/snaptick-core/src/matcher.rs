//! Nearest-neighbour matching of one probe embedding against the roster.

use crate::types::{Embedding, Identity};

/// Default maximum (exclusive) Euclidean distance for a match. Encoders with a
/// different embedding scale should supply their own calibrated threshold.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Index of the nearest gallery entry, if the gallery was not empty.
    pub nearest: Option<usize>,
    /// Distance to the nearest gallery entry, if the gallery was not empty.
    pub distance: Option<f32>,
}

impl MatchResult {
    /// Gallery index of the matched identity, only when the match is accepted.
    pub fn matched_index(&self) -> Option<usize> {
        if self.matched {
            self.nearest
        } else {
            None
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of known identities.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher.
///
/// The threshold is an L2 distance and must match the scale of the encoder's
/// embeddings. Ties resolve to the earliest gallery entry.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, identity) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&identity.embedding);
            // Strict `<` keeps the first index on ties.
            if best.map_or(true, |(_, best_dist)| dist < best_dist) {
                best = Some((i, dist));
            }
        }

        match best {
            Some((idx, dist)) => MatchResult {
                matched: dist < threshold,
                nearest: Some(idx),
                distance: Some(dist),
            },
            None => MatchResult {
                matched: false,
                nearest: None,
                distance: None,
            },
        }
    }
}
