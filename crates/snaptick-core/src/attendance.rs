//! Attendance reconciliation: match each detected face against the roster,
//! then split the roster into present and absent identities.

use crate::matcher::{EuclideanMatcher, Matcher};
use crate::roster::Roster;
use crate::types::{Embedding, EmbeddingDefect};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("face {index}: {defect}")]
    MalformedEmbedding { index: usize, defect: EmbeddingDefect },
    #[error("match threshold must be finite and positive, got {0}")]
    InvalidThreshold(f32),
}

/// Classification of one detected face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    pub query_index: usize,
    /// Matched roster label; `None` when the face is unknown.
    pub label: Option<String>,
    /// Distance to the nearest roster identity; `None` only for an empty roster.
    pub distance: Option<f32>,
}

/// Outcome of reconciling one photo against the roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceReport {
    pub total_faces_detected: usize,
    /// Matched labels, each once, in the order they were first matched.
    pub present: Vec<String>,
    /// Unmatched roster labels, in roster order.
    pub absent: Vec<String>,
    pub unknown_count: usize,
    pub matches: Vec<FaceMatch>,
}

/// Reconcile a batch of query embeddings against the roster.
///
/// Every query is validated before matching; one malformed embedding fails the
/// whole batch. Faces are matched independently, so several faces may match the
/// same identity, which is then listed once.
pub fn reconcile(
    roster: &Roster,
    queries: &[Embedding],
    threshold: f32,
) -> Result<AttendanceReport, ReconcileError> {
    reconcile_with(&EuclideanMatcher, roster, queries, threshold)
}

/// [`reconcile`] with an explicit matching strategy.
pub fn reconcile_with<M: Matcher + ?Sized>(
    matcher: &M,
    roster: &Roster,
    queries: &[Embedding],
    threshold: f32,
) -> Result<AttendanceReport, ReconcileError> {
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(ReconcileError::InvalidThreshold(threshold));
    }
    validate_queries(roster, queries)?;

    let gallery = roster.identities();
    let mut matches = Vec::with_capacity(queries.len());
    let mut present: Vec<String> = Vec::new();
    let mut matched_labels: HashSet<&str> = HashSet::new();
    let mut unknown_count = 0;

    for (query_index, query) in queries.iter().enumerate() {
        let result = matcher.compare(query, gallery, threshold);

        let label = match result.matched_index() {
            Some(idx) => {
                let label = gallery[idx].label.as_str();
                if matched_labels.insert(label) {
                    present.push(label.to_string());
                }
                tracing::debug!(query_index, label, distance = ?result.distance, "face recognized");
                Some(label.to_string())
            }
            None => {
                unknown_count += 1;
                tracing::debug!(query_index, distance = ?result.distance, "face not recognized");
                None
            }
        };

        matches.push(FaceMatch {
            query_index,
            label,
            distance: result.distance,
        });
    }

    let absent = roster
        .labels()
        .filter(|label| !matched_labels.contains(label))
        .map(str::to_string)
        .collect();

    Ok(AttendanceReport {
        total_faces_detected: queries.len(),
        present,
        absent,
        unknown_count,
        matches,
    })
}

/// Queries must share the roster's dimension, or the first query's dimension
/// when the roster is empty.
fn validate_queries(roster: &Roster, queries: &[Embedding]) -> Result<(), ReconcileError> {
    let mut expected = roster.dimension();
    for (index, query) in queries.iter().enumerate() {
        query
            .check(expected)
            .map_err(|defect| ReconcileError::MalformedEmbedding { index, defect })?;
        expected.get_or_insert(query.dimension());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::DEFAULT_MATCH_THRESHOLD;
    use crate::types::Identity;

    fn roster(entries: &[(&str, Vec<f32>)]) -> Roster {
        Roster::from_identities(
            entries
                .iter()
                .map(|(label, values)| Identity {
                    label: label.to_string(),
                    embedding: Embedding::new(values.clone()),
                })
                .collect(),
        )
        .unwrap()
    }

    fn q(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn alice_bob() -> Roster {
        roster(&[("Alice", vec![0.0, 0.0]), ("Bob", vec![3.0, 0.0])])
    }

    fn assert_partition(roster: &Roster, report: &AttendanceReport) {
        let present: HashSet<&str> = report.present.iter().map(String::as_str).collect();
        let absent: HashSet<&str> = report.absent.iter().map(String::as_str).collect();
        let all: HashSet<&str> = roster.labels().collect();
        assert!(present.is_disjoint(&absent));
        assert_eq!(present.union(&absent).copied().collect::<HashSet<_>>(), all);
    }

    #[test]
    fn test_single_close_face_is_present() {
        let roster = alice_bob();
        let report = reconcile(&roster, &[q(&[0.2, 0.0])], DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(report.total_faces_detected, 1);
        assert_eq!(report.present, vec!["Alice"]);
        assert_eq!(report.absent, vec!["Bob"]);
        assert_eq!(report.unknown_count, 0);
        assert!((report.matches[0].distance.unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_far_face_is_unknown() {
        let roster = alice_bob();
        let report = reconcile(&roster, &[q(&[0.0, 0.9])], DEFAULT_MATCH_THRESHOLD).unwrap();
        assert!(report.present.is_empty());
        assert_eq!(report.absent, vec!["Alice", "Bob"]);
        assert_eq!(report.unknown_count, 1);
        assert_eq!(report.matches[0].label, None);
        assert!((report.matches[0].distance.unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_duplicate_matches_collapse() {
        let roster = alice_bob();
        let queries = [q(&[0.1, 0.0]), q(&[0.0, 0.1]), q(&[2.9, 0.0])];
        let report = reconcile(&roster, &queries, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(report.present, vec!["Alice", "Bob"]);
        assert!(report.absent.is_empty());
        assert_eq!(report.matches[1].label.as_deref(), Some("Alice"));
        assert_partition(&roster, &report);
    }

    #[test]
    fn test_present_in_first_match_order() {
        let roster = alice_bob();
        let queries = [q(&[3.0, 0.1]), q(&[0.0, 0.0])];
        let report = reconcile(&roster, &queries, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(report.present, vec!["Bob", "Alice"]);
    }

    #[test]
    fn test_empty_roster_every_face_unknown() {
        let queries = [q(&[0.0, 0.0]), q(&[1.0, 1.0]), q(&[5.0, 5.0])];
        let report = reconcile(&Roster::empty(), &queries, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert!(report.present.is_empty());
        assert!(report.absent.is_empty());
        assert_eq!(report.unknown_count, 3);
        assert!(report.matches.iter().all(|m| m.distance.is_none()));
    }

    #[test]
    fn test_empty_query_batch_everyone_absent() {
        let roster = roster(&[
            ("Carol", vec![1.0, 1.0]),
            ("Alice", vec![0.0, 0.0]),
            ("Bob", vec![3.0, 0.0]),
        ]);
        let report = reconcile(&roster, &[], DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(report.total_faces_detected, 0);
        assert!(report.present.is_empty());
        assert_eq!(report.absent, vec!["Carol", "Alice", "Bob"]);
        assert_eq!(report.unknown_count, 0);
    }

    #[test]
    fn test_threshold_boundary() {
        let roster = roster(&[("Alice", vec![0.0, 0.0])]);

        let at = reconcile(&roster, &[q(&[0.5, 0.0])], 0.5).unwrap();
        assert_eq!(at.unknown_count, 1);
        assert_eq!(at.absent, vec!["Alice"]);

        let below = reconcile(&roster, &[q(&[0.4999, 0.0])], 0.5).unwrap();
        assert_eq!(below.present, vec!["Alice"]);
    }

    #[test]
    fn test_tie_break_is_stable() {
        let roster = roster(&[("Left", vec![-0.1, 0.0]), ("Right", vec![0.1, 0.0])]);
        for _ in 0..5 {
            let report = reconcile(&roster, &[q(&[0.0, 0.0])], DEFAULT_MATCH_THRESHOLD).unwrap();
            assert_eq!(report.present, vec!["Left"]);
            assert_eq!(report.absent, vec!["Right"]);
        }
    }

    #[test]
    fn test_partition_holds_for_mixed_batch() {
        let roster = roster(&[
            ("A", vec![0.0, 0.0]),
            ("B", vec![1.0, 0.0]),
            ("C", vec![0.0, 1.0]),
            ("D", vec![1.0, 1.0]),
        ]);
        let queries = [
            q(&[0.05, 0.0]),
            q(&[0.0, 0.95]),
            q(&[0.5, 0.5]),
            q(&[0.0, 0.02]),
            q(&[10.0, 10.0]),
        ];
        let report = reconcile(&roster, &queries, 0.3).unwrap();
        assert_eq!(report.present, vec!["A", "C"]);
        assert_eq!(report.absent, vec!["B", "D"]);
        assert_eq!(report.unknown_count, 2);
        assert_partition(&roster, &report);
    }

    #[test]
    fn test_dimension_mismatch_fails_whole_batch() {
        let roster = alice_bob();
        let queries = [q(&[0.0, 0.0]), q(&[0.0, 0.0, 0.0])];
        let err = reconcile(&roster, &queries, DEFAULT_MATCH_THRESHOLD).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::MalformedEmbedding {
                index: 1,
                defect: EmbeddingDefect::DimensionMismatch { expected: 2, actual: 3 },
            }
        );
    }

    #[test]
    fn test_non_finite_query_rejected() {
        let roster = alice_bob();
        let err = reconcile(&roster, &[q(&[f32::NAN, 0.0])], DEFAULT_MATCH_THRESHOLD).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::MalformedEmbedding { index: 0, defect: EmbeddingDefect::NonFinite }
        ));
    }

    #[test]
    fn test_empty_roster_still_checks_query_consistency() {
        let queries = [q(&[0.0, 0.0]), q(&[0.0])];
        let err = reconcile(&Roster::empty(), &queries, DEFAULT_MATCH_THRESHOLD).unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedEmbedding { index: 1, .. }));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let roster = alice_bob();
        for threshold in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                reconcile(&roster, &[], threshold),
                Err(ReconcileError::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn test_failed_reconcile_leaves_roster_usable() {
        let roster = alice_bob();
        assert!(reconcile(&roster, &[q(&[1.0])], DEFAULT_MATCH_THRESHOLD).is_err());
        let report = reconcile(&roster, &[q(&[0.0, 0.0])], DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(report.present, vec!["Alice"]);
        assert_eq!(roster.len(), 2);
    }
}
