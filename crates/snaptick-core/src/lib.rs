//! snaptick-core — Roster encoding and attendance reconciliation.
//!
//! Matches face embeddings from one photo against a fixed roster of known
//! identities and partitions the roster into present and absent. Face
//! detection and embedding extraction stay behind the [`FaceEncoder`] trait.

pub mod attendance;
pub mod encoder;
pub mod matcher;
pub mod roster;
pub mod types;

pub use attendance::{reconcile, AttendanceReport, FaceMatch, ReconcileError};
pub use encoder::{EncodeError, FaceEncoder};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use roster::{load_manifest, DirectorySource, ImageSource, ManifestEntry, Roster, RosterError};
pub use types::{BoundingBox, Embedding, EmbeddingDefect, FaceEncoding, Identity};
