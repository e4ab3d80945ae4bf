//! Roster of known identities, built once at startup.
//!
//! The roster is assembled from a manifest of `{name, image}` records: each
//! image is resolved through an [`ImageSource`], encoded, and its first face
//! bound to the record's name. Per-entry failures are logged and skipped, so
//! building never fails. Once built the roster is immutable.

use crate::encoder::FaceEncoder;
use crate::types::{Embedding, Identity};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot identity {label:?}: {reason}")]
    InvalidIdentity { label: String, reason: String },
}

/// One record of the roster manifest (`students.json`).
///
/// Fields other than `name` and `image` are carried through untouched so the
/// manifest can be served back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Identity label.
    pub name: String,
    /// Image reference, resolved by an [`ImageSource`].
    pub image: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Read the roster manifest. A missing file yields an empty manifest.
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>, RosterError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::error!(path = %path.display(), "roster manifest not found; starting with an empty roster");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(RosterError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if raw.trim().is_empty() {
        tracing::warn!(path = %path.display(), "roster manifest is empty");
        return Ok(Vec::new());
    }

    let entries: Vec<ManifestEntry> = serde_json::from_str(&raw).map_err(|source| RosterError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), count = entries.len(), "loaded roster manifest");
    Ok(entries)
}

/// Resolves a manifest image reference to image bytes.
pub trait ImageSource {
    fn load(&self, image_ref: &str) -> io::Result<Vec<u8>>;
}

/// Image references are file names relative to a root directory.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageSource for DirectorySource {
    fn load(&self, image_ref: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(image_ref))
    }
}

/// Ordered, immutable set of known identities.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    identities: Vec<Identity>,
    dimension: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    model_version: Option<String>,
    identities: Vec<SnapshotIdentity>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotIdentity {
    label: String,
    embedding: Vec<f32>,
}

impl Roster {
    /// A roster with no identities: every face is unknown, nobody is absent.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Encode every manifest entry, in manifest order, into a roster.
    ///
    /// Entries are skipped (with a diagnostic) when their image cannot be
    /// resolved, fails to encode, contains no face, produces a malformed
    /// embedding, or repeats an earlier label.
    pub fn build<S, E>(manifest: &[ManifestEntry], source: &S, encoder: &mut E) -> Self
    where
        S: ImageSource + ?Sized,
        E: FaceEncoder + ?Sized,
    {
        tracing::info!(entries = manifest.len(), "encoding roster faces");

        let mut identities: Vec<Identity> = Vec::with_capacity(manifest.len());
        let mut dimension: Option<usize> = None;
        let mut seen: HashSet<&str> = HashSet::new();

        for entry in manifest {
            let label = entry.name.as_str();

            if seen.contains(label) {
                tracing::warn!(label, "duplicate roster label; keeping the first entry");
                continue;
            }

            let bytes = match source.load(&entry.image) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::error!(label, image = %entry.image, error = %err, "roster image not found; skipping");
                    continue;
                }
            };

            let faces = match encoder.encode(&bytes) {
                Ok(faces) => faces,
                Err(err) => {
                    tracing::error!(label, image = %entry.image, error = %err, "failed to encode roster image; skipping");
                    continue;
                }
            };

            let face_count = faces.len();
            let Some(face) = faces.into_iter().next() else {
                tracing::warn!(label, image = %entry.image, "no face found in roster image; skipping");
                continue;
            };
            if face_count > 1 {
                tracing::warn!(label, faces = face_count, "roster image contains several faces; using the first");
            }

            if let Err(defect) = face.embedding.check(dimension) {
                tracing::error!(label, error = %defect, "roster embedding rejected; skipping");
                continue;
            }

            dimension.get_or_insert(face.embedding.dimension());
            seen.insert(label);
            identities.push(Identity {
                label: entry.name.clone(),
                embedding: face.embedding,
            });
            tracing::info!(label, "encoded roster identity");
        }

        tracing::info!(
            encoded = identities.len(),
            skipped = manifest.len() - identities.len(),
            "roster built"
        );
        if identities.is_empty() {
            tracing::warn!("roster is empty; every detected face will be reported as unknown");
        }

        Self {
            identities,
            dimension,
        }
    }

    /// Assemble a roster from already encoded identities, validating each embedding.
    pub fn from_identities(identities: Vec<Identity>) -> Result<Self, RosterError> {
        let mut dimension: Option<usize> = None;
        let mut seen = HashSet::new();

        for identity in &identities {
            identity
                .embedding
                .check(dimension)
                .map_err(|defect| RosterError::InvalidIdentity {
                    label: identity.label.clone(),
                    reason: defect.to_string(),
                })?;
            if !seen.insert(identity.label.as_str()) {
                return Err(RosterError::InvalidIdentity {
                    label: identity.label.clone(),
                    reason: "duplicate label".into(),
                });
            }
            dimension.get_or_insert(identity.embedding.dimension());
        }

        Ok(Self {
            identities,
            dimension,
        })
    }

    /// Load a roster previously written by [`save_snapshot`](Self::save_snapshot).
    pub fn load_snapshot(path: &Path) -> Result<Self, RosterError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RosterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|source| RosterError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let identities = snapshot
            .identities
            .into_iter()
            .map(|entry| Identity {
                label: entry.label,
                embedding: Embedding {
                    values: entry.embedding,
                    model_version: snapshot.model_version.clone(),
                },
            })
            .collect();

        let roster = Self::from_identities(identities)?;
        tracing::info!(
            path = %path.display(),
            identities = roster.len(),
            model_version = ?snapshot.model_version,
            "loaded roster snapshot"
        );
        Ok(roster)
    }

    /// Write the roster as a JSON snapshot.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), RosterError> {
        let snapshot = Snapshot {
            model_version: self.model_version().map(str::to_string),
            identities: self
                .identities
                .iter()
                .map(|identity| SnapshotIdentity {
                    label: identity.label.clone(),
                    embedding: identity.embedding.values.clone(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|source| RosterError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| RosterError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// Labels in roster order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(|identity| identity.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Embedding dimension shared by every identity; `None` for an empty roster.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Model version recorded on the first identity's embedding, if any.
    pub fn model_version(&self) -> Option<&str> {
        self.identities
            .first()
            .and_then(|identity| identity.embedding.model_version.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodeError;
    use crate::types::{BoundingBox, FaceEncoding};
    use std::collections::HashMap;

    /// Maps image bytes (as UTF-8 keys) to canned encoder output.
    struct FakeEncoder {
        faces: HashMap<String, Result<Vec<Vec<f32>>, String>>,
    }

    impl FaceEncoder for FakeEncoder {
        fn encode(&mut self, image: &[u8]) -> Result<Vec<FaceEncoding>, EncodeError> {
            let key = String::from_utf8_lossy(image).to_string();
            match self.faces.get(&key) {
                Some(Ok(vectors)) => Ok(vectors
                    .iter()
                    .map(|v| FaceEncoding {
                        bbox: BoundingBox {
                            x: 0.0,
                            y: 0.0,
                            width: 10.0,
                            height: 10.0,
                            confidence: 0.9,
                            landmarks: None,
                        },
                        embedding: Embedding::new(v.clone()),
                    })
                    .collect()),
                Some(Err(msg)) => Err(EncodeError::Backend(msg.clone())),
                None => Err(EncodeError::InvalidImage(key)),
            }
        }
    }

    /// Image bytes are the image reference itself, unless listed as missing.
    struct FakeSource {
        missing: Vec<&'static str>,
    }

    impl ImageSource for FakeSource {
        fn load(&self, image_ref: &str) -> io::Result<Vec<u8>> {
            if self.missing.contains(&image_ref) {
                Err(io::Error::new(io::ErrorKind::NotFound, image_ref.to_string()))
            } else {
                Ok(image_ref.as_bytes().to_vec())
            }
        }
    }

    fn entry(name: &str, image: &str) -> ManifestEntry {
        ManifestEntry {
            name: name.into(),
            image: image.into(),
            extra: serde_json::Map::new(),
        }
    }

    fn encoder(faces: &[(&str, Result<Vec<Vec<f32>>, String>)]) -> FakeEncoder {
        FakeEncoder {
            faces: faces
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_build_preserves_manifest_order() {
        let manifest = vec![entry("Carol", "c.jpg"), entry("Alice", "a.jpg"), entry("Bob", "b.jpg")];
        let mut enc = encoder(&[
            ("a.jpg", Ok(vec![vec![1.0, 0.0]])),
            ("b.jpg", Ok(vec![vec![0.0, 1.0]])),
            ("c.jpg", Ok(vec![vec![1.0, 1.0]])),
        ]);
        let roster = Roster::build(&manifest, &FakeSource { missing: vec![] }, &mut enc);
        assert_eq!(roster.labels().collect::<Vec<_>>(), vec!["Carol", "Alice", "Bob"]);
        assert_eq!(roster.dimension(), Some(2));
    }

    #[test]
    fn test_build_skips_failed_entries() {
        let manifest = vec![
            entry("Missing", "missing.jpg"),
            entry("Faceless", "empty.jpg"),
            entry("Broken", "broken.jpg"),
            entry("Alice", "a.jpg"),
            entry("Drift", "drift.jpg"),
            entry("Nan", "nan.jpg"),
        ];
        let mut enc = encoder(&[
            ("empty.jpg", Ok(vec![])),
            ("broken.jpg", Err("inference failed".into())),
            ("a.jpg", Ok(vec![vec![1.0, 0.0]])),
            ("drift.jpg", Ok(vec![vec![1.0, 0.0, 0.0]])),
            ("nan.jpg", Ok(vec![vec![f32::NAN, 0.0]])),
        ]);
        let source = FakeSource {
            missing: vec!["missing.jpg"],
        };
        let roster = Roster::build(&manifest, &source, &mut enc);
        assert_eq!(roster.labels().collect::<Vec<_>>(), vec!["Alice"]);
    }

    #[test]
    fn test_build_takes_first_face() {
        let manifest = vec![entry("Group", "group.jpg")];
        let mut enc = encoder(&[("group.jpg", Ok(vec![vec![0.1, 0.2], vec![0.9, 0.9]]))]);
        let roster = Roster::build(&manifest, &FakeSource { missing: vec![] }, &mut enc);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.identities()[0].embedding.values, vec![0.1, 0.2]);
    }

    #[test]
    fn test_build_keeps_first_of_duplicate_labels() {
        let manifest = vec![entry("Alice", "a1.jpg"), entry("Alice", "a2.jpg")];
        let mut enc = encoder(&[
            ("a1.jpg", Ok(vec![vec![1.0, 0.0]])),
            ("a2.jpg", Ok(vec![vec![0.0, 1.0]])),
        ]);
        let roster = Roster::build(&manifest, &FakeSource { missing: vec![] }, &mut enc);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.identities()[0].embedding.values, vec![1.0, 0.0]);
    }

    #[test]
    fn test_build_empty_manifest() {
        let mut enc = encoder(&[]);
        let roster = Roster::build(&[], &FakeSource { missing: vec![] }, &mut enc);
        assert!(roster.is_empty());
        assert_eq!(roster.dimension(), None);
    }

    #[test]
    fn test_load_manifest_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = load_manifest(&dir.path().join("students.json")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_load_manifest_keeps_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");
        std::fs::write(
            &path,
            r#"[{"name":"Alice","image":"alice.jpg","roll_no":"21CS001"}]"#,
        )
        .unwrap();

        let entries = load_manifest(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Alice");
        assert_eq!(entries[0].extra["roll_no"], "21CS001");

        let echoed = serde_json::to_value(&entries).unwrap();
        assert_eq!(echoed[0]["roll_no"], "21CS001");
        assert_eq!(echoed[0]["image"], "alice.jpg");
    }

    #[test]
    fn test_load_manifest_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");
        std::fs::write(&path, "[{\"name\":").unwrap();
        assert!(matches!(load_manifest(&path), Err(RosterError::Json { .. })));
    }

    #[test]
    fn test_directory_source_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alice.jpg"), b"jpeg").unwrap();
        let source = DirectorySource::new(dir.path());
        assert_eq!(source.load("alice.jpg").unwrap(), b"jpeg");
        assert!(source.load("bob.jpg").is_err());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        let roster = Roster::from_identities(vec![
            Identity {
                label: "Alice".into(),
                embedding: Embedding {
                    values: vec![0.5, -0.5],
                    model_version: Some("w600k_r50".into()),
                },
            },
            Identity {
                label: "Bob".into(),
                embedding: Embedding {
                    values: vec![0.25, 0.75],
                    model_version: Some("w600k_r50".into()),
                },
            },
        ])
        .unwrap();

        roster.save_snapshot(&path).unwrap();
        let loaded = Roster::load_snapshot(&path).unwrap();

        assert_eq!(loaded.labels().collect::<Vec<_>>(), vec!["Alice", "Bob"]);
        assert_eq!(loaded.identities()[1].embedding.values, vec![0.25, 0.75]);
        assert_eq!(loaded.model_version(), Some("w600k_r50"));
        assert_eq!(loaded.dimension(), Some(2));
    }

    #[test]
    fn test_snapshot_rejects_mixed_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(
            &path,
            r#"{"model_version":null,"identities":[
                {"label":"Alice","embedding":[0.1,0.2]},
                {"label":"Bob","embedding":[0.1,0.2,0.3]}
            ]}"#,
        )
        .unwrap();

        match Roster::load_snapshot(&path) {
            Err(RosterError::InvalidIdentity { label, .. }) => assert_eq!(label, "Bob"),
            other => panic!("expected InvalidIdentity, got {other:?}"),
        }
    }

    #[test]
    fn test_from_identities_rejects_duplicate_labels() {
        let dup = |v: Vec<f32>| Identity {
            label: "Alice".into(),
            embedding: Embedding::new(v),
        };
        let result = Roster::from_identities(vec![dup(vec![1.0]), dup(vec![2.0])]);
        assert!(matches!(result, Err(RosterError::InvalidIdentity { .. })));
    }
}
