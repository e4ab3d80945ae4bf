use snaptick_vision::ARCFACE_MATCH_THRESHOLD;
use std::path::PathBuf;

const DEFAULT_MAX_UPLOAD_MB: usize = 16;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:5000).
    pub bind_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Roster manifest (`students.json`).
    pub manifest_path: PathBuf,
    /// Directory that manifest image references are resolved against.
    pub images_dir: PathBuf,
    /// Pre-encoded roster; when set, roster images are not encoded at startup.
    pub roster_snapshot: Option<PathBuf>,
    /// Maximum (exclusive) Euclidean distance for a positive match.
    pub match_threshold: f32,
    /// Upper bound on a request body, in bytes.
    pub max_upload_bytes: usize,
    /// HS256 secret for access tokens; a random one is generated when unset.
    pub jwt_secret: Option<String>,
    /// Lifetime of issued access tokens.
    pub token_ttl_hours: i64,
}

impl Config {
    /// Load configuration from `SNAPTICK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()));

        let mut match_threshold = parse_or(&lookup, "SNAPTICK_MATCH_THRESHOLD", ARCFACE_MATCH_THRESHOLD);
        if !match_threshold.is_finite() || match_threshold <= 0.0 {
            tracing::warn!(
                value = match_threshold,
                default = ARCFACE_MATCH_THRESHOLD,
                "SNAPTICK_MATCH_THRESHOLD must be positive; using default"
            );
            match_threshold = ARCFACE_MATCH_THRESHOLD;
        }

        let upload_mb = parse_or(&lookup, "SNAPTICK_MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB);
        let max_upload_bytes = upload_mb.checked_mul(1024 * 1024).unwrap_or_else(|| {
            tracing::warn!(
                value = upload_mb,
                default = DEFAULT_MAX_UPLOAD_MB,
                "SNAPTICK_MAX_UPLOAD_MB is too large; using default"
            );
            DEFAULT_MAX_UPLOAD_MB * 1024 * 1024
        });

        Self {
            bind_addr: lookup("SNAPTICK_BIND").unwrap_or_else(|| "0.0.0.0:5000".to_string()),
            model_dir: lookup("SNAPTICK_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(snaptick_vision::default_model_dir),
            manifest_path: path("SNAPTICK_MANIFEST", "students.json"),
            images_dir: path("SNAPTICK_IMAGES_DIR", "images"),
            roster_snapshot: lookup("SNAPTICK_ROSTER_SNAPSHOT")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            match_threshold,
            max_upload_bytes,
            jwt_secret: lookup("SNAPTICK_JWT_SECRET").filter(|v| !v.is_empty()),
            token_ttl_hours: parse_or(&lookup, "SNAPTICK_TOKEN_TTL_HOURS", 24),
        }
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
