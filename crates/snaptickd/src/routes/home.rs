use crate::state::AppState;
use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde_json::{json, Value};
use snaptick_core::ManifestEntry;

const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
<head><title>SnapTick</title></head>
<body>
<h1>SnapTick Face Recognition API</h1>
<p>Upload a class photo to the /recognize endpoint.</p>
<form action="/recognize" method="post" enctype="multipart/form-data">
    <input type="file" name="file" accept="image/*" required>
    <button type="submit">Recognize Faces</button>
</form>
</body>
</html>
"#;

pub async fn index() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

/// The roster manifest, as loaded at startup.
pub async fn students(State(state): State<AppState>) -> Json<Vec<ManifestEntry>> {
    Json(state.students.as_ref().clone())
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "roster_size": state.roster.len(),
        "manifest_size": state.students.len(),
        "embedding_dim": state.roster.dimension(),
        "model_version": state.roster.model_version(),
        "users": state.users.len().await,
    }))
}
