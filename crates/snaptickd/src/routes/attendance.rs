use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use snaptick_core::{reconcile, AttendanceReport, Embedding};

/// Multipart field carrying the class photo.
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct RecognizeResponse {
    pub success: bool,
    pub total_faces_detected: usize,
    pub present: Vec<String>,
    pub absent: Vec<String>,
    pub unknown: usize,
    pub timestamp: String,
}

impl From<AttendanceReport> for RecognizeResponse {
    fn from(report: AttendanceReport) -> Self {
        Self {
            success: true,
            total_faces_detected: report.total_faces_detected,
            present: report.present,
            absent: report.absent,
            unknown: report.unknown_count,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Take attendance from one uploaded photo.
pub async fn recognize(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<RecognizeResponse>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload.ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;
    if file_name.is_empty() {
        return Err(ApiError::BadRequest("No file selected".into()));
    }

    let faces = state.engine.encode(bytes.to_vec()).await?;
    tracing::info!(file = %file_name, faces = faces.len(), "found faces in uploaded image");

    let queries: Vec<Embedding> = faces.into_iter().map(|face| face.embedding).collect();
    let report = reconcile(&state.roster, &queries, state.match_threshold)?;

    tracing::info!(
        present = ?report.present,
        absent = ?report.absent,
        unknown = report.unknown_count,
        "attendance reconciled"
    );
    Ok(Json(report.into()))
}
