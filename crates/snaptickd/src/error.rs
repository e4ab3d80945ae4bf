use crate::auth::AuthError;
use crate::engine::EngineError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use snaptick_core::ReconcileError;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Request failures, rendered as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("invalid upload: {0}")]
    Upload(#[from] MultipartError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("classification failed: {0}")]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Upload(e) => e.status(),
            ApiError::Engine(EngineError::Encode(e)) if e.is_input_error() => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Reconcile(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Auth(AuthError::EmailTaken) => StatusCode::CONFLICT,
            ApiError::Auth(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        } else {
            tracing::warn!(%status, error = %message, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
