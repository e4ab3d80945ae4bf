use crate::auth::{self as accounts, Claims, User};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.is_empty())
}

pub async fn signup(
    State(state): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let (Some(name), Some(email), Some(password), Some(role)) = (
        required(req.name),
        required(req.email),
        required(req.password),
        required(req.role),
    ) else {
        return Err(ApiError::BadRequest("Missing fields".into()));
    };

    let password_hash = tokio::task::spawn_blocking(move || accounts::hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("hashing task failed: {e}")))??;

    state
        .users
        .register(User {
            name,
            email,
            password_hash,
            role,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "msg": "Signup successful" }))))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let unauthorized = || ApiError::Unauthorized(INVALID_CREDENTIALS.into());

    let email = req.email.unwrap_or_default();
    let password = req.password.unwrap_or_default();
    let user = state.users.find(&email).await.ok_or_else(unauthorized)?;

    let hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || accounts::verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("verification task failed: {e}")))?;
    if !valid {
        return Err(unauthorized());
    }

    let access_token = state.tokens.issue(&user)?;
    tracing::info!(email = %user.email, "login succeeded");
    Ok(Json(json!({ "access_token": access_token })))
}

/// Claims of the bearer token presented with the request.
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Claims>> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;

    let claims = state
        .tokens
        .verify(token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;
    Ok(Json(claims))
}
