use super::error::ApiError;
use super::extract::JsonBody;
use super::AppState;
use crate::clinic::{AccessToken, LoginRequest, LogoutRequest, RefreshRequest, Session, SignupRequest};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

pub async fn signup(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<SignupRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = state.clinic.signup(request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.clinic.login(request).await?))
}

pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RefreshRequest>,
) -> Result<Json<AccessToken>, ApiError> {
    Ok(Json(state.clinic.refresh(request).await?))
}

/// Always 204, a body that cannot be read holds no token
pub async fn logout(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let request: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();
    state.clinic.logout(request).await?;
    Ok(StatusCode::NO_CONTENT)
}
