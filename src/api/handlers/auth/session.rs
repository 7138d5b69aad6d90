//! Refresh rotation, logout and bearer profile endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

use super::{
    response::auth_error_response,
    service,
    state::AuthState,
    types::{AuthenticateResponse, LogoutRequest, ProfileResponse, RefreshRequest},
    utils::extract_bearer_token,
};

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = AuthenticateResponse),
        (status = 400, description = "Missing payload", body = String),
        (status = 401, description = "Refresh token expired or invalid", body = String)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let request: RefreshRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.refresh_token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing refresh token".to_string()).into_response();
    }

    match service::refresh_session(&auth_state, token, Utc::now()).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => auth_error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Session revoked"),
        (status = 400, description = "Missing payload", body = String)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let request: LogoutRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    service::logout(&auth_state, request.refresh_token.trim(), Utc::now()).await;
    StatusCode::NO_CONTENT.into_response()
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Profile of the bearer", body = ProfileResponse),
        (status = 401, description = "Missing, expired or invalid access token", body = String)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn me(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()).into_response();
    };

    match service::profile(&auth_state, &token, Utc::now()).await {
        Ok(user) => (
            StatusCode::OK,
            Json(ProfileResponse {
                user_id: user.id.to_string(),
                username: user.username,
                email: user.email,
                phone_number: user.phone_number,
                phone_number_confirmed: user.phone_number_confirmed,
                two_factor_enabled: user.two_factor_enabled,
            }),
        )
            .into_response(),
        Err(err) => auth_error_response(&err),
    }
}
