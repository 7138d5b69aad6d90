//! Credential login, 2FA completion and login OTP resend.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

use super::{
    otp::OtpPurpose,
    response::auth_error_response,
    service::{self, LoginOutcome},
    state::AuthState,
    types::{
        AuthenticateResponse, LoginRequest, LoginTwoFactorRequest, OtpChallengeResponse,
        ResendOtpRequest,
    },
};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthenticateResponse),
        (status = 202, description = "One-time code required", body = OtpChallengeResponse),
        (status = 400, description = "Missing payload or fields", body = String),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 429, description = "Daily OTP limit reached", body = String)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if request.login.trim().is_empty() || request.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Login and password are required".to_string(),
        )
            .into_response();
    }

    match service::authenticate(&auth_state, &request.login, &request.password, Utc::now()).await
    {
        Ok(LoginOutcome::Authenticated(response)) => {
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(LoginOutcome::OtpRequired { channel }) => (
            StatusCode::ACCEPTED,
            Json(OtpChallengeResponse {
                otp_required: true,
                channel: channel.as_str().to_string(),
                message: "A one-time code has been sent".to_string(),
            }),
        )
            .into_response(),
        Err(err) => auth_error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/auth/login-2fa",
    request_body = LoginTwoFactorRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthenticateResponse),
        (status = 400, description = "Missing payload or fields", body = String),
        (status = 401, description = "Invalid or expired code", body = String)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login_2fa(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginTwoFactorRequest>>,
) -> impl IntoResponse {
    let request: LoginTwoFactorRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if request.login.trim().is_empty() || request.code.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Login and code are required".to_string(),
        )
            .into_response();
    }

    match service::complete_two_factor(&auth_state, &request.login, &request.code, Utc::now())
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => auth_error_response(&err),
    }
}

/// Request a new login code (always 204 unless throttled, to avoid user enumeration).
#[utoipa::path(
    post,
    path = "/auth/resend-2fa-otp",
    request_body = ResendOtpRequest,
    responses(
        (status = 204, description = "Resend accepted"),
        (status = 400, description = "Missing payload", body = String),
        (status = 429, description = "Cooldown active or daily limit reached", body = String)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn resend_2fa_otp(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendOtpRequest>>,
) -> impl IntoResponse {
    let request: ResendOtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if request.login.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing login".to_string()).into_response();
    }

    match service::resend_otp(&auth_state, &request.login, OtpPurpose::Login, Utc::now()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => auth_error_response(&err),
    }
}
