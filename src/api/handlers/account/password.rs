//! Password reset via emailed single-use links.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::types::{ForgetPasswordRequest, ResetPasswordRequest};
use crate::api::handlers::auth::{
    utils::{
        build_reset_url, generate_reset_token, hash_password, hash_reset_token, normalize_login,
        valid_email, valid_password,
    },
    AuthState,
};
use crate::notify::{Channel, Notification, Template};

/// Send a reset link to a known email (always 204 to avoid user enumeration).
#[utoipa::path(
    post,
    path = "/Account/ForgetPassword",
    request_body = ForgetPasswordRequest,
    responses(
        (status = 204, description = "Reset link sent if the email is registered"),
        (status = 400, description = "Missing payload or invalid email", body = String)
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn forget_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ForgetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_login(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    if let Err(err) = send_reset_link(&auth_state, &email).await {
        error!("Failed to issue password reset: {err:#}");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn send_reset_link(auth_state: &AuthState, email: &str) -> anyhow::Result<()> {
    let Some(user) = auth_state
        .users()
        .find_by_login(email)
        .await?
        .filter(|user| user.email == email)
    else {
        return Ok(());
    };

    let token = generate_reset_token()?;
    let expires_at = Utc::now() + auth_state.config().password_reset_lifetime();
    auth_state
        .users()
        .insert_reset_token(user.id, &hash_reset_token(&token), expires_at)
        .await?;

    let reset_url = build_reset_url(auth_state.config().frontend_base_url(), &token);
    auth_state.notifier().send(&Notification {
        channel: Channel::Email,
        to: user.email.clone(),
        template: Template::PasswordReset,
        payload_json: json!({
            "reset_url": reset_url,
            "expires_at": expires_at.to_rfc3339(),
        })
        .to_string(),
    })?;
    info!(user_id = %user.id, "password reset link sent");
    Ok(())
}

#[utoipa::path(
    post,
    path = "/Account/ResetPassword",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password replaced, all sessions revoked"),
        (status = 400, description = "Missing payload, weak password, invalid or expired token", body = String)
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }
    // Checked before the token is consumed so a rejected password keeps the link usable.
    if !valid_password(&request.new_password) {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be 8-128 characters".to_string(),
        )
            .into_response();
    }

    let password_hash = match hash_password(request.new_password).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password reset failed".to_string(),
            )
                .into_response();
        }
    };

    let user_id = match auth_state
        .users()
        .consume_reset_token(&hash_reset_token(token), Utc::now())
        .await
    {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            return (StatusCode::BAD_REQUEST, "Invalid or expired token".to_string())
                .into_response();
        }
        Err(err) => {
            error!("Failed to consume reset token: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password reset failed".to_string(),
            )
                .into_response();
        }
    };

    match auth_state
        .users()
        .update_password_hash(user_id, &password_hash)
        .await
    {
        Ok(true) => {
            let revoked = auth_state.sessions().revoke_all(user_id).await;
            info!(user_id = %user_id, revoked, "password reset, sessions revoked");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => (StatusCode::BAD_REQUEST, "Invalid or expired token".to_string())
            .into_response(),
        Err(err) => {
            error!("Failed to update password: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password reset failed".to_string(),
            )
                .into_response()
        }
    }
}
