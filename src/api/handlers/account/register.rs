//! Account registration and registration code verification.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::types::{
    RegisterRequest, RegisterResponse, ResendRegistrationOtpRequest, VerifyOtpRequest,
};
use crate::api::handlers::auth::{
    auth_error_response,
    otp::{OtpError, OtpPurpose},
    service::{channel_for, deliver_otp, resend_otp as resend_purpose_otp},
    utils::{
        hash_password, normalize_login, valid_email, valid_password, valid_phone, valid_username,
    },
    AuthState,
};
use crate::store::{InsertOutcome, NewUser};

/// Validated registration input, normalized for storage.
#[derive(Debug, PartialEq, Eq)]
struct Registration {
    username: String,
    email: String,
    phone_number: Option<String>,
}

fn validate_registration(request: &RegisterRequest) -> Result<Registration, String> {
    let username = request.username.trim();
    if !valid_username(username) {
        return Err(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'".to_string(),
        );
    }

    let email = normalize_login(&request.email);
    if !valid_email(&email) {
        return Err("Invalid email".to_string());
    }

    if !valid_password(&request.password) {
        return Err("Password must be 8-128 characters".to_string());
    }

    let phone_number = request
        .phone_number
        .as_deref()
        .map(str::trim)
        .filter(|phone| !phone.is_empty());
    if let Some(phone) = phone_number {
        if !valid_phone(phone) {
            return Err("Phone number must be '+' followed by 8-15 digits".to_string());
        }
    }

    Ok(Registration {
        username: normalize_login(username),
        email,
        phone_number: phone_number.map(str::to_string),
    })
}

#[utoipa::path(
    post,
    path = "/Account/Register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification code sent", body = RegisterResponse),
        (status = 400, description = "Missing payload or invalid fields", body = String),
        (status = 409, description = "Username or email already registered", body = String)
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let registration = match validate_registration(&request) {
        Ok(registration) => registration,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    let password_hash = match hash_password(request.password).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    };

    let new_user = NewUser {
        username: registration.username,
        email: registration.email,
        phone_number: registration.phone_number,
        password_hash,
        two_factor_enabled: request.enable_two_factor,
    };

    let user = match auth_state.users().insert_user(&new_user).await {
        Ok(InsertOutcome::Created(user)) => user,
        Ok(InsertOutcome::Conflict) => {
            return (
                StatusCode::CONFLICT,
                "Username or email already registered".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to insert user: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    };
    info!(user_id = %user.id, "account registered");

    // The account exists either way; ResendOTP can follow a refused send.
    let channel = match deliver_otp(&auth_state, &user, OtpPurpose::Registration, Utc::now()).await
    {
        Ok(channel) => channel,
        Err(err) => {
            warn!(user_id = %user.id, "Registration code not sent: {err}");
            channel_for(&user)
        }
    };

    (
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id.to_string(),
            otp_channel: channel.as_str().to_string(),
            message: "Account created, verification code sent".to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/Account/VerifyOTP",
    request_body = VerifyOtpRequest,
    responses(
        (status = 204, description = "Phone number confirmed"),
        (status = 400, description = "Missing payload, invalid or expired code", body = String)
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn verify_otp(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let request: VerifyOtpRequest = match payload {
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

    let user = match auth_state
        .users()
        .find_by_login(&normalize_login(&request.login))
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => return (StatusCode::BAD_REQUEST, "Invalid code".to_string()).into_response(),
        Err(err) => {
            error!("Failed to lookup user: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    };

    match auth_state
        .otp()
        .verify(user.id, OtpPurpose::Registration, &request.code, Utc::now())
        .await
    {
        Ok(()) => {}
        Err(OtpError::Expired) => {
            return (StatusCode::BAD_REQUEST, "Code expired".to_string()).into_response();
        }
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid code".to_string()).into_response(),
    }

    match auth_state.users().confirm_phone_number(user.id).await {
        Ok(_) => {
            info!(user_id = %user.id, "phone number confirmed");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!("Failed to confirm phone number: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Resend the registration code (204 for unknown or already confirmed accounts).
#[utoipa::path(
    post,
    path = "/Account/ResendOTP",
    request_body = ResendRegistrationOtpRequest,
    responses(
        (status = 204, description = "Resend accepted"),
        (status = 400, description = "Missing payload", body = String),
        (status = 429, description = "Cooldown active or daily limit reached", body = String)
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn resend_otp(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendRegistrationOtpRequest>>,
) -> impl IntoResponse {
    let request: ResendRegistrationOtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if request.login.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing login".to_string()).into_response();
    }

    match resend_purpose_otp(
        &auth_state,
        &request.login,
        OtpPurpose::Registration,
        Utc::now(),
    )
    .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => auth_error_response(&err),
    }
}
