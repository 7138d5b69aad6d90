//! Account module tests.

use super::{
    password::{forget_password, reset_password},
    register::{register, resend_otp, verify_otp},
    types::{
        ForgetPasswordRequest, RegisterRequest, ResendRegistrationOtpRequest,
        ResetPasswordRequest, VerifyOtpRequest,
    },
};
use crate::api::handlers::auth::{
    otp::OtpError,
    service::{self, AuthError, LoginOutcome},
    tests::{body_json, body_text, seed_user, test_config, test_state, PASSWORD},
    AuthState,
};
use crate::notify::{Channel, Template};
use anyhow::{Context, Result};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, response::Response, Json};
use chrono::{TimeDelta, Utc};
use serde_json::Value;
use std::sync::Arc;

fn register_request(username: &str, phone: Option<&str>) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: format!("{username}@school.test"),
        password: PASSWORD.to_string(),
        phone_number: phone.map(str::to_string),
        enable_two_factor: false,
    }
}

async fn do_register(state: &Arc<AuthState>, request: RegisterRequest) -> Response {
    register(Extension(state.clone()), Some(Json(request)))
        .await
        .into_response()
}

async fn do_verify(state: &Arc<AuthState>, login: &str, code: &str) -> Response {
    verify_otp(
        Extension(state.clone()),
        Some(Json(VerifyOtpRequest {
            login: login.to_string(),
            code: code.to_string(),
        })),
    )
    .await
    .into_response()
}

async fn do_resend(state: &Arc<AuthState>, login: &str) -> Response {
    resend_otp(
        Extension(state.clone()),
        Some(Json(ResendRegistrationOtpRequest {
            login: login.to_string(),
        })),
    )
    .await
    .into_response()
}

async fn do_forget(state: &Arc<AuthState>, email: &str) -> Response {
    forget_password(
        Extension(state.clone()),
        Some(Json(ForgetPasswordRequest {
            email: email.to_string(),
        })),
    )
    .await
    .into_response()
}

async fn do_reset(state: &Arc<AuthState>, token: &str, new_password: &str) -> Response {
    reset_password(
        Extension(state.clone()),
        Some(Json(ResetPasswordRequest {
            token: token.to_string(),
            new_password: new_password.to_string(),
        })),
    )
    .await
    .into_response()
}

fn reset_token_from(payload: &Value) -> Result<String> {
    let url = payload
        .get("reset_url")
        .and_then(Value::as_str)
        .context("reset_url in payload")?;
    url.split_once("#token=")
        .map(|(_, token)| token.to_string())
        .context("token fragment in reset_url")
}

#[tokio::test]
async fn register_then_verify_confirms_phone() -> Result<()> {
    let (state, notifier) = test_state(test_config())?;

    let response = do_register(&state, register_request("Jane", Some("+15550001111"))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await?;
    assert_eq!(
        body.get("otpChannel").and_then(Value::as_str),
        Some("sms")
    );

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, Channel::Sms);
    assert_eq!(sent[0].template, Template::RegistrationOtp);
    let code = notifier.last_code().context("registration code")?;

    let user = state
        .users()
        .find_by_login("jane")
        .await?
        .context("registered user")?;
    assert!(!user.phone_number_confirmed);

    assert_eq!(
        do_verify(&state, "jane", &code).await.status(),
        StatusCode::NO_CONTENT
    );
    let user = state
        .users()
        .find_by_login("jane@school.test")
        .await?
        .context("registered user")?;
    assert!(user.phone_number_confirmed);

    // Login now reports the confirmed phone.
    match service::authenticate(&state, "jane", PASSWORD, Utc::now()).await? {
        LoginOutcome::Authenticated(response) => assert!(response.phone_number_confirmed),
        LoginOutcome::OtpRequired { .. } => anyhow::bail!("two-factor was not enabled"),
    }
    Ok(())
}

#[tokio::test]
async fn register_with_two_factor_requires_code_at_login() -> Result<()> {
    let (state, _) = test_state(test_config())?;
    let mut request = register_request("sam", None);
    request.enable_two_factor = true;
    assert_eq!(
        do_register(&state, request).await.status(),
        StatusCode::CREATED
    );

    // The registration send holds the cooldown and no login code exists yet.
    let now = Utc::now();
    let outcome = service::authenticate(&state, "sam", PASSWORD, now).await;
    assert!(matches!(
        outcome,
        Err(AuthError::Otp(OtpError::Throttled { .. }))
    ));

    let outcome =
        service::authenticate(&state, "sam", PASSWORD, now + TimeDelta::seconds(60)).await;
    assert!(matches!(
        outcome,
        Ok(LoginOutcome::OtpRequired {
            channel: Channel::Email
        })
    ));
    Ok(())
}

#[tokio::test]
async fn duplicate_username_or_email_conflicts() -> Result<()> {
    let (state, _) = test_state(test_config())?;
    assert_eq!(
        do_register(&state, register_request("jane", None))
            .await
            .status(),
        StatusCode::CREATED
    );

    let same_username = RegisterRequest {
        email: "other@school.test".to_string(),
        ..register_request("JANE", None)
    };
    assert_eq!(
        do_register(&state, same_username).await.status(),
        StatusCode::CONFLICT
    );

    let same_email = RegisterRequest {
        email: "Jane@School.test".to_string(),
        ..register_request("janet", None)
    };
    assert_eq!(
        do_register(&state, same_email).await.status(),
        StatusCode::CONFLICT
    );
    Ok(())
}

#[tokio::test]
async fn register_rejects_invalid_input() -> Result<()> {
    let (state, notifier) = test_state(test_config())?;

    let response = register(Extension(state.clone()), None)
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let weak = RegisterRequest {
        password: "short".to_string(),
        ..register_request("jane", None)
    };
    let response = do_register(&state, weak).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_text(response).await?,
        "Password must be 8-128 characters"
    );

    let bad_phone = register_request("jane", Some("5550001111"));
    assert_eq!(
        do_register(&state, bad_phone).await.status(),
        StatusCode::BAD_REQUEST
    );
    assert!(notifier.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn verify_rejects_wrong_code_and_unknown_user() -> Result<()> {
    let (state, notifier) = test_state(test_config())?;
    do_register(&state, register_request("jane", Some("+15550001111"))).await;
    let code = notifier.last_code().context("registration code")?;
    let wrong = if code == "123456" { "654321" } else { "123456" };

    let response = do_verify(&state, "jane", wrong).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await?, "Invalid code");

    assert_eq!(
        do_verify(&state, "ghost", &code).await.status(),
        StatusCode::BAD_REQUEST
    );
    Ok(())
}

#[tokio::test]
async fn resend_registration_code_is_throttled() -> Result<()> {
    let (state, notifier) = test_state(test_config())?;
    do_register(&state, register_request("jane", Some("+15550001111"))).await;

    let response = do_resend(&state, "jane").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(notifier.sent().len(), 1);

    assert_eq!(
        do_resend(&state, "ghost").await.status(),
        StatusCode::NO_CONTENT
    );
    Ok(())
}

#[tokio::test]
async fn resend_for_confirmed_account_sends_nothing() -> Result<()> {
    let (state, notifier) = test_state(test_config())?;
    let user = seed_user(&state, "jane", Some("+15550001111"), false).await?;
    state.users().confirm_phone_number(user.id).await?;

    assert_eq!(
        do_resend(&state, "jane").await.status(),
        StatusCode::NO_CONTENT
    );
    assert!(notifier.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn password_reset_flow_revokes_sessions() -> Result<()> {
    let (state, notifier) = test_state(test_config())?;
    let user = seed_user(&state, "jane", Some("+15550001111"), false).await?;
    let session = service::issue_session(&state, &user, Utc::now()).await?;

    assert_eq!(
        do_forget(&state, "Jane@School.test").await.status(),
        StatusCode::NO_CONTENT
    );
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, Channel::Email);
    assert_eq!(sent[0].to, "jane@school.test");
    assert_eq!(sent[0].template, Template::PasswordReset);

    let payload = notifier.last_payload().context("reset payload")?;
    let url = payload
        .get("reset_url")
        .and_then(Value::as_str)
        .context("reset_url")?;
    assert!(url.starts_with("https://portal.school.test/account/reset-password#token="));
    let token = reset_token_from(&payload)?;

    // A rejected password does not burn the link.
    assert_eq!(
        do_reset(&state, &token, "short").await.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        do_reset(&state, &token, "a brand new passphrase").await.status(),
        StatusCode::NO_CONTENT
    );

    assert!(matches!(
        service::refresh_session(&state, &session.refresh_token, Utc::now()).await,
        Err(AuthError::Token(_))
    ));
    assert!(matches!(
        service::authenticate(&state, "jane", PASSWORD, Utc::now()).await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        service::authenticate(&state, "jane", "a brand new passphrase", Utc::now()).await,
        Ok(LoginOutcome::Authenticated(_))
    ));

    // Links are single use.
    let response = do_reset(&state, &token, "yet another passphrase").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await?, "Invalid or expired token");
    Ok(())
}

#[tokio::test]
async fn forget_password_hides_unknown_emails() -> Result<()> {
    let (state, notifier) = test_state(test_config())?;
    seed_user(&state, "jane", None, false).await?;

    assert_eq!(
        do_forget(&state, "ghost@school.test").await.status(),
        StatusCode::NO_CONTENT
    );
    // Usernames are not accepted in place of an email.
    assert_eq!(
        do_forget(&state, "jane").await.status(),
        StatusCode::BAD_REQUEST
    );
    assert!(notifier.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn reset_with_unknown_token_is_rejected() -> Result<()> {
    let (state, _) = test_state(test_config())?;
    assert_eq!(
        do_reset(&state, "not-a-token", "a brand new passphrase")
            .await
            .status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        do_reset(&state, "  ", "a brand new passphrase")
            .await
            .status(),
        StatusCode::BAD_REQUEST
    );
    Ok(())
}
