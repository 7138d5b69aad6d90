//! Token issuance policy: login, 2FA completion, refresh rotation, logout and
//! OTP delivery. Handlers translate `AuthError` into HTTP responses.

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    otp::{OtpError, OtpPurpose},
    sessions::SessionInfo,
    state::AuthState,
    tokens::TokenError,
    types::AuthenticateResponse,
    utils::{hash_password, normalize_login, verify_password},
};
use crate::{
    notify::{Channel, Notification, Template},
    store::UserRecord,
};

static DUMMY_PASSWORD_HASH: OnceCell<String> = OnceCell::const_new();

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Otp(#[from] OtpError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(AuthenticateResponse),
    /// A login code was sent (or an earlier one is still pending).
    OtpRequired { channel: Channel },
}

/// Verify credentials and either issue a token pair or start a 2FA challenge.
///
/// # Errors
/// `InvalidCredentials` for an unknown login or wrong password,
/// `Otp(DailyLimitExceeded)` when no more codes may be sent today, and
/// `Otp(Throttled)` when the cooldown blocks a send and no earlier code is usable.
pub async fn authenticate(
    state: &AuthState,
    login: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<LoginOutcome, AuthError> {
    let Some(user) = state
        .users()
        .find_by_login(&normalize_login(login))
        .await?
    else {
        // Pay the same Argon2 cost as a known account.
        let hash = dummy_password_hash().await?;
        let _ = verify_password(password.to_string(), hash.to_string()).await?;
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(password.to_string(), user.password_hash.clone()).await? {
        return Err(AuthError::InvalidCredentials);
    }

    if user.two_factor_enabled {
        let channel = match deliver_otp(state, &user, OtpPurpose::Login, now).await {
            Ok(channel) => channel,
            // Within the cooldown the earlier code stands, if it is still usable.
            Err(err @ OtpError::Throttled { .. }) => {
                if state
                    .otp()
                    .has_pending(user.id, OtpPurpose::Login, now)
                    .await
                {
                    channel_for(&user)
                } else {
                    return Err(err.into());
                }
            }
            Err(err) => return Err(err.into()),
        };
        return Ok(LoginOutcome::OtpRequired { channel });
    }

    issue_session(state, &user, now)
        .await
        .map(LoginOutcome::Authenticated)
}

/// Finish a 2FA login with the code delivered by `authenticate`.
///
/// # Errors
/// `InvalidCredentials` for unknown or non-2FA accounts, `Otp(Invalid|Expired)`
/// for a bad code.
pub async fn complete_two_factor(
    state: &AuthState,
    login: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<AuthenticateResponse, AuthError> {
    let user = state
        .users()
        .find_by_login(&normalize_login(login))
        .await?
        .filter(|user| user.two_factor_enabled)
        .ok_or(AuthError::InvalidCredentials)?;

    state
        .otp()
        .verify(user.id, OtpPurpose::Login, code, now)
        .await?;

    issue_session(state, &user, now).await
}

/// Send a fresh code for `purpose`. Unknown logins and accounts with nothing
/// to verify succeed silently.
///
/// # Errors
/// `Otp(Throttled|DailyLimitExceeded)` from the send ledger.
pub async fn resend_otp(
    state: &AuthState,
    login: &str,
    purpose: OtpPurpose,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    let Some(user) = state
        .users()
        .find_by_login(&normalize_login(login))
        .await?
    else {
        return Ok(());
    };

    let applicable = match purpose {
        OtpPurpose::Login => user.two_factor_enabled,
        OtpPurpose::Registration => !user.phone_number_confirmed,
    };
    if !applicable {
        return Ok(());
    }

    deliver_otp(state, &user, purpose, now).await?;
    Ok(())
}

/// Open a new session for `user` and sign its token pair. Sessions beyond the
/// device limit are evicted oldest first.
///
/// # Errors
/// Returns `Token` if signing fails.
pub async fn issue_session(
    state: &AuthState,
    user: &UserRecord,
    now: DateTime<Utc>,
) -> Result<AuthenticateResponse, AuthError> {
    let session_id = Uuid::new_v4();
    let tokens = state.tokens().issue_pair(user.id, session_id, now)?;

    let evicted = state
        .sessions()
        .open(
            user.id,
            SessionInfo {
                id: session_id,
                issued_at: tokens.issued_at,
                expires_at: tokens.refresh_token_expiry,
            },
            now,
            state.config().allowed_devices(),
        )
        .await;
    for session in evicted {
        info!(user_id = %user.id, session_id = %session, "session evicted by device limit");
    }

    Ok(AuthenticateResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        access_token_expiry: tokens.access_token_expiry,
        refresh_token_expiry: tokens.refresh_token_expiry,
        phone_number_confirmed: user.phone_number_confirmed,
    })
}

/// Redeem a refresh token: the presented session is replaced by a new one.
///
/// # Errors
/// `Token(Expired)` at or past expiry; `Token(Invalid)` for bad tokens and for
/// sessions that were revoked, evicted or already rotated.
pub async fn refresh_session(
    state: &AuthState,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<AuthenticateResponse, AuthError> {
    let claims = state.tokens().verify_refresh(refresh_token, now)?;
    let user_id = claims.user_id()?;
    let old_session = claims.session_id()?;

    let user = state
        .users()
        .find_by_id(user_id)
        .await?
        .ok_or(TokenError::Invalid)?;

    let session_id = Uuid::new_v4();
    let tokens = state.tokens().issue_pair(user.id, session_id, now)?;
    state
        .sessions()
        .rotate(
            user.id,
            old_session,
            SessionInfo {
                id: session_id,
                issued_at: tokens.issued_at,
                expires_at: tokens.refresh_token_expiry,
            },
            now,
        )
        .await
        .map_err(|_| TokenError::Invalid)?;

    Ok(AuthenticateResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        access_token_expiry: tokens.access_token_expiry,
        refresh_token_expiry: tokens.refresh_token_expiry,
        phone_number_confirmed: user.phone_number_confirmed,
    })
}

/// Revoke the session behind `refresh_token`. Unusable tokens are ignored.
pub async fn logout(state: &AuthState, refresh_token: &str, now: DateTime<Utc>) {
    let Ok(claims) = state.tokens().verify_refresh(refresh_token, now) else {
        return;
    };
    let (Ok(user_id), Ok(session_id)) = (claims.user_id(), claims.session_id()) else {
        return;
    };
    if state.sessions().revoke(user_id, session_id).await {
        info!(user_id = %user_id, session_id = %session_id, "session revoked");
    }
}

/// Resolve a bearer access token to its account.
///
/// # Errors
/// `Token(Invalid|Expired)` for unusable tokens or deleted accounts.
pub async fn profile(
    state: &AuthState,
    access_token: &str,
    now: DateTime<Utc>,
) -> Result<UserRecord, AuthError> {
    let claims = state.tokens().verify_access(access_token, now)?;
    let user = state
        .users()
        .find_by_id(claims.user_id()?)
        .await?
        .ok_or(TokenError::Invalid)?;
    Ok(user)
}

/// PHC hash checked against when the login is unknown, created on first use.
pub(crate) async fn dummy_password_hash() -> anyhow::Result<&'static str> {
    DUMMY_PASSWORD_HASH
        .get_or_try_init(|| hash_password(Uuid::new_v4().to_string()))
        .await
        .map(String::as_str)
}

/// SMS when the account has a phone number, email otherwise.
pub(crate) fn channel_for(user: &UserRecord) -> Channel {
    if user.phone_number.is_some() {
        Channel::Sms
    } else {
        Channel::Email
    }
}

/// Issue a code through the send ledger and hand it to the notifier.
///
/// Delivery failures are logged; the code stays valid so a resend can follow.
pub(crate) async fn deliver_otp(
    state: &AuthState,
    user: &UserRecord,
    purpose: OtpPurpose,
    now: DateTime<Utc>,
) -> Result<Channel, OtpError> {
    let code = match state.otp().issue(user.id, purpose, now).await {
        Ok(code) => code,
        Err(err) => {
            warn!(user_id = %user.id, purpose = ?purpose, "OTP send refused: {err}");
            return Err(err);
        }
    };

    let channel = channel_for(user);
    let to = match (channel, user.phone_number.as_deref()) {
        (Channel::Sms, Some(phone)) => phone.to_string(),
        _ => user.email.clone(),
    };
    let template = match purpose {
        OtpPurpose::Login => Template::LoginOtp,
        OtpPurpose::Registration => Template::RegistrationOtp,
    };
    let notification = Notification {
        channel,
        to,
        template,
        payload_json: json!({
            "code": code,
            "expires_in_seconds": state.otp().policy().code_ttl.num_seconds(),
        })
        .to_string(),
    };
    if let Err(err) = state.notifier().send(&notification) {
        error!(user_id = %user.id, "Failed to deliver OTP: {err}");
    }
    Ok(channel)
}
