//! Mapping from auth failures to HTTP responses.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use super::{otp::OtpError, service::AuthError, tokens::TokenError};

/// Status and client-facing message for an auth failure. Internal detail is
/// logged here and never returned.
pub(crate) fn auth_error_status(err: &AuthError) -> (StatusCode, String) {
    match err {
        AuthError::InvalidCredentials => {
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
        }
        AuthError::Token(TokenError::Expired) => {
            (StatusCode::UNAUTHORIZED, "Token expired".to_string())
        }
        AuthError::Token(TokenError::Invalid) => {
            (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
        }
        AuthError::Token(err @ (TokenError::OutOfRange | TokenError::Encoding(_))) => {
            error!("Failed to issue tokens: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication failed".to_string(),
            )
        }
        AuthError::Otp(OtpError::Throttled { .. }) => (
            StatusCode::TOO_MANY_REQUESTS,
            "OTP recently sent, try again later".to_string(),
        ),
        AuthError::Otp(OtpError::DailyLimitExceeded) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Daily OTP limit reached".to_string(),
        ),
        AuthError::Otp(OtpError::Invalid) => (StatusCode::UNAUTHORIZED, "Invalid code".to_string()),
        AuthError::Otp(OtpError::Expired) => (StatusCode::UNAUTHORIZED, "Code expired".to_string()),
        AuthError::Internal(err) => {
            error!("Auth request failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication failed".to_string(),
            )
        }
    }
}

/// Full response for an auth failure; throttled OTP sends carry `Retry-After`.
pub(crate) fn auth_error_response(err: &AuthError) -> Response {
    let (status, message) = auth_error_status(err);
    let mut response = (status, message).into_response();
    if let AuthError::Otp(OtpError::Throttled {
        retry_after_seconds,
    }) = err
    {
        if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_are_unauthorized() {
        let (status, message) = auth_error_status(&AuthError::Token(TokenError::Expired));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, "Token expired");

        let (status, message) = auth_error_status(&AuthError::Token(TokenError::Invalid));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, "Invalid token");
    }

    #[test]
    fn throttled_sets_retry_after() {
        let response = auth_error_response(&AuthError::Otp(OtpError::Throttled {
            retry_after_seconds: 42,
        }));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
            Some("42")
        );
    }

    #[test]
    fn daily_limit_has_no_retry_after() {
        let response = auth_error_response(&AuthError::Otp(OtpError::DailyLimitExceeded));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }

    #[test]
    fn internal_detail_is_not_returned() {
        let err = AuthError::Internal(anyhow::anyhow!("connection refused to 10.0.0.5"));
        let (status, message) = auth_error_status(&err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("10.0.0.5"));
    }
}
