//! Small helpers for credential validation, password hashing and reset tokens.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

const MIN_PASSWORD_CHARS: usize = 8;
const MAX_PASSWORD_CHARS: usize = 128;

/// Normalize a username or email for lookup/uniqueness checks.
pub(crate) fn normalize_login(login: &str) -> String {
    login.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub(crate) fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").is_ok_and(|regex| regex.is_match(username))
}

pub(crate) fn valid_phone(phone: &str) -> bool {
    Regex::new(r"^\+[0-9]{8,15}$").is_ok_and(|regex| regex.is_match(phone))
}

pub(crate) fn valid_password(password: &str) -> bool {
    let chars = password.chars().count();
    (MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&chars)
}

/// Hash a password into a PHC string (Argon2id, random salt).
///
/// Runs on the blocking pool; Argon2 is deliberately slow.
pub(crate) async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| anyhow!("failed to hash password"))
    })
    .await
    .context("password hashing task failed")?
}

/// Check a password against a stored PHC string. A malformed hash never matches.
pub(crate) async fn verify_password(password: String, stored_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&stored_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .context("password verification task failed")
}

/// Create a password reset token for email links.
///
/// Returned token is only sent to the user; the store keeps a hash.
pub(crate) fn generate_reset_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate reset token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

pub(crate) fn hash_reset_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    hasher.finalize().to_vec()
}

/// Build the frontend reset link included in outbound emails.
pub(crate) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/account/reset-password#token={token}")
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn normalize_login_trims_and_lowercases() {
        assert_eq!(normalize_login(" Alice@Example.COM "), "alice@example.com");
        assert_eq!(normalize_login("Jane.Doe"), "jane.doe");
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn username_rules() {
        assert!(valid_username("jane.doe"));
        assert!(valid_username("s_01-x"));
        assert!(!valid_username("ab"));
        assert!(!valid_username("has space"));
        assert!(!valid_username("jane@school"));
        assert!(!valid_username(&"x".repeat(33)));
    }

    #[test]
    fn phone_rules() {
        assert!(valid_phone("+15550001111"));
        assert!(!valid_phone("15550001111"));
        assert!(!valid_phone("+1234"));
        assert!(!valid_phone("+1555-000-1111"));
    }

    #[test]
    fn password_length_bounds() {
        assert!(!valid_password("short"));
        assert!(valid_password("long enough"));
        assert!(valid_password(&"p".repeat(128)));
        assert!(!valid_password(&"p".repeat(129)));
    }

    #[tokio::test]
    async fn password_hash_round_trip() -> Result<()> {
        let hash = hash_password("correct horse".to_string()).await?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse".to_string(), hash.clone()).await?);
        assert!(!verify_password("wrong horse".to_string(), hash).await?);
        assert!(!verify_password("x".to_string(), "not-a-phc".to_string()).await?);
        Ok(())
    }

    #[test]
    fn reset_token_has_32_random_bytes() {
        let decoded_len = generate_reset_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn hash_reset_token_stable() {
        assert_eq!(hash_reset_token("token"), hash_reset_token("token"));
        assert_ne!(hash_reset_token("token"), hash_reset_token("other"));
    }

    #[test]
    fn build_reset_url_trims_trailing_slash() {
        let url = build_reset_url("https://portal.school.test/", "abc");
        assert_eq!(url, "https://portal.school.test/account/reset-password#token=abc");
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
