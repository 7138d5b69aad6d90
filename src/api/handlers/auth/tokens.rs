//! Access/refresh token signing and verification (HS256 JWT).
//!
//! Both tokens carry `iss`, `aud`, `sub` (user id), `sid` (session id), `jti`,
//! `iat`, `exp` and a `typ` claim so one kind can never be replayed as the other.
//! Expiry is checked against a caller-supplied clock instead of the library's
//! so `Expired` and `Invalid` stay distinguishable and testable.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::config::AuthenticationConfiguration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub sid: String,
    pub typ: TokenKind,
}

impl Claims {
    /// # Errors
    /// Returns `TokenError::Invalid` if `sub` is not a UUID.
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Invalid)
    }

    /// # Errors
    /// Returns `TokenError::Invalid` if `sid` is not a UUID.
    pub fn session_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sid).map_err(|_| TokenError::Invalid)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("token expiry out of range")]
    OutOfRange,
    #[error("failed to encode token: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// A freshly signed token pair; expiries equal the `exp` claims.
#[derive(Clone, Debug)]
pub struct IssuedTokens {
    pub issued_at: DateTime<Utc>,
    pub access_token: String,
    pub access_token_expiry: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expiry: DateTime<Utc>,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    issuer: String,
    audience: String,
    access_lifetime: TimeDelta,
    refresh_lifetime: TimeDelta,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: &AuthenticationConfiguration) -> Self {
        Self {
            access: SigningKeys::from_secret(config.access_token_secret().expose_secret()),
            refresh: SigningKeys::from_secret(config.refresh_token_secret().expose_secret()),
            issuer: config.issuer().to_string(),
            audience: config.audience().to_string(),
            access_lifetime: config.access_token_lifetime(),
            refresh_lifetime: config.refresh_token_lifetime(),
        }
    }

    /// Sign an access/refresh pair for `session_id`.
    ///
    /// `now` is truncated to whole seconds so the returned expiries match the
    /// `exp` claims exactly.
    ///
    /// # Errors
    /// Returns an error if encoding fails or an expiry overflows.
    pub fn issue_pair(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedTokens, TokenError> {
        let issued_at = DateTime::<Utc>::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let access_token_expiry = issued_at
            .checked_add_signed(self.access_lifetime)
            .ok_or(TokenError::OutOfRange)?;
        let refresh_token_expiry = issued_at
            .checked_add_signed(self.refresh_lifetime)
            .ok_or(TokenError::OutOfRange)?;

        let access_token = self.sign(
            TokenKind::Access,
            user_id,
            session_id,
            issued_at,
            access_token_expiry,
        )?;
        let refresh_token = self.sign(
            TokenKind::Refresh,
            user_id,
            session_id,
            issued_at,
            refresh_token_expiry,
        )?;

        Ok(IssuedTokens {
            issued_at,
            access_token,
            access_token_expiry,
            refresh_token,
            refresh_token_expiry,
        })
    }

    /// # Errors
    /// `Invalid` on signature/claim mismatch, `Expired` at or past `exp`.
    pub fn verify_access(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Access, now)
    }

    /// # Errors
    /// `Invalid` on signature/claim mismatch, `Expired` at or past `exp`.
    pub fn verify_refresh(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Refresh, now)
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        session_id: Uuid,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            sid: session_id.to_string(),
            typ: kind,
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(kind).encoding,
        )?)
    }

    fn verify(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map_err(|_| TokenError::Invalid)?
            .claims;

        if claims.typ != kind {
            return Err(TokenError::Invalid);
        }
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
