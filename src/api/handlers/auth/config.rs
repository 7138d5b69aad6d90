//! Token issuance and OTP settings.

use chrono::TimeDelta;
use secrecy::{ExposeSecret, SecretString};

const DEFAULT_ACCESS_TOKEN_EXPIRATION_MINUTES: u32 = 15;
const DEFAULT_REFRESH_TOKEN_EXPIRATION_MINUTES: u32 = 7 * 24 * 60;
const DEFAULT_ISSUER: &str = "studentdesk";
const DEFAULT_AUDIENCE: &str = "studentdesk-web";
const DEFAULT_ALLOWED_DEVICES: u32 = 3;
const DEFAULT_OTP_RESEND_COOLDOWN_SECONDS: u32 = 60;
const DEFAULT_MAX_DAILY_OTP_ATTEMPTS: u32 = 5;
const DEFAULT_OTP_TTL_SECONDS: u32 = 5 * 60;
const DEFAULT_OTP_MAX_VERIFY_FAILURES: u32 = 5;
const DEFAULT_PASSWORD_RESET_TTL_MINUTES: u32 = 30;
const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:4200";

/// HS256 secrets shorter than the digest size weaken the MAC.
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{name} must be at least {min} bytes")]
    SecretTooShort { name: &'static str, min: usize },
    #[error("access and refresh token secrets must differ")]
    SharedSecret,
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error(
        "refresh token lifetime ({refresh} min) must exceed access token lifetime ({access} min)"
    )]
    RefreshNotLonger { access: u32, refresh: u32 },
}

#[derive(Clone, Debug)]
pub struct AuthenticationConfiguration {
    access_token_secret: SecretString,
    refresh_token_secret: SecretString,
    access_token_expiration_minutes: u32,
    refresh_token_expiration_minutes: u32,
    issuer: String,
    audience: String,
    allowed_devices: u32,
    otp_resend_cooldown_seconds: u32,
    max_daily_otp_attempts: u32,
    otp_ttl_seconds: u32,
    otp_max_verify_failures: u32,
    password_reset_ttl_minutes: u32,
    frontend_base_url: String,
}

impl AuthenticationConfiguration {
    #[must_use]
    pub fn new(access_token_secret: SecretString, refresh_token_secret: SecretString) -> Self {
        Self {
            access_token_secret,
            refresh_token_secret,
            access_token_expiration_minutes: DEFAULT_ACCESS_TOKEN_EXPIRATION_MINUTES,
            refresh_token_expiration_minutes: DEFAULT_REFRESH_TOKEN_EXPIRATION_MINUTES,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            allowed_devices: DEFAULT_ALLOWED_DEVICES,
            otp_resend_cooldown_seconds: DEFAULT_OTP_RESEND_COOLDOWN_SECONDS,
            max_daily_otp_attempts: DEFAULT_MAX_DAILY_OTP_ATTEMPTS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_max_verify_failures: DEFAULT_OTP_MAX_VERIFY_FAILURES,
            password_reset_ttl_minutes: DEFAULT_PASSWORD_RESET_TTL_MINUTES,
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_access_token_expiration_minutes(mut self, minutes: u32) -> Self {
        self.access_token_expiration_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_refresh_token_expiration_minutes(mut self, minutes: u32) -> Self {
        self.refresh_token_expiration_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn with_allowed_devices(mut self, devices: u32) -> Self {
        self.allowed_devices = devices;
        self
    }

    #[must_use]
    pub fn with_otp_resend_cooldown_seconds(mut self, seconds: u32) -> Self {
        self.otp_resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_daily_otp_attempts(mut self, attempts: u32) -> Self {
        self.max_daily_otp_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: u32) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_max_verify_failures(mut self, failures: u32) -> Self {
        self.otp_max_verify_failures = failures;
        self
    }

    #[must_use]
    pub fn with_password_reset_ttl_minutes(mut self, minutes: u32) -> Self {
        self.password_reset_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    /// Check the invariants the issuance policy relies on.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_secret("access token secret", &self.access_token_secret)?;
        check_secret("refresh token secret", &self.refresh_token_secret)?;
        if self.access_token_secret.expose_secret() == self.refresh_token_secret.expose_secret() {
            return Err(ConfigError::SharedSecret);
        }

        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Empty("issuer"));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::Empty("audience"));
        }

        for (name, value) in [
            (
                "access token expiration minutes",
                self.access_token_expiration_minutes,
            ),
            (
                "refresh token expiration minutes",
                self.refresh_token_expiration_minutes,
            ),
            ("allowed devices", self.allowed_devices),
            (
                "OTP resend cooldown seconds",
                self.otp_resend_cooldown_seconds,
            ),
            ("max daily OTP attempts", self.max_daily_otp_attempts),
            ("OTP TTL seconds", self.otp_ttl_seconds),
            ("OTP max verify failures", self.otp_max_verify_failures),
            (
                "password reset TTL minutes",
                self.password_reset_ttl_minutes,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive(name));
            }
        }

        if self.refresh_token_expiration_minutes <= self.access_token_expiration_minutes {
            return Err(ConfigError::RefreshNotLonger {
                access: self.access_token_expiration_minutes,
                refresh: self.refresh_token_expiration_minutes,
            });
        }

        Ok(())
    }

    pub(super) fn access_token_secret(&self) -> &SecretString {
        &self.access_token_secret
    }

    pub(super) fn refresh_token_secret(&self) -> &SecretString {
        &self.refresh_token_secret
    }

    #[must_use]
    pub fn access_token_expiration_minutes(&self) -> u32 {
        self.access_token_expiration_minutes
    }

    #[must_use]
    pub fn refresh_token_expiration_minutes(&self) -> u32 {
        self.refresh_token_expiration_minutes
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn allowed_devices(&self) -> u32 {
        self.allowed_devices
    }

    #[must_use]
    pub fn otp_resend_cooldown_seconds(&self) -> u32 {
        self.otp_resend_cooldown_seconds
    }

    #[must_use]
    pub fn max_daily_otp_attempts(&self) -> u32 {
        self.max_daily_otp_attempts
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> u32 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn otp_max_verify_failures(&self) -> u32 {
        self.otp_max_verify_failures
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn access_token_lifetime(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.access_token_expiration_minutes))
    }

    pub(crate) fn refresh_token_lifetime(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.refresh_token_expiration_minutes))
    }

    pub(crate) fn password_reset_lifetime(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.password_reset_ttl_minutes))
    }
}

fn check_secret(name: &'static str, secret: &SecretString) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.trim().is_empty() {
        return Err(ConfigError::Empty(name));
    }
    if value.len() < MIN_SECRET_BYTES {
        return Err(ConfigError::SecretTooShort {
            name,
            min: MIN_SECRET_BYTES,
        });
    }
    Ok(())
}
