//! Token issuance, OTP and password reset settings.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::handlers::auth::AuthenticationConfiguration;

pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_ACCESS_TOKEN_EXPIRATION_MINUTES: &str = "access-token-expiration-minutes";
pub const ARG_REFRESH_TOKEN_EXPIRATION_MINUTES: &str = "refresh-token-expiration-minutes";
pub const ARG_ISSUER: &str = "issuer";
pub const ARG_AUDIENCE: &str = "audience";
pub const ARG_ALLOWED_DEVICES: &str = "allowed-devices";
pub const ARG_OTP_RESEND_COOLDOWN_SECONDS: &str = "otp-resend-cooldown-seconds";
pub const ARG_MAX_DAILY_OTP_ATTEMPTS: &str = "max-daily-otp-attempts";
pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_OTP_MAX_VERIFY_FAILURES: &str = "otp-max-verify-failures";
pub const ARG_PASSWORD_RESET_TTL_MINUTES: &str = "password-reset-ttl-minutes";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_otp_args(command);
    with_account_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("HS256 secret for access tokens (at least 32 bytes)")
                .env("STUDENTDESK_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("HS256 secret for refresh tokens (at least 32 bytes, distinct)")
                .env("STUDENTDESK_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_EXPIRATION_MINUTES)
                .long(ARG_ACCESS_TOKEN_EXPIRATION_MINUTES)
                .help("Access token lifetime in minutes")
                .env("STUDENTDESK_ACCESS_TOKEN_EXPIRATION_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_EXPIRATION_MINUTES)
                .long(ARG_REFRESH_TOKEN_EXPIRATION_MINUTES)
                .help("Refresh token lifetime in minutes")
                .env("STUDENTDESK_REFRESH_TOKEN_EXPIRATION_MINUTES")
                .default_value("10080")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ISSUER)
                .long(ARG_ISSUER)
                .help("Token issuer (iss claim)")
                .env("STUDENTDESK_ISSUER")
                .default_value("studentdesk"),
        )
        .arg(
            Arg::new(ARG_AUDIENCE)
                .long(ARG_AUDIENCE)
                .help("Token audience (aud claim)")
                .env("STUDENTDESK_AUDIENCE")
                .default_value("studentdesk-web"),
        )
        .arg(
            Arg::new(ARG_ALLOWED_DEVICES)
                .long(ARG_ALLOWED_DEVICES)
                .help("Maximum concurrent sessions per user")
                .env("STUDENTDESK_ALLOWED_DEVICES")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
}

fn with_otp_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_RESEND_COOLDOWN_SECONDS)
                .long(ARG_OTP_RESEND_COOLDOWN_SECONDS)
                .help("Minimum seconds between OTP sends to one user")
                .env("STUDENTDESK_OTP_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_MAX_DAILY_OTP_ATTEMPTS)
                .long(ARG_MAX_DAILY_OTP_ATTEMPTS)
                .help("Maximum OTP sends per user per UTC day")
                .env("STUDENTDESK_MAX_DAILY_OTP_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("OTP code lifetime in seconds")
                .env("STUDENTDESK_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_OTP_MAX_VERIFY_FAILURES)
                .long(ARG_OTP_MAX_VERIFY_FAILURES)
                .help("Wrong guesses before a pending OTP code is discarded")
                .env("STUDENTDESK_OTP_MAX_VERIFY_FAILURES")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
}

fn with_account_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PASSWORD_RESET_TTL_MINUTES)
                .long(ARG_PASSWORD_RESET_TTL_MINUTES)
                .help("Password reset link lifetime in minutes")
                .env("STUDENTDESK_PASSWORD_RESET_TTL_MINUTES")
                .default_value("30")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for CORS and reset links")
                .env("STUDENTDESK_FRONTEND_BASE_URL")
                .default_value("http://localhost:4200"),
        )
}

fn required_string(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{name}"))
}

fn required_u32(matches: &ArgMatches, name: &str) -> Result<u32> {
    matches
        .get_one::<u32>(name)
        .copied()
        .with_context(|| format!("missing required argument: --{name}"))
}

/// Build the configuration from parsed arguments. Validation happens when
/// the auth state is created.
///
/// # Errors
/// Returns an error if a required argument is missing.
pub fn configuration(matches: &ArgMatches) -> Result<AuthenticationConfiguration> {
    let access_secret = SecretString::from(required_string(matches, ARG_ACCESS_TOKEN_SECRET)?);
    let refresh_secret = SecretString::from(required_string(matches, ARG_REFRESH_TOKEN_SECRET)?);

    Ok(
        AuthenticationConfiguration::new(access_secret, refresh_secret)
            .with_access_token_expiration_minutes(required_u32(
                matches,
                ARG_ACCESS_TOKEN_EXPIRATION_MINUTES,
            )?)
            .with_refresh_token_expiration_minutes(required_u32(
                matches,
                ARG_REFRESH_TOKEN_EXPIRATION_MINUTES,
            )?)
            .with_issuer(required_string(matches, ARG_ISSUER)?)
            .with_audience(required_string(matches, ARG_AUDIENCE)?)
            .with_allowed_devices(required_u32(matches, ARG_ALLOWED_DEVICES)?)
            .with_otp_resend_cooldown_seconds(required_u32(
                matches,
                ARG_OTP_RESEND_COOLDOWN_SECONDS,
            )?)
            .with_max_daily_otp_attempts(required_u32(matches, ARG_MAX_DAILY_OTP_ATTEMPTS)?)
            .with_otp_ttl_seconds(required_u32(matches, ARG_OTP_TTL_SECONDS)?)
            .with_otp_max_verify_failures(required_u32(matches, ARG_OTP_MAX_VERIFY_FAILURES)?)
            .with_password_reset_ttl_minutes(required_u32(
                matches,
                ARG_PASSWORD_RESET_TTL_MINUTES,
            )?)
            .with_frontend_base_url(required_string(matches, ARG_FRONTEND_BASE_URL)?),
    )
}
