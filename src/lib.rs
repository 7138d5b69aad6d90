//! # Studentdesk (authentication & session issuance)
//!
//! `studentdesk` is the server tier of the student management portal. It signs
//! users in, issues access/refresh token pairs, and runs the one-time password
//! (OTP) flows used for two-factor login and phone verification at signup.
//!
//! ## Tokens
//!
//! Access and refresh tokens are HS256 JWTs signed with separate secrets and
//! carrying the configured issuer and audience. Every refresh token is backed
//! by a server-side session; a user may hold at most `allowed_devices` of them
//! and the oldest session is evicted when a new login exceeds the limit.
//! Refreshing rotates the session, so a refresh token can be redeemed once.
//!
//! ## OTP throttling
//!
//! Each user has a send ledger: a send within `otp_resend_cooldown_seconds` of
//! the previous one is throttled, and no more than `max_daily_otp_attempts`
//! codes are sent per UTC day. Checks and bookkeeping happen under one lock so
//! concurrent requests cannot slip past a limit.
//!
//! ## Storage
//!
//! Users and password reset tokens live in `PostgreSQL` when a DSN is given and
//! in memory otherwise. Sessions and OTP state are always in memory.

pub mod api;
pub mod cli;
pub mod notify;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
