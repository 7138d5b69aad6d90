//! One-time password issuance, throttling and verification.
//!
//! Every send to a user goes through that user's `SendLedger`, whatever the
//! purpose: the daily ceiling is checked first, then the resend cooldown. Codes
//! are kept only as salted SHA-256 hashes.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::config::AuthenticationConfiguration;

const OTP_DIGITS_RANGE: u32 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OtpPurpose {
    Login,
    Registration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    #[error("OTP resend throttled, retry in {retry_after_seconds}s")]
    Throttled { retry_after_seconds: u64 },
    #[error("daily OTP limit reached")]
    DailyLimitExceeded,
    #[error("invalid OTP code")]
    Invalid,
    #[error("OTP code expired")]
    Expired,
}

#[derive(Clone, Copy, Debug)]
pub struct OtpPolicy {
    pub resend_cooldown: TimeDelta,
    pub max_daily_sends: u32,
    pub code_ttl: TimeDelta,
    pub max_verify_failures: u32,
}

impl OtpPolicy {
    #[must_use]
    pub fn from_config(config: &AuthenticationConfiguration) -> Self {
        Self {
            resend_cooldown: TimeDelta::seconds(i64::from(config.otp_resend_cooldown_seconds())),
            max_daily_sends: config.max_daily_otp_attempts(),
            code_ttl: TimeDelta::seconds(i64::from(config.otp_ttl_seconds())),
            max_verify_failures: config.otp_max_verify_failures(),
        }
    }
}

/// Per-user send bookkeeping for one UTC day.
#[derive(Clone, Copy, Debug)]
struct SendLedger {
    day: NaiveDate,
    sends_today: u32,
    last_sent_at: Option<DateTime<Utc>>,
}

impl SendLedger {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            day: now.date_naive(),
            sends_today: 0,
            last_sent_at: None,
        }
    }

    fn check_and_record(&mut self, now: DateTime<Utc>, policy: &OtpPolicy) -> Result<(), OtpError> {
        let today = now.date_naive();
        if today != self.day {
            self.day = today;
            self.sends_today = 0;
        }

        if self.sends_today >= policy.max_daily_sends {
            return Err(OtpError::DailyLimitExceeded);
        }

        if let Some(last) = self.last_sent_at {
            let elapsed = now.signed_duration_since(last);
            if elapsed < policy.resend_cooldown {
                return Err(OtpError::Throttled {
                    retry_after_seconds: retry_after(policy.resend_cooldown - elapsed, policy),
                });
            }
        }

        self.sends_today += 1;
        self.last_sent_at = Some(now);
        Ok(())
    }
}

/// Remaining cooldown rounded up to whole seconds, capped at the cooldown.
fn retry_after(remaining: TimeDelta, policy: &OtpPolicy) -> u64 {
    let millis = remaining.num_milliseconds().max(0);
    let seconds = (millis + 999) / 1000;
    let capped = seconds.min(policy.resend_cooldown.num_seconds()).max(1);
    u64::try_from(capped).unwrap_or(1)
}

#[derive(Clone, Debug)]
struct PendingCode {
    code_hash: [u8; 32],
    expires_at: DateTime<Utc>,
    failures: u32,
}

#[derive(Debug, Default)]
struct OtpState {
    ledgers: HashMap<Uuid, SendLedger>,
    codes: HashMap<(Uuid, OtpPurpose), PendingCode>,
}

#[derive(Debug)]
pub struct OtpRegistry {
    policy: OtpPolicy,
    state: Mutex<OtpState>,
}

impl OtpRegistry {
    #[must_use]
    pub fn new(policy: OtpPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(OtpState::default()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Record a send for `user_id` and return a fresh code for `purpose`,
    /// replacing any pending one.
    ///
    /// # Errors
    /// `DailyLimitExceeded` or `Throttled` when the send is not allowed; the
    /// previously issued code is kept in that case.
    pub async fn issue(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<String, OtpError> {
        let mut state = self.state.lock().await;
        state
            .ledgers
            .entry(user_id)
            .or_insert_with(|| SendLedger::new(now))
            .check_and_record(now, &self.policy)?;

        let code = generate_code();
        state.codes.insert(
            (user_id, purpose),
            PendingCode {
                code_hash: hash_code(user_id, &code),
                expires_at: now + self.policy.code_ttl,
                failures: 0,
            },
        );
        Ok(code)
    }

    /// Check `code` against the pending code; a match consumes it.
    ///
    /// # Errors
    /// `Invalid` for a missing or wrong code, `Expired` past the code's TTL.
    pub async fn verify(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), OtpError> {
        let mut state = self.state.lock().await;
        let key = (user_id, purpose);
        let Some(pending) = state.codes.get_mut(&key) else {
            return Err(OtpError::Invalid);
        };

        if now >= pending.expires_at {
            state.codes.remove(&key);
            return Err(OtpError::Expired);
        }

        if pending.code_hash != hash_code(user_id, code.trim()) {
            pending.failures += 1;
            if pending.failures >= self.policy.max_verify_failures {
                state.codes.remove(&key);
            }
            return Err(OtpError::Invalid);
        }

        state.codes.remove(&key);
        Ok(())
    }

    /// Whether an unexpired code for `purpose` is waiting to be verified.
    pub async fn has_pending(&self, user_id: Uuid, purpose: OtpPurpose, now: DateTime<Utc>) -> bool {
        let state = self.state.lock().await;
        state
            .codes
            .get(&(user_id, purpose))
            .is_some_and(|pending| pending.expires_at > now)
    }

    /// Drop expired codes and ledgers that neither count toward today's
    /// ceiling nor hold an active cooldown.
    pub async fn prune(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let today = now.date_naive();
        let cooldown = self.policy.resend_cooldown;
        state.ledgers.retain(|_, ledger| {
            ledger.day == today
                || ledger
                    .last_sent_at
                    .is_some_and(|last| now.signed_duration_since(last) < cooldown)
        });
        state.codes.retain(|_, pending| pending.expires_at > now);
    }
}

fn generate_code() -> String {
    let value = OsRng.gen_range(0..OTP_DIGITS_RANGE);
    format!("{value:06}")
}

fn hash_code(user_id: Uuid, code: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(code.as_bytes());
    hasher.finalize().into()
}
