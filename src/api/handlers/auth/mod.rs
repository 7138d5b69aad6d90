//! Auth handlers and the token issuance policy behind them.
//!
//! ## Tokens and sessions
//!
//! A successful login opens a session and signs an access/refresh pair for it
//! (`tokens`, `sessions`). Refreshing rotates the session: the presented
//! refresh token stops working and a new pair is issued. Each user may hold at
//! most `allowed_devices` sessions; a login past the limit evicts the session
//! issued earliest.
//!
//! ## One-time codes
//!
//! Two-factor logins and registration phone checks use 6-digit codes
//! (`otp`). All sends to a user share one ledger:
//!
//! - **Daily ceiling:** `max_daily_otp_attempts` sends per UTC day.
//! - **Cooldown:** `otp_resend_cooldown_seconds` between sends, reported to the
//!   client through `Retry-After`.

pub mod config;
pub(crate) mod login;
pub(crate) mod otp;
mod response;
pub(crate) mod service;
pub(crate) mod session;
pub(crate) mod sessions;
mod state;
pub(crate) mod tokens;
pub(crate) mod types;
pub(crate) mod utils;

pub use config::{AuthenticationConfiguration, ConfigError};
pub(crate) use response::auth_error_response;
pub use state::AuthState;
