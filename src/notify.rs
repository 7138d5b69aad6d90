//! Outbound notification delivery (OTP codes, password reset links).
//!
//! Auth flows build a `Notification` and hand it to a `Notifier`. The default
//! `LogNotifier` only logs; an SMS gateway or mail relay implements the same
//! trait.

use anyhow::Result;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Sms,
    Email,
}

impl Channel {
    /// Wire name used in API responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Template {
    LoginOtp,
    RegistrationOtp,
    PasswordReset,
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub channel: Channel,
    pub to: String,
    pub template: Template,
    pub payload_json: String,
}

/// Delivery abstraction used by the auth handlers.
pub trait Notifier: Send + Sync {
    /// Deliver a message or return an error so the caller can log it.
    fn send(&self, notification: &Notification) -> Result<()>;
}

/// Local dev notifier that logs the payload instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            channel = ?notification.channel,
            to = %notification.to,
            template = ?notification.template,
            payload = %notification.payload_json,
            "notification send stub"
        );
        Ok(())
    }
}
