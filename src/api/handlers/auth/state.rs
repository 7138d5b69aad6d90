//! Shared auth state injected into every handler.

use std::fmt;
use std::sync::Arc;

use super::{
    config::{AuthenticationConfiguration, ConfigError},
    otp::{OtpPolicy, OtpRegistry},
    sessions::SessionRegistry,
    tokens::TokenIssuer,
};
use crate::{notify::Notifier, store::UserStore};

pub struct AuthState {
    config: AuthenticationConfiguration,
    tokens: TokenIssuer,
    sessions: SessionRegistry,
    otp: OtpRegistry,
    users: UserStore,
    notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .field("users", &self.users.backend())
            .finish_non_exhaustive()
    }
}

impl AuthState {
    /// Build the state, refusing configurations that break the issuance policy.
    ///
    /// # Errors
    /// Returns the first `ConfigError` reported by `validate()`.
    pub fn new(
        config: AuthenticationConfiguration,
        users: UserStore,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tokens: TokenIssuer::new(&config),
            sessions: SessionRegistry::default(),
            otp: OtpRegistry::new(OtpPolicy::from_config(&config)),
            config,
            users,
            notifier,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthenticationConfiguration {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    #[must_use]
    pub fn otp(&self) -> &OtpRegistry {
        &self.otp
    }

    #[must_use]
    pub fn users(&self) -> &UserStore {
        &self.users
    }

    #[must_use]
    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }
}
