//! User directory and password reset token storage.
//!
//! Two backends share one interface: `PostgreSQL` for deployments and an
//! in-memory map for DSN-less development runs and tests. Callers pass
//! already-normalized logins (trimmed, lowercase).

mod memory;
mod postgres;

pub use memory::MemoryStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Account as stored; the password hash is a PHC string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub phone_number_confirmed: bool,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied at registration.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub two_factor_enabled: bool,
}

#[derive(Debug)]
pub enum InsertOutcome {
    Created(UserRecord),
    /// Username or email already taken.
    Conflict,
}

#[derive(Debug)]
pub enum UserStore {
    Postgres(PgPool),
    Memory(MemoryStore),
}

impl UserStore {
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::default())
    }

    /// Backend name reported by `/health`.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgresql",
            Self::Memory(_) => "memory",
        }
    }

    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn ping(&self) -> Result<()> {
        match self {
            Self::Postgres(pool) => postgres::ping(pool).await,
            Self::Memory(_) => Ok(()),
        }
    }

    /// # Errors
    /// Returns an error on storage failure; conflicts are reported as `InsertOutcome::Conflict`.
    pub async fn insert_user(&self, user: &NewUser) -> Result<InsertOutcome> {
        match self {
            Self::Postgres(pool) => postgres::insert_user(pool, user).await,
            Self::Memory(store) => Ok(store.insert_user(user).await),
        }
    }

    /// Look up by username or email.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn find_by_login(&self, login: &str) -> Result<Option<UserRecord>> {
        match self {
            Self::Postgres(pool) => postgres::find_by_login(pool, login).await,
            Self::Memory(store) => Ok(store.find_by_login(login).await),
        }
    }

    /// # Errors
    /// Returns an error on storage failure.
    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        match self {
            Self::Postgres(pool) => postgres::find_by_id(pool, user_id).await,
            Self::Memory(store) => Ok(store.find_by_id(user_id).await),
        }
    }

    /// Returns `false` when the user does not exist.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn confirm_phone_number(&self, user_id: Uuid) -> Result<bool> {
        match self {
            Self::Postgres(pool) => postgres::confirm_phone_number(pool, user_id).await,
            Self::Memory(store) => Ok(store.confirm_phone_number(user_id).await),
        }
    }

    /// Returns `false` when the user does not exist.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<bool> {
        match self {
            Self::Postgres(pool) => {
                postgres::update_password_hash(pool, user_id, password_hash).await
            }
            Self::Memory(store) => Ok(store.update_password_hash(user_id, password_hash).await),
        }
    }

    /// # Errors
    /// Returns an error on storage failure.
    pub async fn insert_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        match self {
            Self::Postgres(pool) => {
                postgres::insert_reset_token(pool, user_id, token_hash, expires_at).await
            }
            Self::Memory(store) => {
                store
                    .insert_reset_token(user_id, token_hash, expires_at)
                    .await;
                Ok(())
            }
        }
    }

    /// Mark a reset token used and return its owner. Expired, used, or unknown
    /// tokens yield `None`.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn consume_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        match self {
            Self::Postgres(pool) => postgres::consume_reset_token(pool, token_hash, now).await,
            Self::Memory(store) => Ok(store.consume_reset_token(token_hash, now).await),
        }
    }

    /// Delete reset tokens that were used or have expired. Returns how many
    /// were removed.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn prune_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        match self {
            Self::Postgres(pool) => postgres::prune_reset_tokens(pool, now).await,
            Self::Memory(store) => Ok(store.prune_reset_tokens(now).await),
        }
    }
}
