//! In-memory user store for development and tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{InsertOutcome, NewUser, UserRecord};

#[derive(Debug)]
struct ResetTokenRecord {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    used: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, UserRecord>,
    reset_tokens: HashMap<Vec<u8>, ResetTokenRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub(super) async fn insert_user(&self, user: &NewUser) -> InsertOutcome {
        let mut state = self.state.lock().await;
        let taken = state
            .users
            .values()
            .any(|existing| existing.username == user.username || existing.email == user.email);
        if taken {
            return InsertOutcome::Conflict;
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            password_hash: user.password_hash.clone(),
            phone_number_confirmed: false,
            two_factor_enabled: user.two_factor_enabled,
            created_at: Utc::now(),
        };
        state.users.insert(record.id, record.clone());
        InsertOutcome::Created(record)
    }

    pub(super) async fn find_by_login(&self, login: &str) -> Option<UserRecord> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .find(|user| user.username == login || user.email == login)
            .cloned()
    }

    pub(super) async fn find_by_id(&self, user_id: Uuid) -> Option<UserRecord> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    pub(super) async fn confirm_phone_number(&self, user_id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.phone_number_confirmed = true;
                true
            }
            None => false,
        }
    }

    pub(super) async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                true
            }
            None => false,
        }
    }

    pub(super) async fn insert_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;
        state.reset_tokens.insert(
            token_hash.to_vec(),
            ResetTokenRecord {
                user_id,
                expires_at,
                used: false,
            },
        );
    }

    pub(super) async fn consume_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Option<Uuid> {
        let mut state = self.state.lock().await;
        let record = state.reset_tokens.get_mut(token_hash)?;
        if record.used || record.expires_at <= now {
            return None;
        }
        record.used = true;
        Some(record.user_id)
    }

    pub(super) async fn prune_reset_tokens(&self, now: DateTime<Utc>) -> u64 {
        let mut state = self.state.lock().await;
        let before = state.reset_tokens.len();
        state
            .reset_tokens
            .retain(|_, record| !record.used && record.expires_at > now);
        u64::try_from(before - state.reset_tokens.len()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{InsertOutcome, NewUser, UserStore};
    use anyhow::{Result, anyhow};
    use chrono::{TimeDelta, Utc};

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            phone_number: Some("+15550001111".to_string()),
            password_hash: "hash".to_string(),
            two_factor_enabled: false,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_username_or_email() -> Result<()> {
        let store = UserStore::memory();
        let created = store
            .insert_user(&new_user("alice", "alice@example.com"))
            .await?;
        assert!(matches!(created, InsertOutcome::Created(_)));

        let same_name = store
            .insert_user(&new_user("alice", "other@example.com"))
            .await?;
        assert!(matches!(same_name, InsertOutcome::Conflict));

        let same_email = store
            .insert_user(&new_user("bob", "alice@example.com"))
            .await?;
        assert!(matches!(same_email, InsertOutcome::Conflict));
        Ok(())
    }

    #[tokio::test]
    async fn find_by_login_matches_username_and_email() -> Result<()> {
        let store = UserStore::memory();
        let InsertOutcome::Created(user) = store
            .insert_user(&new_user("alice", "alice@example.com"))
            .await?
        else {
            return Err(anyhow!("expected a new user"));
        };

        let by_name = store.find_by_login("alice").await?;
        let by_email = store.find_by_login("alice@example.com").await?;
        assert_eq!(by_name.map(|u| u.id), Some(user.id));
        assert_eq!(by_email.map(|u| u.id), Some(user.id));
        assert!(store.find_by_login("mallory").await?.is_none());
        assert!(!user.phone_number_confirmed);
        Ok(())
    }

    #[tokio::test]
    async fn confirm_and_update_password() -> Result<()> {
        let store = UserStore::memory();
        let InsertOutcome::Created(user) = store
            .insert_user(&new_user("alice", "alice@example.com"))
            .await?
        else {
            return Err(anyhow!("expected a new user"));
        };

        assert!(store.confirm_phone_number(user.id).await?);
        assert!(store.update_password_hash(user.id, "new-hash").await?);
        let stored = store
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| anyhow!("user vanished"))?;
        assert!(stored.phone_number_confirmed);
        assert_eq!(stored.password_hash, "new-hash");

        assert!(!store.confirm_phone_number(uuid::Uuid::new_v4()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn reset_tokens_are_single_use_and_expire() -> Result<()> {
        let store = UserStore::memory();
        let user_id = uuid::Uuid::new_v4();
        let now = Utc::now();

        store
            .insert_reset_token(user_id, b"fresh", now + TimeDelta::minutes(30))
            .await?;
        store
            .insert_reset_token(user_id, b"stale", now - TimeDelta::seconds(1))
            .await?;

        assert_eq!(store.consume_reset_token(b"fresh", now).await?, Some(user_id));
        assert_eq!(store.consume_reset_token(b"fresh", now).await?, None);
        assert_eq!(store.consume_reset_token(b"stale", now).await?, None);
        assert_eq!(store.consume_reset_token(b"unknown", now).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn prune_drops_used_and_expired_reset_tokens() -> Result<()> {
        let store = UserStore::memory();
        let user_id = uuid::Uuid::new_v4();
        let now = Utc::now();

        store
            .insert_reset_token(user_id, b"used", now + TimeDelta::minutes(30))
            .await?;
        store
            .insert_reset_token(user_id, b"stale", now - TimeDelta::seconds(1))
            .await?;
        store
            .insert_reset_token(user_id, b"live", now + TimeDelta::minutes(30))
            .await?;
        assert_eq!(store.consume_reset_token(b"used", now).await?, Some(user_id));

        assert_eq!(store.prune_reset_tokens(now).await?, 2);
        assert_eq!(store.prune_reset_tokens(now).await?, 0);
        assert_eq!(store.consume_reset_token(b"live", now).await?, Some(user_id));
        Ok(())
    }
}
