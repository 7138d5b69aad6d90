//! Server-side session registry backing refresh tokens.
//!
//! Each valid refresh token maps to one `SessionInfo`. The registry enforces
//! the per-user device limit and refresh rotation; both are check-then-update
//! sequences done under a single lock.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Vec<SessionInfo>>>,
}

impl SessionRegistry {
    /// Register a new session and return the ids evicted to stay within
    /// `allowed_devices`, oldest first.
    pub async fn open(
        &self,
        user_id: Uuid,
        session: SessionInfo,
        now: DateTime<Utc>,
        allowed_devices: u32,
    ) -> Vec<Uuid> {
        let mut guard = self.sessions.lock().await;
        let entries = guard.entry(user_id).or_default();
        prune(entries, now);
        entries.push(session);
        evict_oldest(entries, allowed_devices)
    }

    /// Replace `old` with `replacement`. Fails if `old` is not active, so a
    /// refresh token can only be redeemed once.
    ///
    /// # Errors
    /// Returns `SessionError::NotFound` if `old` was revoked, evicted, rotated or expired.
    pub async fn rotate(
        &self,
        user_id: Uuid,
        old: Uuid,
        replacement: SessionInfo,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let mut guard = self.sessions.lock().await;
        let entries = guard.get_mut(&user_id).ok_or(SessionError::NotFound)?;
        prune(entries, now);
        let position = entries
            .iter()
            .position(|session| session.id == old)
            .ok_or(SessionError::NotFound)?;
        entries.remove(position);
        entries.push(replacement);
        Ok(())
    }

    #[cfg(test)]
    pub async fn is_active(&self, user_id: Uuid, session_id: Uuid, now: DateTime<Utc>) -> bool {
        let guard = self.sessions.lock().await;
        guard.get(&user_id).is_some_and(|entries| {
            entries
                .iter()
                .any(|session| session.id == session_id && session.expires_at > now)
        })
    }

    /// Returns whether a session was removed.
    pub async fn revoke(&self, user_id: Uuid, session_id: Uuid) -> bool {
        let mut guard = self.sessions.lock().await;
        let Some(entries) = guard.get_mut(&user_id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|session| session.id != session_id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            guard.remove(&user_id);
        }
        removed
    }

    /// Returns how many sessions were removed.
    pub async fn revoke_all(&self, user_id: Uuid) -> usize {
        let mut guard = self.sessions.lock().await;
        guard.remove(&user_id).map_or(0, |entries| entries.len())
    }

    /// Drop expired sessions and users left without any. Returns how many
    /// sessions were removed.
    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.sessions.lock().await;
        let mut removed = 0;
        guard.retain(|_, entries| {
            let before = entries.len();
            prune(entries, now);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }

    #[cfg(test)]
    pub async fn tracked_users(&self) -> usize {
        self.sessions.lock().await.len()
    }

    #[cfg(test)]
    pub async fn active_sessions(&self, user_id: Uuid, now: DateTime<Utc>) -> Vec<SessionInfo> {
        let mut guard = self.sessions.lock().await;
        let Some(entries) = guard.get_mut(&user_id) else {
            return Vec::new();
        };
        prune(entries, now);
        entries.clone()
    }
}

fn prune(entries: &mut Vec<SessionInfo>, now: DateTime<Utc>) {
    entries.retain(|session| session.expires_at > now);
}

fn evict_oldest(entries: &mut Vec<SessionInfo>, allowed_devices: u32) -> Vec<Uuid> {
    let limit = usize::try_from(allowed_devices).unwrap_or(usize::MAX);
    let mut evicted = Vec::new();
    while entries.len() > limit {
        let Some(oldest) = entries
            .iter()
            .enumerate()
            .min_by_key(|(_, session)| session.issued_at)
            .map(|(index, _)| index)
        else {
            break;
        };
        evicted.push(entries.remove(oldest).id);
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn start() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default()
    }

    fn session(issued_at: DateTime<Utc>) -> SessionInfo {
        SessionInfo {
            id: Uuid::new_v4(),
            issued_at,
            expires_at: issued_at + TimeDelta::days(7),
        }
    }

    #[tokio::test]
    async fn exceeding_allowed_devices_evicts_oldest() {
        let registry = SessionRegistry::default();
        let user = Uuid::new_v4();
        let first = session(start());
        let second = session(start() + TimeDelta::minutes(1));
        let third = session(start() + TimeDelta::minutes(2));

        assert!(registry.open(user, first, start(), 2).await.is_empty());
        assert!(registry.open(user, second, start(), 2).await.is_empty());
        let evicted = registry
            .open(user, third, start() + TimeDelta::minutes(2), 2)
            .await;

        assert_eq!(evicted, vec![first.id]);
        let now = start() + TimeDelta::minutes(3);
        assert!(!registry.is_active(user, first.id, now).await);
        assert!(registry.is_active(user, second.id, now).await);
        assert!(registry.is_active(user, third.id, now).await);
    }

    #[tokio::test]
    async fn limits_are_per_user() {
        let registry = SessionRegistry::default();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        registry.open(alice, session(start()), start(), 1).await;
        let evicted = registry.open(bob, session(start()), start(), 1).await;
        assert!(evicted.is_empty());
        assert_eq!(registry.active_sessions(alice, start()).await.len(), 1);
        assert_eq!(registry.active_sessions(bob, start()).await.len(), 1);
    }

    #[tokio::test]
    async fn expired_sessions_do_not_count_toward_limit() {
        let registry = SessionRegistry::default();
        let user = Uuid::new_v4();
        let short = SessionInfo {
            id: Uuid::new_v4(),
            issued_at: start(),
            expires_at: start() + TimeDelta::minutes(5),
        };
        registry.open(user, short, start(), 1).await;

        let later = start() + TimeDelta::minutes(10);
        let evicted = registry.open(user, session(later), later, 1).await;
        assert!(evicted.is_empty());
    }

    #[tokio::test]
    async fn rotation_redeems_once() {
        let registry = SessionRegistry::default();
        let user = Uuid::new_v4();
        let original = session(start());
        registry.open(user, original, start(), 3).await;

        let now = start() + TimeDelta::minutes(20);
        let replacement = session(now);
        assert_eq!(
            registry.rotate(user, original.id, replacement, now).await,
            Ok(())
        );
        assert_eq!(
            registry.rotate(user, original.id, session(now), now).await,
            Err(SessionError::NotFound)
        );
        assert!(registry.is_active(user, replacement.id, now).await);
    }

    #[tokio::test]
    async fn rotated_session_counts_as_newly_issued() {
        let registry = SessionRegistry::default();
        let user = Uuid::new_v4();
        let first = session(start());
        let second = session(start() + TimeDelta::minutes(1));
        registry.open(user, first, start(), 2).await;
        registry.open(user, second, start(), 2).await;

        let now = start() + TimeDelta::minutes(5);
        let rotated = session(now);
        assert!(registry.rotate(user, first.id, rotated, now).await.is_ok());

        let third = session(now + TimeDelta::minutes(1));
        let evicted = registry.open(user, third, now, 2).await;
        assert_eq!(evicted, vec![second.id]);
    }

    #[tokio::test]
    async fn prune_removes_expired_sessions_and_idle_users() {
        let registry = SessionRegistry::default();
        let idle = Uuid::new_v4();
        let busy = Uuid::new_v4();
        let short = SessionInfo {
            id: Uuid::new_v4(),
            issued_at: start(),
            expires_at: start() + TimeDelta::minutes(5),
        };
        let long = session(start());
        registry.open(idle, short, start(), 3).await;
        registry.open(busy, short, start(), 3).await;
        registry.open(busy, long, start(), 3).await;

        let later = start() + TimeDelta::minutes(5);
        assert_eq!(registry.prune(later).await, 2);
        assert_eq!(registry.prune(later).await, 0);
        assert!(registry.is_active(busy, long.id, later).await);
        assert_eq!(registry.tracked_users().await, 1);
        assert_eq!(registry.revoke_all(idle).await, 0);
        assert_eq!(registry.revoke_all(busy).await, 1);
    }

    #[tokio::test]
    async fn revoke_and_revoke_all() {
        let registry = SessionRegistry::default();
        let user = Uuid::new_v4();
        let first = session(start());
        let second = session(start());
        registry.open(user, first, start(), 5).await;
        registry.open(user, second, start(), 5).await;

        assert!(registry.revoke(user, first.id).await);
        assert!(!registry.revoke(user, first.id).await);
        assert_eq!(registry.revoke_all(user).await, 1);
        assert!(!registry.is_active(user, second.id, start()).await);
        assert_eq!(registry.revoke_all(user).await, 0);
    }
}
