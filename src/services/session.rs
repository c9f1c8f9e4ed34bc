// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session storage.
//!
//! Layout per session:
//! - `session:{id}` holds the record
//! - `session-access:{token}` and `session-refresh:{token}` hold the id
//! - `session-user:{user_id}` is the set of the user's session ids
//!
//! Deleting removes the record before the index keys, so from the moment the
//! record is gone neither token resolves, even if an index key lingers.

use crate::db::{keys, StorageBackend, StoreError};
use crate::models::Session;
use chrono::Utc;
use std::time::Duration;

#[derive(Clone)]
pub struct SessionManager {
    store: StorageBackend,
}

fn record_key(id: &str) -> String {
    format!("{}{}", keys::SESSION, id)
}

fn access_key(token: &str) -> String {
    format!("{}{}", keys::SESSION_ACCESS, token)
}

fn refresh_key(token: &str) -> String {
    format!("{}{}", keys::SESSION_REFRESH, token)
}

fn user_key(user_id: &str) -> String {
    format!("{}{}", keys::SESSION_USER, user_id)
}

impl SessionManager {
    pub fn new(store: StorageBackend) -> Self {
        Self { store }
    }

    /// Store the record and both token indexes, all expiring with the
    /// session's refresh expiry.
    pub async fn create(&self, session: &Session) -> Result<(), StoreError> {
        let ttl = (session.refresh_expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_millis(1));

        let served = self
            .store
            .set_json(&record_key(&session.id), session, Some(ttl))
            .await?;
        self.store
            .set(&access_key(&session.access_token), &session.id, Some(ttl))
            .await?;
        self.store
            .set(&refresh_key(&session.refresh_token), &session.id, Some(ttl))
            .await?;
        self.store
            .add_member(&user_key(&session.user_id), &session.id, ttl)
            .await?;

        tracing::debug!(
            session_id = %session.id,
            user_id = %session.user_id,
            fallback = served.is_fallback(),
            "Session created"
        );
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.store.get_json(&record_key(id)).await?.into_inner())
    }

    /// Follow an index key to its record, ignoring expiry.
    async fn resolve(&self, index_key: &str) -> Result<Option<Session>, StoreError> {
        match self.store.get(index_key).await?.into_inner() {
            Some(id) => self.load(&id).await,
            None => Ok(None),
        }
    }

    async fn resolve_live(&self, index_key: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .resolve(index_key)
            .await?
            .filter(|session| !session.is_expired(Utc::now())))
    }

    pub async fn get_by_access_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        self.resolve_live(&access_key(token)).await
    }

    pub async fn get_by_refresh_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        self.resolve_live(&refresh_key(token)).await
    }

    /// Delete a session's keys. Returns whether this call removed the
    /// record; when two callers race, exactly one sees `true`.
    async fn remove(&self, session: &Session) -> Result<bool, StoreError> {
        let claimed = self
            .store
            .delete(&[record_key(&session.id)])
            .await?
            .into_inner()
            > 0;
        self.store
            .delete(&[
                access_key(&session.access_token),
                refresh_key(&session.refresh_token),
            ])
            .await?;
        self.store
            .remove_member(&user_key(&session.user_id), &session.id)
            .await?;
        Ok(claimed)
    }

    /// Look up a live session by refresh token and delete it, for rotation.
    /// Only one of several concurrent callers gets the session back.
    pub async fn take_by_refresh_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let Some(session) = self.get_by_refresh_token(token).await? else {
            return Ok(None);
        };
        if !self.remove(&session).await? {
            tracing::info!(session_id = %session.id, "Refresh token already used");
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Delete the session owning `token` (access or refresh), both keys
    /// together. Returns whether a session was found.
    pub async fn delete(&self, token: &str) -> Result<bool, StoreError> {
        let session = match self.resolve(&access_key(token)).await? {
            Some(session) => Some(session),
            None => self.resolve(&refresh_key(token)).await?,
        };

        match session {
            Some(session) => {
                let removed = self.remove(&session).await?;
                tracing::debug!(session_id = %session.id, removed, "Session deleted");
                Ok(removed)
            }
            None => Ok(false),
        }
    }

    /// Delete every session of a user. Returns how many were removed.
    pub async fn delete_all_for_user(&self, user_id: &str) -> Result<usize, StoreError> {
        let index = user_key(user_id);
        let ids = self.store.members(&index).await?.into_inner();

        let mut removed = 0;
        for id in ids {
            match self.load(&id).await? {
                Some(session) if session.user_id == user_id => {
                    self.store
                        .delete(&[
                            record_key(&session.id),
                            access_key(&session.access_token),
                            refresh_key(&session.refresh_token),
                        ])
                        .await?;
                    removed += 1;
                }
                // Expired out of the store already.
                _ => {}
            }
        }
        self.store.delete(&[index]).await?;

        tracing::info!(user_id, removed, "Revoked all sessions for user");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn session(id: &str, user_id: &str) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            user_id: user_id.to_string(),
            access_token: format!("access-{}", id),
            refresh_token: format!("refresh-{}", id),
            access_expires_at: now + ChronoDuration::days(7),
            refresh_expires_at: now + ChronoDuration::days(30),
            ip_address: Some("1.2.3.4".to_string()),
            user_agent: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_both_tokens_resolve_to_same_session() {
        let sessions = SessionManager::new(StorageBackend::fallback_only());
        let s = session("s1", "u1");
        sessions.create(&s).await.unwrap();

        let by_access = sessions.get_by_access_token("access-s1").await.unwrap();
        let by_refresh = sessions.get_by_refresh_token("refresh-s1").await.unwrap();
        assert_eq!(by_access, Some(s.clone()));
        assert_eq!(by_refresh, Some(s));
    }

    #[tokio::test]
    async fn test_delete_by_access_removes_both_keys() {
        let backend = StorageBackend::fallback_only();
        let sessions = SessionManager::new(backend.clone());
        sessions.create(&session("s1", "u1")).await.unwrap();

        assert!(sessions.delete("access-s1").await.unwrap());
        assert_eq!(sessions.get_by_access_token("access-s1").await.unwrap(), None);
        assert_eq!(sessions.get_by_refresh_token("refresh-s1").await.unwrap(), None);
        assert!(backend.fallback().is_empty(), "no orphaned keys");

        assert!(!sessions.delete("access-s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_refresh_removes_both_keys() {
        let sessions = SessionManager::new(StorageBackend::fallback_only());
        sessions.create(&session("s1", "u1")).await.unwrap();

        assert!(sessions.delete("refresh-s1").await.unwrap());
        assert_eq!(sessions.get_by_access_token("access-s1").await.unwrap(), None);
        assert_eq!(sessions.get_by_refresh_token("refresh-s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_take_by_refresh_token_has_one_winner() {
        let sessions = SessionManager::new(StorageBackend::fallback_only());
        sessions.create(&session("s1", "u1")).await.unwrap();

        let (a, b) = tokio::join!(
            sessions.take_by_refresh_token("refresh-s1"),
            sessions.take_by_refresh_token("refresh-s1"),
        );
        let taken = [a.unwrap(), b.unwrap()].into_iter().flatten().count();
        assert_eq!(taken, 1);
        assert_eq!(sessions.get_by_access_token("access-s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_session_reads_as_absent() {
        let sessions = SessionManager::new(StorageBackend::fallback_only());
        let mut s = session("old", "u1");
        s.refresh_expires_at = Utc::now() - ChronoDuration::seconds(1);
        sessions.create(&s).await.unwrap();

        assert_eq!(sessions.get_by_access_token("access-old").await.unwrap(), None);
        assert_eq!(sessions.get_by_refresh_token("refresh-old").await.unwrap(), None);
        // Still deletable.
        assert!(sessions.delete("refresh-old").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_for_user() {
        let backend = StorageBackend::fallback_only();
        let sessions = SessionManager::new(backend.clone());
        sessions.create(&session("a", "u1")).await.unwrap();
        sessions.create(&session("b", "u1")).await.unwrap();
        sessions.create(&session("c", "u2")).await.unwrap();

        assert_eq!(sessions.delete_all_for_user("u1").await.unwrap(), 2);

        for id in ["a", "b"] {
            assert!(sessions
                .get_by_access_token(&format!("access-{}", id))
                .await
                .unwrap()
                .is_none());
            assert!(sessions
                .get_by_refresh_token(&format!("refresh-{}", id))
                .await
                .unwrap()
                .is_none());
        }
        assert!(sessions.get_by_access_token("access-c").await.unwrap().is_some());
        assert_eq!(sessions.delete_all_for_user("u1").await.unwrap(), 0);
    }
}
