// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Time-boxed password reset tokens.
//!
//! A token is spent by [`PasswordResetManager::redeem`], which claims it with
//! the store's delete count so only one caller can ever win it.

use crate::db::{keys, StorageBackend, StoreError};
use crate::models::PasswordResetToken;
use crate::services::random::generate_token;
use crate::time_utils::expiry_from_now;
use chrono::Utc;
use std::time::Duration;

#[derive(Clone)]
pub struct PasswordResetManager {
    store: StorageBackend,
    ttl: Duration,
}

fn reset_key(token: &str) -> String {
    format!("{}{}", keys::PASSWORD_RESET, token)
}

impl PasswordResetManager {
    pub fn new(store: StorageBackend, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Mint and store a fresh token for `user_id`.
    pub async fn issue(&self, user_id: &str) -> Result<PasswordResetToken, StoreError> {
        let reset = PasswordResetToken {
            token: generate_token(),
            user_id: user_id.to_string(),
            expires_at: expiry_from_now(self.ttl),
            created_at: Utc::now(),
        };
        self.create(&reset).await?;
        Ok(reset)
    }

    /// Store `reset` under its token string, expiring at `expires_at`.
    pub async fn create(&self, reset: &PasswordResetToken) -> Result<(), StoreError> {
        let ttl = (reset.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_millis(1));
        self.store
            .set_json(&reset_key(&reset.token), reset, Some(ttl))
            .await?;
        tracing::debug!(user_id = %reset.user_id, "Password reset token stored");
        Ok(())
    }

    /// Look up a token; expired tokens read as absent even before the store
    /// drops them.
    pub async fn get(&self, token: &str) -> Result<Option<PasswordResetToken>, StoreError> {
        let reset: Option<PasswordResetToken> =
            self.store.get_json(&reset_key(token)).await?.into_inner();
        Ok(reset.filter(|r| !r.is_expired(Utc::now())))
    }

    /// Look up and delete a live token in one claim. Of several concurrent
    /// callers with the same token at most one gets it back.
    pub async fn redeem(&self, token: &str) -> Result<Option<PasswordResetToken>, StoreError> {
        let Some(reset) = self.get(token).await? else {
            return Ok(None);
        };
        if !self.delete(token).await? {
            tracing::info!(user_id = %reset.user_id, "Password reset token already redeemed");
            return Ok(None);
        }
        Ok(Some(reset))
    }

    pub async fn delete(&self, token: &str) -> Result<bool, StoreError> {
        let removed = self.store.delete(&[reset_key(token)]).await?.into_inner();
        Ok(removed > 0)
    }
}
