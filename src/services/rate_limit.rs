// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sliding-window attempt limiter keyed by client address.
//!
//! The stored window is read, pruned, extended and written back without a
//! lock or transaction, so two concurrent requests for the same address can
//! both be admitted at the limit. Treat it as a best-effort throttle.

use crate::db::{keys, StorageBackend, StoreError};
use chrono::Utc;
use std::time::Duration;

/// Default policy: attempts allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: usize,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    /// Attempt recorded.
    Allowed { remaining: usize },
    /// Limit reached; nothing recorded.
    Exceeded { retry_after: Duration },
}

impl RateLimitOutcome {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, RateLimitOutcome::Exceeded { .. })
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: StorageBackend,
    policy: RateLimitPolicy,
}

fn window_key(address: &str) -> String {
    format!("{}{}", keys::RATE_LIMIT, address)
}

impl RateLimiter {
    pub fn new(store: StorageBackend, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    async fn load_window(&self, key: &str) -> Result<Vec<i64>, StoreError> {
        match self.store.get_json::<Vec<i64>>(key).await {
            Ok(served) => Ok(served.into_inner().unwrap_or_default()),
            Err(StoreError::Serialization(e)) => {
                tracing::warn!(error = %e, "Discarding unreadable rate-limit window");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Record an attempt from `address` unless `max_attempts` already
    /// happened within `window`.
    pub async fn check_and_record(
        &self,
        address: &str,
        max_attempts: usize,
        window: Duration,
    ) -> Result<RateLimitOutcome, StoreError> {
        let key = window_key(address);
        let now = Utc::now().timestamp_millis();
        let window_ms = window.as_millis() as i64;

        let mut attempts: Vec<i64> = self
            .load_window(&key)
            .await?
            .into_iter()
            .filter(|&at| now - at < window_ms)
            .collect();

        if attempts.len() >= max_attempts {
            let oldest = attempts.iter().copied().min().unwrap_or(now);
            let retry_after = Duration::from_millis((oldest + window_ms - now).max(0) as u64);
            tracing::warn!(
                address,
                attempts = attempts.len(),
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            return Ok(RateLimitOutcome::Exceeded { retry_after });
        }

        attempts.push(now);
        self.store.set_json(&key, &attempts, Some(window)).await?;

        Ok(RateLimitOutcome::Allowed {
            remaining: max_attempts - attempts.len(),
        })
    }

    /// [`check_and_record`](Self::check_and_record) with the configured policy.
    pub async fn check(&self, address: &str) -> Result<RateLimitOutcome, StoreError> {
        self.check_and_record(address, self.policy.max_attempts, self.policy.window)
            .await
    }

    /// Forget all attempts from `address`.
    pub async fn clear(&self, address: &str) -> Result<(), StoreError> {
        self.store.delete(&[window_key(address)]).await?;
        Ok(())
    }
}
