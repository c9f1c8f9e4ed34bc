// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Redis primary store.
//!
//! Every command runs under a per-attempt timeout with a small retry budget
//! and capped exponential backoff, so an unreachable Redis costs a bounded
//! amount of time before the caller falls back.

use super::{KvStore, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;

/// Timeout and retry budget for Redis commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            max_retries: 2,
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Redis-backed [`KvStore`].
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    policy: RetryPolicy,
}

impl RedisStore {
    /// Connect to Redis at `url` (`redis://` or `rediss://`).
    pub async fn connect(url: &str, policy: RetryPolicy) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;

        // Connection setup gets the whole retry budget as one deadline.
        let budget = policy.timeout.saturating_mul(policy.max_retries + 1);
        let conn = tokio::time::timeout(budget, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Timeout(budget))??;

        let store = Self { conn, policy };
        store.ping().await?;
        tracing::info!("Connected to Redis");
        Ok(store)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let _: String = self
            .run("ping", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let error = match tokio::time::timeout(self.policy.timeout, f(self.conn.clone())).await
            {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => StoreError::Redis(e),
                Err(_) => StoreError::Timeout(self.policy.timeout),
            };

            if attempt >= self.policy.max_retries {
                return Err(error);
            }

            let backoff = self.policy.backoff(attempt);
            tracing::debug!(
                op,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Redis command failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.run("get", |mut conn| async move { conn.get(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.run("set", |mut conn| async move {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
            }
            cmd.query_async::<_, ()>(&mut conn).await
        })
        .await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let reply: Option<String> = self
            .run("set_if_absent", |mut conn| async move {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value).arg("NX");
                if let Some(ttl) = ttl {
                    cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
                }
                cmd.query_async::<_, Option<String>>(&mut conn).await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        // A single DEL is atomic across all of its keys.
        self.run("delete", |mut conn| async move { conn.del(keys).await })
            .await
    }

    async fn add_member(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        let ttl_ms = ttl.as_millis().max(1) as i64;
        self.run("add_member", |mut conn| async move {
            redis::pipe()
                .atomic()
                .sadd(key, member)
                .ignore()
                .pexpire(key, ttl_ms)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.run("members", |mut conn| async move { conn.smembers(key).await })
            .await
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.run("remove_member", |mut conn| async move {
            conn.srem::<_, _, ()>(key, member).await
        })
        .await
    }
}
