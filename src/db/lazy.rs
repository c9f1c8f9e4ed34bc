// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Primary store that connects on first use.
//!
//! Until a connection succeeds every call fails with
//! [`StoreError::Unavailable`], which the backend treats like any other
//! primary outage. Connection attempts are spaced at least `retry_interval`
//! apart so a dead Redis does not cost a connect timeout on every request.

use super::{KvStore, StoreError};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn KvStore>, StoreError>> + Send>>;

/// Produces a fresh connection attempt.
pub type Connector = Arc<dyn Fn() -> ConnectFuture + Send + Sync>;

pub struct LazyStore {
    name: &'static str,
    connector: Connector,
    conn: OnceCell<Arc<dyn KvStore>>,
    next_attempt: Mutex<Option<Instant>>,
    retry_interval: Duration,
}

impl LazyStore {
    pub fn new(name: &'static str, connector: Connector, retry_interval: Duration) -> Self {
        Self {
            name,
            connector,
            conn: OnceCell::new(),
            next_attempt: Mutex::new(None),
            retry_interval,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.initialized()
    }

    /// The connected store, connecting first if allowed.
    pub async fn connected(&self) -> Result<&Arc<dyn KvStore>, StoreError> {
        if let Some(store) = self.conn.get() {
            return Ok(store);
        }

        {
            let mut next = self
                .next_attempt
                .lock()
                .map_err(|_| StoreError::Unavailable("connect state poisoned".to_string()))?;
            let now = Instant::now();
            if let Some(at) = *next {
                if now < at {
                    return Err(StoreError::Unavailable(format!(
                        "{} not connected",
                        self.name
                    )));
                }
            }
            *next = Some(now + self.retry_interval);
        }

        match (self.connector)().await {
            Ok(store) => {
                if self.conn.set(store).is_ok() {
                    tracing::info!(backend = self.name, "Primary store connected");
                }
                self.conn
                    .get()
                    .ok_or_else(|| StoreError::Unavailable(format!("{} not connected", self.name)))
            }
            Err(e) => {
                tracing::warn!(
                    backend = self.name,
                    error = %e,
                    retry_in_secs = self.retry_interval.as_secs(),
                    "Primary store connect failed"
                );
                Err(e)
            }
        }
    }
}

#[async_trait]
impl KvStore for LazyStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.connected().await?.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.connected().await?.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.connected().await?.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        self.connected().await?.delete(keys).await
    }

    async fn add_member(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        self.connected().await?.add_member(key, member, ttl).await
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.connected().await?.members(key).await
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.connected().await?.remove_member(key, member).await
    }
}
