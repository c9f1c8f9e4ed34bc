// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Primary/fallback storage adapter.
//!
//! Every operation tries the primary store first. Any primary error is
//! logged (once per outage) and the operation is replayed against the
//! in-memory fallback, so callers only ever see a tagged success.
//!
//! The two stores are never synchronized: data written to Redis before an
//! outage is invisible while serving from the fallback, and data written to
//! the fallback during an outage is invisible once Redis is back.

use super::{
    ConnectFuture, Connector, KvStore, LazyStore, MemoryStore, RedisStore, RetryPolicy, StoreError,
};
use crate::config::Config;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A value tagged with the store that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served<T> {
    Primary(T),
    Fallback(T),
}

impl<T> Served<T> {
    pub fn into_inner(self) -> T {
        match self {
            Served::Primary(v) | Served::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Served::Fallback(_))
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Served<U>, E> {
        Ok(match self {
            Served::Primary(v) => Served::Primary(f(v)?),
            Served::Fallback(v) => Served::Fallback(f(v)?),
        })
    }
}

/// The one storage handle shared by every manager.
#[derive(Clone)]
pub struct StorageBackend {
    primary: Option<Arc<dyn KvStore>>,
    fallback: MemoryStore,
    degraded: Arc<AtomicBool>,
}

impl StorageBackend {
    pub fn new(primary: Option<Arc<dyn KvStore>>, fallback: MemoryStore) -> Self {
        Self {
            primary,
            fallback,
            degraded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Backend with no primary; everything is served from memory.
    pub fn fallback_only() -> Self {
        Self::new(None, MemoryStore::new())
    }

    /// Build the backend described by the configuration.
    ///
    /// No `REDIS_URL` means fallback-only. Otherwise Redis is the primary
    /// even if it cannot be reached yet; it is connected lazily and calls
    /// fall back until it comes up.
    pub async fn from_config(config: &Config) -> Self {
        let Some(url) = config.redis_url.as_deref() else {
            tracing::warn!("REDIS_URL not set, using in-memory store only");
            return Self::fallback_only();
        };

        let policy = RetryPolicy {
            timeout: config.store_timeout,
            max_retries: config.store_max_retries,
            ..RetryPolicy::default()
        };

        if let Err(e) = redis::Client::open(url) {
            tracing::error!(error = %e, "Invalid REDIS_URL, using in-memory store only");
            return Self::fallback_only();
        }

        let url = url.to_string();
        let connector: Connector = Arc::new(move || -> ConnectFuture {
            let url = url.clone();
            Box::pin(async move {
                RedisStore::connect(&url, policy)
                    .await
                    .map(|store| Arc::new(store) as Arc<dyn KvStore>)
            })
        });
        let primary = LazyStore::new("redis", connector, config.store_reconnect_interval);

        if primary.connected().await.is_err() {
            tracing::error!("Redis unreachable at startup, serving from memory until it connects");
        }

        Self::new(Some(Arc::new(primary)), MemoryStore::new())
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// True while the last primary call failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn fallback(&self) -> &MemoryStore {
        &self.fallback
    }

    /// Sweep expired entries out of the fallback store.
    pub fn reap_fallback(&self) -> usize {
        self.fallback.purge_expired(Utc::now())
    }

    fn primary_ok<T>(&self, value: T) -> Served<T> {
        if self.degraded.swap(false, Ordering::Relaxed) {
            tracing::info!("Primary store recovered");
        }
        Served::Primary(value)
    }

    fn primary_failed(&self, store: &dyn KvStore, op: &'static str, error: &StoreError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                backend = store.name(),
                op,
                error = %error,
                "Primary store unavailable, serving from in-memory fallback"
            );
        } else {
            tracing::debug!(backend = store.name(), op, error = %error, "Primary store still unavailable");
        }
    }

    // ─── Raw operations ─────────────────────────────────────────

    pub async fn get(&self, key: &str) -> Result<Served<Option<String>>, StoreError> {
        if let Some(primary) = &self.primary {
            match primary.get(key).await {
                Ok(v) => return Ok(self.primary_ok(v)),
                Err(e) => self.primary_failed(primary.as_ref(), "get", &e),
            }
        }
        self.fallback.get(key).await.map(Served::Fallback)
    }

    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<Served<()>, StoreError> {
        if let Some(primary) = &self.primary {
            match primary.set(key, value, ttl).await {
                Ok(v) => return Ok(self.primary_ok(v)),
                Err(e) => self.primary_failed(primary.as_ref(), "set", &e),
            }
        }
        self.fallback.set(key, value, ttl).await.map(Served::Fallback)
    }

    pub async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<Served<bool>, StoreError> {
        if let Some(primary) = &self.primary {
            match primary.set_if_absent(key, value, ttl).await {
                Ok(v) => return Ok(self.primary_ok(v)),
                Err(e) => self.primary_failed(primary.as_ref(), "set_if_absent", &e),
            }
        }
        self.fallback
            .set_if_absent(key, value, ttl)
            .await
            .map(Served::Fallback)
    }

    pub async fn delete(&self, keys: &[String]) -> Result<Served<usize>, StoreError> {
        if let Some(primary) = &self.primary {
            match primary.delete(keys).await {
                Ok(v) => return Ok(self.primary_ok(v)),
                Err(e) => self.primary_failed(primary.as_ref(), "delete", &e),
            }
        }
        self.fallback.delete(keys).await.map(Served::Fallback)
    }

    pub async fn add_member(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<Served<()>, StoreError> {
        if let Some(primary) = &self.primary {
            match primary.add_member(key, member, ttl).await {
                Ok(v) => return Ok(self.primary_ok(v)),
                Err(e) => self.primary_failed(primary.as_ref(), "add_member", &e),
            }
        }
        self.fallback
            .add_member(key, member, ttl)
            .await
            .map(Served::Fallback)
    }

    pub async fn members(&self, key: &str) -> Result<Served<Vec<String>>, StoreError> {
        if let Some(primary) = &self.primary {
            match primary.members(key).await {
                Ok(v) => return Ok(self.primary_ok(v)),
                Err(e) => self.primary_failed(primary.as_ref(), "members", &e),
            }
        }
        self.fallback.members(key).await.map(Served::Fallback)
    }

    pub async fn remove_member(&self, key: &str, member: &str) -> Result<Served<()>, StoreError> {
        if let Some(primary) = &self.primary {
            match primary.remove_member(key, member).await {
                Ok(v) => return Ok(self.primary_ok(v)),
                Err(e) => self.primary_failed(primary.as_ref(), "remove_member", &e),
            }
        }
        self.fallback
            .remove_member(key, member)
            .await
            .map(Served::Fallback)
    }

    // ─── JSON helpers ───────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Served<Option<T>>, StoreError> {
        self.get(key).await?.try_map(|raw| match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        })
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<Served<()>, StoreError> {
        let json = serde_json::to_string(value)?;
        self.set(key, &json, ttl).await
    }
}
