// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer: a TTL-capable key-value contract with a Redis primary and
//! an in-process fallback.

pub mod backend;
pub mod lazy;
pub mod memory;
pub mod redis_store;

pub use backend::{Served, StorageBackend};
pub use lazy::{ConnectFuture, Connector, LazyStore};
pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RetryPolicy};

use async_trait::async_trait;
use std::time::Duration;

/// Key prefixes. Every key this crate writes lives under `kennel:`.
pub mod keys {
    pub const USER: &str = "kennel:user:";
    pub const USER_EMAIL: &str = "kennel:user-email:";
    pub const SESSION: &str = "kennel:session:";
    pub const SESSION_ACCESS: &str = "kennel:session-access:";
    pub const SESSION_REFRESH: &str = "kennel:session-refresh:";
    /// Set of session ids owned by a user.
    pub const SESSION_USER: &str = "kennel:session-user:";
    pub const PASSWORD_RESET: &str = "kennel:password-reset:";
    pub const RATE_LIMIT: &str = "kennel:rate-limit:";
}

/// Storage errors. These never cross the [`StorageBackend`] boundary unless
/// the fallback store fails as well.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Key {0} holds the wrong kind of value")]
    WrongType(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Uniform key-value contract implemented by every backend.
///
/// `ttl: None` means the key never expires on its own.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short backend name used in log fields.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Set `key` only if it does not exist. Returns whether this call
    /// created it.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Delete every key in one call. Returns how many keys existed.
    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError>;

    /// Add `member` to the set at `key` and reset the set's expiry to `ttl`.
    async fn add_member(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn remove_member(&self, key: &str, member: &str) -> Result<(), StoreError>;
}
