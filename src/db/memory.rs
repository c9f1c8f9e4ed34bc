// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process fallback store.
//!
//! There is no native expiry: an entry written with a TTL remembers its
//! deadline, but stays readable until [`MemoryStore::purge_expired`] (the
//! reaper) or an explicit delete removes it. Callers that care about expiry
//! compare the timestamps inside their own records.

use super::{KvStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry as Slot;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

fn deadline(ttl: Duration) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl).ok()?;
    Utc::now().checked_add_signed(ttl)
}

/// Process-local key-value map. Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys (expired-but-unswept keys included).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry whose deadline is at or before `now`.
    /// Returns the number of entries removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| match entry.expires_at {
            Some(expires_at) if expires_at <= now => {
                removed += 1;
                false
            }
            _ => true,
        });
        removed
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Text(text) => Ok(Some(text.clone())),
                Value::Set(_) => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: ttl.and_then(deadline),
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        // An expired-but-unswept entry still counts as present, as it does
        // for `get`.
        match self.entries.entry(key.to_string()) {
            Slot::Occupied(_) => Ok(false),
            Slot::Vacant(slot) => {
                slot.insert(Entry {
                    value: Value::Text(value.to_string()),
                    expires_at: ttl.and_then(deadline),
                });
                Ok(true)
            }
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        Ok(keys
            .iter()
            .filter(|key| self.entries.remove(key.as_str()).is_some())
            .count())
    }

    async fn add_member(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_string());
            }
            Value::Text(_) => return Err(StoreError::WrongType(key.to_string())),
        }
        entry.expires_at = deadline(ttl);
        Ok(())
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(members) => Ok(members.iter().cloned().collect()),
                Value::Text(_) => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let now_empty = match self.entries.get_mut(key) {
            None => return Ok(()),
            Some(mut entry) => match &mut entry.value {
                Value::Set(members) => {
                    members.remove(member);
                    members.is_empty()
                }
                Value::Text(_) => return Err(StoreError::WrongType(key.to_string())),
            },
        };
        // Redis drops empty sets; match that.
        if now_empty {
            self.entries
                .remove_if(key, |_, entry| matches!(&entry.value, Value::Set(m) if m.is_empty()));
        }
        Ok(())
    }
}
