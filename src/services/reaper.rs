// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic sweep of the in-memory fallback store.
//!
//! Redis expires keys itself; the fallback map only shrinks when this runs.
//! Expiry is still checked on read wherever it matters.

use crate::db::StorageBackend;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Sweep once. Returns the number of entries removed.
pub fn reap_once(store: &StorageBackend) -> usize {
    let removed = store.reap_fallback();
    if removed > 0 {
        tracing::info!(removed, remaining = store.fallback().len(), "Reaped expired fallback entries");
    } else {
        tracing::debug!("Reaper found nothing to remove");
    }
    removed
}

/// Run [`reap_once`] every `interval` until the task is aborted.
pub fn spawn_reaper(store: StorageBackend, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            reap_once(&store);
        }
    })
}
