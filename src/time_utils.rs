// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for timestamps and durations.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Convert a std duration to a chrono one, saturating at ~100 years.
pub fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

/// `now + ttl`, saturating instead of overflowing.
pub fn expiry_from_now(ttl: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    now.checked_add_signed(to_chrono(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole seconds from `now` until `until`, at least 1.
pub fn secs_until(until: DateTime<Utc>) -> u64 {
    (until - Utc::now()).num_seconds().max(1) as u64
}
