// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Delivery of password reset links.
//!
//! Sending mail belongs to another service; this is the seam it plugs into.

use crate::models::PasswordResetToken;
use async_trait::async_trait;

#[async_trait]
pub trait ResetNotifier: Send + Sync {
    /// Deliver `reset` to `email`. Failures are the notifier's to log.
    async fn send_reset(&self, email: &str, reset: &PasswordResetToken);
}

/// Default notifier: records that a reset was issued, never the token.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset(&self, _email: &str, reset: &PasswordResetToken) {
        tracing::info!(
            user_id = %reset.user_id,
            expires_at = %reset.expires_at,
            "Password reset issued (no mail transport configured)"
        );
    }
}
