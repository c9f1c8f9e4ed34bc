// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - authentication and session logic.

pub mod auth;
pub mod notify;
pub mod password;
pub mod password_reset;
pub mod random;
pub mod rate_limit;
pub mod reaper;
pub mod session;
pub mod token;
pub mod users;

pub use auth::{AuthResponse, AuthService, AuthTokens, ClientInfo};
pub use notify::{LogNotifier, ResetNotifier};
pub use password::{PasswordError, PasswordHasher};
pub use password_reset::PasswordResetManager;
pub use random::generate_token;
pub use rate_limit::{RateLimitOutcome, RateLimitPolicy, RateLimiter};
pub use reaper::{reap_once, spawn_reaper};
pub use session::SessionManager;
pub use token::{AccessClaims, NewAccessClaims, TokenCodec, TokenError};
pub use users::{NewUser, UserStore, UserStoreError};
