// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Opaque random tokens (refresh and password-reset tokens).

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

pub const TOKEN_LEN: usize = 64;

/// 64 characters drawn uniformly from `[A-Za-z0-9]` using the OS CSPRNG.
pub fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
