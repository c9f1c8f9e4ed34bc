// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password hashing (bcrypt).

/// bcrypt only reads this many bytes of input; longer passwords are refused
/// rather than silently truncated.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Errors from hashing a new password.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password is longer than {MAX_PASSWORD_BYTES} bytes")]
    TooLong,

    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Salted, deliberately slow one-way password hashing.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(12)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn check_length(password: &str) -> Result<(), PasswordError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(PasswordError::TooLong);
        }
        Ok(())
    }

    /// Hash with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        Self::check_length(password)?;
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// Check `password` against a stored hash. A malformed hash or an
    /// over-long password is a mismatch.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        if Self::check_length(password).is_err() {
            return false;
        }
        bcrypt::verify(password, hash).unwrap_or(false)
    }

    /// [`hash`](Self::hash) on the blocking pool.
    pub async fn hash_async(&self, password: &str) -> Result<String, PasswordError> {
        let hasher = *self;
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    /// [`verify`](Self::verify) on the blocking pool.
    pub async fn verify_async(&self, password: &str, hash: &str) -> bool {
        let hasher = *self;
        let password = password.to_string();
        let hash = hash.to_string();
        match tokio::task::spawn_blocking(move || hasher.verify(&password, &hash)).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::error!(error = %e, "Password verification task failed");
                false
            }
        }
    }
}
