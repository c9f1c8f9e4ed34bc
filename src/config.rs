// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Development-only signing secret used when `AUTH_SECRET` is unset.
pub const DEV_AUTH_SECRET: &str = "kennel-dev-secret-change-me-in-production";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Frontend URL (CORS origin, cookie `Secure` flag)
    pub frontend_url: String,

    /// HMAC key for access tokens
    pub auth_secret: Vec<u8>,
    /// Redis connection string; `None` runs on the in-memory store only
    pub redis_url: Option<String>,

    pub access_token_ttl: Duration,
    /// Session (refresh token) lifetime
    pub session_ttl: Duration,
    pub reset_token_ttl: Duration,

    pub rate_limit_window: Duration,
    pub rate_limit_max_attempts: usize,

    /// bcrypt work factor
    pub bcrypt_cost: u32,
    /// How often the reaper sweeps the in-memory store
    pub reaper_interval: Duration,

    /// Per-attempt Redis timeout
    pub store_timeout: Duration,
    pub store_max_retries: u32,
    /// Minimum gap between Redis connect attempts while it is unreachable
    pub store_reconnect_interval: Duration,

    /// Take the client address from `X-Forwarded-For`/`X-Real-IP`. Only safe
    /// behind a proxy that sets those headers itself.
    pub trust_proxy_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            auth_secret: DEV_AUTH_SECRET.as_bytes().to_vec(),
            redis_url: None,
            access_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            session_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            reset_token_ttl: Duration::from_secs(60 * 60),
            rate_limit_window: Duration::from_secs(15 * 60),
            rate_limit_max_attempts: 5,
            bcrypt_cost: 12,
            reaper_interval: Duration::from_secs(60 * 60),
            store_timeout: Duration::from_millis(500),
            store_max_retries: 2,
            store_reconnect_interval: Duration::from_secs(5),
            trust_proxy_headers: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let auth_secret = match env::var("AUTH_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret.trim().as_bytes().to_vec(),
            _ => {
                tracing::warn!(
                    "AUTH_SECRET not set, using the development secret (unsafe for production)"
                );
                defaults.auth_secret.clone()
            }
        };

        let bcrypt_cost = parse_var("BCRYPT_COST", defaults.bcrypt_cost)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid("BCRYPT_COST", bcrypt_cost.to_string()));
        }

        Ok(Self {
            port: parse_var("PORT", defaults.port)?,
            frontend_url: env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            auth_secret,
            redis_url: env::var("REDIS_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            access_token_ttl: secs_var("ACCESS_TOKEN_TTL_SECS", defaults.access_token_ttl)?,
            session_ttl: secs_var("SESSION_TTL_SECS", defaults.session_ttl)?,
            reset_token_ttl: secs_var("RESET_TOKEN_TTL_SECS", defaults.reset_token_ttl)?,
            rate_limit_window: secs_var("RATE_LIMIT_WINDOW_SECS", defaults.rate_limit_window)?,
            rate_limit_max_attempts: parse_var(
                "RATE_LIMIT_MAX_ATTEMPTS",
                defaults.rate_limit_max_attempts,
            )?,
            bcrypt_cost,
            reaper_interval: secs_var("REAPER_INTERVAL_SECS", defaults.reaper_interval)?,
            store_timeout: Duration::from_millis(parse_var(
                "STORE_TIMEOUT_MS",
                defaults.store_timeout.as_millis() as u64,
            )?),
            store_max_retries: parse_var("STORE_MAX_RETRIES", defaults.store_max_retries)?,
            store_reconnect_interval: secs_var(
                "STORE_RECONNECT_SECS",
                defaults.store_reconnect_interval,
            )?,
            trust_proxy_headers: parse_var("TRUST_PROXY_HEADERS", defaults.trust_proxy_headers)?,
        })
    }

    /// Config for tests: fast bcrypt, fixed secret, no Redis.
    pub fn test_default() -> Self {
        Self {
            auth_secret: b"test_auth_secret_32_bytes_minimum!".to_vec(),
            bcrypt_cost: 4,
            ..Self::default()
        }
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = parse_var(name, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::Invalid(name, "0".to_string()));
    }
    Ok(Duration::from_secs(secs))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1:?}")]
    Invalid(&'static str, String),
}
