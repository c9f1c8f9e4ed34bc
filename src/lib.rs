// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Kennel-Auth: authentication and session core for the Kennel storefront.
//!
//! Credential hashing, signed access tokens, opaque refresh and reset
//! tokens, session bookkeeping and login rate limiting, all on top of a
//! key-value store that falls back to process memory when Redis is down.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::StorageBackend;
use services::{AuthService, ResetNotifier};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: StorageBackend,
    pub auth: AuthService,
    pub notifier: Arc<dyn ResetNotifier>,
}

impl AppState {
    pub fn new(config: Config, store: StorageBackend, notifier: Arc<dyn ResetNotifier>) -> Self {
        let auth = AuthService::new(&config, store.clone());
        Self {
            config,
            store,
            auth,
            notifier,
        }
    }
}
