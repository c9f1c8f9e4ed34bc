// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, Response};
use kennel_auth::config::Config;
use kennel_auth::db::StorageBackend;
use kennel_auth::models::PasswordResetToken;
use kennel_auth::routes::create_router;
use kennel_auth::services::ResetNotifier;
use kennel_auth::AppState;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Check if Redis is available via environment variable.
#[allow(dead_code)]
pub fn redis_available() -> bool {
    std::env::var("REDIS_URL").is_ok()
}

/// Skip test with message if Redis not available.
#[macro_export]
macro_rules! require_redis {
    () => {
        if !crate::common::redis_available() {
            eprintln!("⚠️  Skipping: REDIS_URL not set");
            return;
        }
    };
}

/// Notifier that keeps reset tokens so tests can redeem them.
#[derive(Default)]
pub struct CapturingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl CapturingNotifier {
    pub fn last_token(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, t)| t.clone())
    }
}

#[async_trait]
impl ResetNotifier for CapturingNotifier {
    async fn send_reset(&self, email: &str, reset: &PasswordResetToken) {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), reset.token.clone()));
    }
}

/// Test app over the in-memory store only.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<CapturingNotifier>) {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_frontend_url(
    frontend_url: &str,
) -> (axum::Router, Arc<AppState>, Arc<CapturingNotifier>) {
    let mut config = Config::test_default();
    config.frontend_url = frontend_url.to_string();
    create_test_app_with_config(config)
}

#[allow(dead_code)]
pub fn create_test_app_with_config(
    config: Config,
) -> (axum::Router, Arc<AppState>, Arc<CapturingNotifier>) {
    let notifier = Arc::new(CapturingNotifier::default());
    let state = Arc::new(AppState::new(
        config,
        StorageBackend::fallback_only(),
        notifier.clone(),
    ));
    (create_router(state.clone()), state, notifier)
}

/// POST a JSON body, optionally from a given socket peer address.
#[allow(dead_code)]
pub fn json_request(uri: &str, body: serde_json::Value, peer_ip: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(ip) = peer_ip {
        let addr: SocketAddr = format!("{}:40000", ip).parse().unwrap();
        builder = builder.extension(ConnectInfo(addr));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[allow(dead_code)]
pub fn with_forwarded_for(mut request: Request<Body>, value: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert("x-forwarded-for", value.parse().unwrap());
    request
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}
