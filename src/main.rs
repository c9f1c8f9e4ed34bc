// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Kennel-Auth API Server

use kennel_auth::{
    config::Config,
    db::StorageBackend,
    services::{spawn_reaper, LogNotifier},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Kennel-Auth API");

    // Never fails: an unreachable Redis leaves us on the in-memory store.
    let store = StorageBackend::from_config(&config).await;
    tracing::info!(primary = store.has_primary(), "Storage backend ready");

    let reaper = spawn_reaper(store.clone(), config.reaper_interval);

    let state = Arc::new(AppState::new(config.clone(), store, Arc::new(LogNotifier)));
    let app = kennel_auth::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    reaper.abort();
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kennel_auth=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
