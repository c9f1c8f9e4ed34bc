// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::error::{AppError, Result};
use crate::middleware::auth::{access_cookie, access_token_from, clear_access_cookie, AuthUser};
use crate::models::UserProfile;
use crate::services::{AuthResponse, ClientInfo, PasswordHasher};
use crate::time_utils::secs_until;
use crate::AppState;

/// Routes that need no token.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/password-reset/request", post(request_password_reset))
        .route("/auth/password-reset/confirm", post(confirm_password_reset))
}

/// Routes behind `require_auth`.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout-all", post(logout_all))
}

fn validate(req: &impl Validate) -> Result<()> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// bcrypt reads at most 72 bytes; `length` counts chars, so check bytes.
fn fits_bcrypt(password: &str) -> std::result::Result<(), ValidationError> {
    PasswordHasher::check_length(password).map_err(|_| ValidationError::new("password_too_long"))
}

fn with_cookie(state: &AppState, jar: CookieJar, response: &AuthResponse) -> CookieJar {
    jar.add(access_cookie(
        response.tokens.access_token.clone(),
        secs_until(response.tokens.access_expires_at) as i64,
        state.config.secure_cookies(),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8), custom(function = "fits_bcrypt"))]
    pub password: String,
    #[validate(length(min = 1, max = 80))]
    pub display_name: Option<String>,
}

async fn register(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    validate(&req)?;
    let response = state
        .auth
        .register(&req.email, &req.password, req.display_name, &client)
        .await?;
    let jar = with_cookie(&state, jar, &response);
    Ok((StatusCode::CREATED, jar, Json(response)))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let response = state.auth.login(&req.email, &req.password, &client).await?;
    let jar = with_cookie(&state, jar, &response);
    Ok((jar, Json(response)))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    jar: CookieJar,
    Json(req): Json<RefreshRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let response = state.auth.refresh(&req.refresh_token, &client).await?;
    let jar = with_cookie(&state, jar, &response);
    Ok((jar, Json(response)))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// End the current session. Takes the refresh token from the body if given,
/// otherwise the access token from cookie/header. Always clears the cookie.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(CookieJar, StatusCode)> {
    let req: LogoutRequest = if body.is_empty() {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };

    let token = req
        .refresh_token
        .or_else(|| access_token_from(&jar, &headers));

    if let Some(token) = token {
        let found = state.auth.logout(&token).await?;
        tracing::debug!(found, "Logout");
    }

    let jar = jar.add(clear_access_cookie(state.config.secure_cookies()));
    Ok((jar, StatusCode::NO_CONTENT))
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked: usize,
}

async fn logout_all(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<LogoutAllResponse>)> {
    let revoked = state.auth.logout_all(&user.user_id).await?;
    let jar = jar.add(clear_access_cookie(state.config.secure_cookies()));
    Ok((jar, Json(LogoutAllResponse { revoked })))
}

async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserProfile>> {
    Ok(Json(state.auth.profile(&user.user_id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Same answer whether or not the email is registered.
async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(req): Json<ResetRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    validate(&req)?;
    if let Some(reset) = state
        .auth
        .request_password_reset(&req.email, &client)
        .await?
    {
        state.notifier.send_reset(&req.email, &reset).await;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If that email is registered, a reset link has been sent",
        }),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetConfirmRequest {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 8), custom(function = "fits_bcrypt"))]
    pub new_password: String,
}

async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetConfirmRequest>,
) -> Result<StatusCode> {
    validate(&req)?;
    state
        .auth
        .confirm_password_reset(&req.token, &req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
