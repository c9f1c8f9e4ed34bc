// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login, refresh, logout and password reset flows.
//!
//! Only business outcomes leave this module: authenticated or not,
//! rate-limited or not, reset token valid or not. Access tokens are checked
//! statelessly, so a logged-out access token keeps verifying until its own
//! expiry; refresh tokens die with the session.

use crate::config::Config;
use crate::db::StorageBackend;
use crate::error::{AppError, Result};
use crate::models::{normalize_email, PasswordResetToken, Role, Session, User, UserProfile};
use crate::services::password::{PasswordError, PasswordHasher};
use crate::services::password_reset::PasswordResetManager;
use crate::services::random::generate_token;
use crate::services::rate_limit::{RateLimitOutcome, RateLimitPolicy, RateLimiter};
use crate::services::session::SessionManager;
use crate::services::token::{AccessClaims, NewAccessClaims, TokenCodec};
use crate::services::users::{NewUser, UserStore, UserStoreError};
use crate::time_utils::{expiry_from_now, to_chrono};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Where a request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Rate-limit key for this client.
    pub fn address(&self) -> &str {
        self.ip_address.as_deref().unwrap_or("unknown")
    }
}

/// Token pair handed to the client after login or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub session_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<&Session> for AuthTokens {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            access_expires_at: session.access_expires_at,
            refresh_expires_at: session.refresh_expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    #[serde(flatten)]
    pub tokens: AuthTokens,
}

/// Prefix that keeps reset-request throttling apart from login throttling.
const RESET_LIMIT_PREFIX: &str = "reset:";

#[derive(Clone)]
pub struct AuthService {
    users: UserStore,
    sessions: SessionManager,
    resets: PasswordResetManager,
    limiter: RateLimiter,
    codec: TokenCodec,
    hasher: PasswordHasher,
    access_ttl: Duration,
    session_ttl: Duration,
    /// Hash compared against when the email is unknown, so both paths cost
    /// one bcrypt verify.
    dummy_hash: std::sync::Arc<OnceCell<String>>,
}

impl AuthService {
    pub fn new(config: &Config, store: StorageBackend) -> Self {
        Self {
            users: UserStore::new(store.clone()),
            sessions: SessionManager::new(store.clone()),
            resets: PasswordResetManager::new(store.clone(), config.reset_token_ttl),
            limiter: RateLimiter::new(
                store,
                RateLimitPolicy {
                    max_attempts: config.rate_limit_max_attempts,
                    window: config.rate_limit_window,
                },
            ),
            codec: TokenCodec::new(config.auth_secret.clone()),
            hasher: PasswordHasher::new(config.bcrypt_cost),
            access_ttl: config.access_token_ttl,
            session_ttl: config.session_ttl,
            dummy_hash: Default::default(),
        }
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn resets(&self) -> &PasswordResetManager {
        &self.resets
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Resolve an access token without touching storage.
    pub fn authenticate(&self, access_token: &str) -> Option<AccessClaims> {
        self.codec.verify_access(access_token)
    }

    async fn hash_password(&self, password: &str) -> Result<String> {
        self.hasher
            .hash_async(password)
            .await
            .map_err(|e| match e {
                PasswordError::TooLong => AppError::BadRequest(e.to_string()),
                e => AppError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)),
            })
    }

    async fn dummy_verify(&self, password: &str) {
        let hasher = self.hasher;
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| async move { hasher.hash_async(&generate_token()).await })
            .await;
        if let Ok(hash) = dummy {
            let _ = self.hasher.verify_async(password, hash).await;
        }
    }

    async fn open_session(&self, user: &User, client: &ClientInfo) -> Result<Session> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let access_token = self
            .codec
            .issue_access(
                &NewAccessClaims {
                    sub: &user.id,
                    email: &user.email,
                    role: user.role,
                    sid: &session_id,
                },
                to_chrono(self.access_ttl),
            )
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Token issue failed: {}", e)))?;

        let session = Session {
            id: session_id,
            user_id: user.id.clone(),
            access_token,
            refresh_token: generate_token(),
            access_expires_at: expiry_from_now(self.access_ttl),
            refresh_expires_at: expiry_from_now(self.session_ttl),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            created_at: Utc::now(),
        };
        self.sessions.create(&session).await?;
        Ok(session)
    }

    fn respond(user: &User, session: &Session) -> AuthResponse {
        AuthResponse {
            user: UserProfile::from(user),
            tokens: AuthTokens::from(session),
        }
    }

    /// Create an account and log it in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
        client: &ClientInfo,
    ) -> Result<AuthResponse> {
        let password_hash = self.hash_password(password).await?;
        let user = self
            .users
            .create(NewUser {
                email: email.to_string(),
                password_hash,
                display_name,
                role: Role::User,
            })
            .await
            .map_err(|e| match e {
                UserStoreError::EmailTaken => {
                    AppError::Conflict("Email already registered".to_string())
                }
                UserStoreError::Store(e) => AppError::Storage(e),
            })?;

        let session = self.open_session(&user, client).await?;
        Ok(Self::respond(&user, &session))
    }

    /// Password login. The rate limiter runs before any credential check,
    /// so a throttled client never reaches bcrypt.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<AuthResponse> {
        let address = client.address();
        if let RateLimitOutcome::Exceeded { retry_after } = self.limiter.check(address).await? {
            return Err(AppError::TooManyAttempts {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                self.dummy_verify(password).await;
                tracing::info!(address, "Login failed: unknown email");
                return Err(AppError::InvalidCredentials);
            }
        };

        if !self.hasher.verify_async(password, &user.password_hash).await {
            tracing::info!(address, user_id = %user.id, "Login failed: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        self.limiter.clear(address).await?;
        let session = self.open_session(&user, client).await?;

        tracing::info!(user_id = %user.id, session_id = %session.id, "Login succeeded");
        Ok(Self::respond(&user, &session))
    }

    /// Swap a refresh token for a new session. The old session is claimed
    /// and deleted first, so a refresh token rotates at most once.
    pub async fn refresh(&self, refresh_token: &str, client: &ClientInfo) -> Result<AuthResponse> {
        let old = self
            .sessions
            .take_by_refresh_token(refresh_token)
            .await?
            .ok_or(AppError::InvalidToken)?;

        let user = self
            .users
            .find_by_id(&old.user_id)
            .await?
            .ok_or(AppError::InvalidToken)?;

        let session = self.open_session(&user, client).await?;

        tracing::debug!(user_id = %user.id, old = %old.id, new = %session.id, "Session refreshed");
        Ok(Self::respond(&user, &session))
    }

    /// End the session owning `token` (access or refresh).
    pub async fn logout(&self, token: &str) -> Result<bool> {
        Ok(self.sessions.delete(token).await?)
    }

    /// End every session of a user.
    pub async fn logout_all(&self, user_id: &str) -> Result<usize> {
        Ok(self.sessions.delete_all_for_user(user_id).await?)
    }

    pub async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;
        Ok(UserProfile::from(&user))
    }

    /// Issue a reset token if the email is registered. Callers must answer
    /// the same way whether or not a token was issued.
    pub async fn request_password_reset(
        &self,
        email: &str,
        client: &ClientInfo,
    ) -> Result<Option<PasswordResetToken>> {
        let key = format!("{}{}", RESET_LIMIT_PREFIX, client.address());
        if let RateLimitOutcome::Exceeded { retry_after } = self.limiter.check(&key).await? {
            return Err(AppError::TooManyAttempts {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        let Some(user) = self.users.find_by_email(&normalize_email(email)).await? else {
            tracing::info!("Password reset requested for unknown email");
            return Ok(None);
        };

        let reset = self.resets.issue(&user.id).await?;
        tracing::info!(user_id = %user.id, "Password reset token issued");
        Ok(Some(reset))
    }

    /// Redeem a reset token: claim it, set the new password and revoke every
    /// existing session. The claim comes before any slow work, so a token
    /// can be redeemed only once however many requests race for it.
    pub async fn confirm_password_reset(&self, token: &str, new_password: &str) -> Result<()> {
        PasswordHasher::check_length(new_password)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let reset = self
            .resets
            .redeem(token)
            .await?
            .ok_or(AppError::InvalidToken)?;

        let password_hash = self.hash_password(new_password).await?;
        if self
            .users
            .update_password(&reset.user_id, password_hash)
            .await?
            .is_none()
        {
            return Err(AppError::InvalidToken);
        }

        let revoked = self.sessions.delete_all_for_user(&reset.user_id).await?;

        tracing::info!(user_id = %reset.user_id, revoked, "Password reset completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(&Config::test_default(), StorageBackend::fallback_only())
    }

    fn client(ip: &str) -> ClientInfo {
        ClientInfo {
            ip_address: Some(ip.to_string()),
            user_agent: Some("test-agent".to_string()),
        }
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_session() {
        let auth = service();
        let c = client("10.0.0.1");
        auth.register("dog@example.com", "woof-woof-1", None, &c)
            .await
            .unwrap();

        let response = auth.login("Dog@Example.com", "woof-woof-1", &c).await.unwrap();

        let claims = auth.authenticate(&response.tokens.access_token).unwrap();
        assert_eq!(claims.sub, response.user.id);
        assert_eq!(claims.sid, response.tokens.session_id);
        assert_eq!(claims.role, Role::User);

        let session = auth
            .sessions()
            .get_by_refresh_token(&response.tokens.refresh_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.id, response.tokens.session_id);
        assert_eq!(session.ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_bad_credentials_are_indistinguishable() {
        let auth = service();
        let c = client("10.0.0.2");
        auth.register("cat@example.com", "meow-meow-1", None, &c)
            .await
            .unwrap();

        let wrong_password = auth.login("cat@example.com", "nope", &c).await.unwrap_err();
        let unknown_email = auth.login("ghost@example.com", "nope", &c).await.unwrap_err();
        assert!(matches!(wrong_password, AppError::InvalidCredentials));
        assert!(matches!(unknown_email, AppError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_rate_limited_before_password_check() {
        let auth = service();
        let c = client("1.2.3.4");
        // Registering does not count as a login attempt.
        auth.register("bird@example.com", "tweet-tweet-1", None, &c)
            .await
            .unwrap();

        for _ in 0..5 {
            let err = auth.login("bird@example.com", "wrong", &c).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidCredentials));
        }

        let err = auth
            .login("bird@example.com", "tweet-tweet-1", &c)
            .await
            .unwrap_err();
        match err {
            AppError::TooManyAttempts { retry_after_secs } => {
                assert!(retry_after_secs > 0 && retry_after_secs <= 15 * 60)
            }
            other => panic!("expected rate limit, got {:?}", other),
        }

        // A different address is not affected.
        assert!(auth
            .login("bird@example.com", "tweet-tweet-1", &client("9.9.9.9"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_successful_login_clears_attempts() {
        let auth = service();
        let c = client("10.0.0.3");
        auth.register("fish@example.com", "blub-blub-1", None, &c)
            .await
            .unwrap();

        for _ in 0..4 {
            let _ = auth.login("fish@example.com", "wrong", &c).await;
        }
        auth.login("fish@example.com", "blub-blub-1", &c).await.unwrap();

        // Window was cleared, so four more failures are still allowed.
        for _ in 0..4 {
            let err = auth.login("fish@example.com", "wrong", &c).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidCredentials));
        }
    }

    #[tokio::test]
    async fn test_refresh_rotates_session() {
        let auth = service();
        let c = client("10.0.0.4");
        let first = auth
            .register("hamster@example.com", "squeak-squeak", None, &c)
            .await
            .unwrap();

        let second = auth.refresh(&first.tokens.refresh_token, &c).await.unwrap();
        assert_ne!(second.tokens.session_id, first.tokens.session_id);
        assert_ne!(second.tokens.refresh_token, first.tokens.refresh_token);

        // The old refresh token is spent.
        let err = auth.refresh(&first.tokens.refresh_token, &c).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
        assert!(auth
            .sessions()
            .get_by_access_token(&first.tokens.access_token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_logout_and_logout_all() {
        let auth = service();
        let c = client("10.0.0.5");
        let a = auth
            .register("pony@example.com", "neigh-neigh-1", None, &c)
            .await
            .unwrap();
        let b = auth.login("pony@example.com", "neigh-neigh-1", &c).await.unwrap();
        let third = auth.login("pony@example.com", "neigh-neigh-1", &c).await.unwrap();

        assert!(auth.logout(&a.tokens.access_token).await.unwrap());
        assert!(!auth.logout(&a.tokens.access_token).await.unwrap());

        assert_eq!(auth.logout_all(&b.user.id).await.unwrap(), 2);
        for tokens in [&b.tokens, &third.tokens] {
            assert!(auth
                .sessions()
                .get_by_refresh_token(&tokens.refresh_token)
                .await
                .unwrap()
                .is_none());
        }
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let auth = service();
        let c = client("10.0.0.6");
        let registered = auth
            .register("lizard@example.com", "old-password", None, &c)
            .await
            .unwrap();

        assert!(auth
            .request_password_reset("nobody@example.com", &c)
            .await
            .unwrap()
            .is_none());

        let reset = auth
            .request_password_reset("LIZARD@example.com", &c)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reset.user_id, registered.user.id);

        auth.confirm_password_reset(&reset.token, "new-password")
            .await
            .unwrap();

        // Single use.
        let err = auth
            .confirm_password_reset(&reset.token, "third-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));

        // Old sessions revoked, new password works, old one does not.
        assert!(auth
            .sessions()
            .get_by_refresh_token(&registered.tokens.refresh_token)
            .await
            .unwrap()
            .is_none());
        assert!(auth.login("lizard@example.com", "new-password", &c).await.is_ok());
        assert!(matches!(
            auth.login("lizard@example.com", "old-password", &c).await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let auth = service();
        let c = client("10.0.0.7");
        auth.register("dup@example.com", "password-1", None, &c)
            .await
            .unwrap();
        let err = auth
            .register("DUP@example.com", "password-2", None, &c)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reset_token_redeemed_once_under_concurrency() {
        let auth = service();
        let c = client("10.0.0.8");
        auth.register("ferret@example.com", "original-pass", None, &c)
            .await
            .unwrap();
        let reset = auth
            .request_password_reset("ferret@example.com", &c)
            .await
            .unwrap()
            .unwrap();

        let (first, second) = tokio::join!(
            auth.confirm_password_reset(&reset.token, "attacker-pass-1"),
            auth.confirm_password_reset(&reset.token, "victim-pass-22"),
        );
        assert_eq!(
            [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_refresh_token_rotates_once_under_concurrency() {
        let auth = service();
        let c = client("10.0.0.9");
        let first = auth
            .register("gerbil@example.com", "nibble-nibble", None, &c)
            .await
            .unwrap();

        let token = &first.tokens.refresh_token;
        let (a, b) = tokio::join!(auth.refresh(token, &c), auth.refresh(token, &c));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    }

    #[tokio::test]
    async fn test_overlong_password_rejected_without_spending_token() {
        let auth = service();
        let c = client("10.0.0.10");
        let long = "p".repeat(73);

        let err = auth
            .register("newt@example.com", &long, None, &c)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        auth.register("newt@example.com", "short-enough", None, &c)
            .await
            .unwrap();
        let reset = auth
            .request_password_reset("newt@example.com", &c)
            .await
            .unwrap()
            .unwrap();

        let err = auth
            .confirm_password_reset(&reset.token, &long)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        auth.confirm_password_reset(&reset.token, "fits-in-bcrypt")
            .await
            .unwrap();
    }
}
