// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User records keyed by id, with an email → id index.
//!
//! The email index key is claimed with a set-if-absent before the record is
//! written, so two registrations of one address cannot both succeed.

use crate::db::{keys, StorageBackend, StoreError};
use crate::models::{normalize_email, Role, User};
use chrono::Utc;

/// Input for [`UserStore::create`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("email already registered")]
    EmailTaken,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Identity records on top of the shared storage backend.
#[derive(Clone)]
pub struct UserStore {
    store: StorageBackend,
}

impl UserStore {
    pub fn new(store: StorageBackend) -> Self {
        Self { store }
    }

    fn id_key(id: &str) -> String {
        format!("{}{}", keys::USER, id)
    }

    fn email_key(email: &str) -> String {
        format!("{}{}", keys::USER_EMAIL, normalize_email(email))
    }

    pub async fn create(&self, new_user: NewUser) -> Result<User, UserStoreError> {
        let email = normalize_email(&new_user.email);
        let now = Utc::now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            password_hash: new_user.password_hash,
            display_name: new_user.display_name,
            role: new_user.role,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };

        let email_key = Self::email_key(&user.email);
        if !self.claim(&email_key, &user.id).await? {
            return Err(UserStoreError::EmailTaken);
        }

        self.store
            .set_json(&Self::id_key(&user.id), &user, None)
            .await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User created");
        Ok(user)
    }

    /// Point `email_key` at `id` unless it already points somewhere. A retried
    /// claim that finds our own id already in place counts as won.
    async fn claim(&self, email_key: &str, id: &str) -> Result<bool, StoreError> {
        if self
            .store
            .set_if_absent(email_key, id, None)
            .await?
            .into_inner()
        {
            return Ok(true);
        }
        let holder = self.store.get(email_key).await?.into_inner();
        Ok(holder.as_deref() == Some(id))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.store.get_json(&Self::id_key(id)).await?.into_inner())
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let Some(id) = self.store.get(&Self::email_key(email)).await?.into_inner() else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn save(&self, user: &mut User) -> Result<(), StoreError> {
        user.updated_at = Utc::now();
        self.store
            .set_json(&Self::id_key(&user.id), user, None)
            .await?;
        Ok(())
    }

    /// Replace the password hash. Returns `None` if the user is gone.
    pub async fn update_password(
        &self,
        id: &str,
        password_hash: String,
    ) -> Result<Option<User>, StoreError> {
        let Some(mut user) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        user.password_hash = password_hash;
        self.save(&mut user).await?;
        Ok(Some(user))
    }
}
