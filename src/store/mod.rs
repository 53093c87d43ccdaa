/// Record stores
///
/// The token lifecycle engine only needs a key-value-like store with filtered
/// lookup, update and delete. Two backends implement the traits below: an
/// in-process one (tests, local development) and Postgres.

mod memory;
mod postgres;

pub use memory::{InMemoryRefreshTokenStore, InMemoryUserStore};
pub use postgres::{run_migrations, PgRefreshTokenStore, PgUserStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Credential, NewRefreshTokenRecord, NewUser, RefreshTokenRecord, User};
use crate::error::AppError;

/// Users and their credentials.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with a unique-constraint error if the email is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn delete_user(&self, id: Uuid) -> Result<(), AppError>;

    async fn create_credential(
        &self,
        user_id: Uuid,
        password_hash: String,
    ) -> Result<Credential, AppError>;

    async fn find_credential(&self, user_id: Uuid) -> Result<Option<Credential>, AppError>;

    /// Create a user together with its credential.
    ///
    /// Without store-level transactions this compensates: if the credential
    /// write fails, the user just created is deleted again and the original
    /// error is returned.
    async fn create_user_with_credential(
        &self,
        new_user: NewUser,
        password_hash: String,
    ) -> Result<User, AppError> {
        let user = self.create_user(new_user).await?;

        if let Err(e) = self.create_credential(user.id, password_hash).await {
            tracing::warn!(user_id = %user.id, error = %e, "Credential write failed, removing user");
            if let Err(cleanup) = self.delete_user(user.id).await {
                tracing::error!(
                    user_id = %user.id,
                    error = %cleanup,
                    "Failed to remove user without credential"
                );
            }
            return Err(e);
        }

        Ok(user)
    }
}

/// Exact-match filter over refresh token records. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshTokenFilter {
    pub user_id: Option<Uuid>,
    pub user_agent: Option<String>,
    pub refresh_token: Option<String>,
}

impl RefreshTokenFilter {
    pub fn by_token(refresh_token: &str) -> Self {
        Self {
            refresh_token: Some(refresh_token.to_string()),
            ..Default::default()
        }
    }

    pub fn by_device(user_id: Uuid, user_agent: &str) -> Self {
        Self {
            user_id: Some(user_id),
            user_agent: Some(user_agent.to_string()),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, refresh_token: &str) -> Self {
        self.refresh_token = Some(refresh_token.to_string());
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn matches(&self, record: &RefreshTokenRecord) -> bool {
        self.user_id.map_or(true, |id| record.user_id == id)
            && self
                .user_agent
                .as_deref()
                .map_or(true, |ua| record.user_agent.as_deref() == Some(ua))
            && self
                .refresh_token
                .as_deref()
                .map_or(true, |token| record.refresh_token == token)
    }
}

/// Device sessions.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(&self, record: NewRefreshTokenRecord) -> Result<RefreshTokenRecord, AppError>;

    async fn find_one(
        &self,
        filter: &RefreshTokenFilter,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Returns the number of deleted records.
    async fn delete_all(&self, filter: &RefreshTokenFilter) -> Result<u64, AppError>;

    /// Set `refreshed` on every record holding `refresh_token`.
    async fn touch_refreshed(
        &self,
        refresh_token: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError>;
}
