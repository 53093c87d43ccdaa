//! In-process stores behind `tokio::sync::RwLock`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RefreshTokenFilter, RefreshTokenStore, UserStore};
use crate::domain::{Credential, NewRefreshTokenRecord, NewUser, RefreshTokenRecord, User};
use crate::error::{AppError, DatabaseError};

#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
    credentials: RwLock<HashMap<Uuid, Credential>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a user as deleted without removing the row.
    pub async fn soft_delete(&self, id: Uuid) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.deleted = true;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        // Same scope as the unique index: soft-deleted rows still hold their email.
        if users.values().any(|u| u.email == new_user.email) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "Email already registered".to_string(),
            )
            .into());
        }

        let user = new_user.into_user();
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = email.to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| !u.deleted && u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .get(&id)
            .filter(|u| !u.deleted)
            .cloned())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), AppError> {
        self.users.write().await.remove(&id);
        self.credentials.write().await.remove(&id);
        Ok(())
    }

    async fn create_credential(
        &self,
        user_id: Uuid,
        password_hash: String,
    ) -> Result<Credential, AppError> {
        let mut credentials = self.credentials.write().await;
        if credentials.contains_key(&user_id) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "Credential already exists".to_string(),
            )
            .into());
        }

        let credential = Credential {
            id: Uuid::new_v4(),
            user_id,
            password_hash,
        };
        credentials.insert(user_id, credential.clone());
        Ok(credential)
    }

    async fn find_credential(&self, user_id: Uuid) -> Result<Option<Credential>, AppError> {
        Ok(self.credentials.read().await.get(&user_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    records: RwLock<Vec<RefreshTokenRecord>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, oldest first.
    pub async fn records(&self) -> Vec<RefreshTokenRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create(&self, record: NewRefreshTokenRecord) -> Result<RefreshTokenRecord, AppError> {
        let record = record.into_record();
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn find_one(
        &self,
        filter: &RefreshTokenFilter,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| filter.matches(r))
            .cloned())
    }

    async fn delete_all(&self, filter: &RefreshTokenFilter) -> Result<u64, AppError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !filter.matches(r));
        Ok((before - records.len()) as u64)
    }

    async fn touch_refreshed(
        &self,
        refresh_token: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut touched = 0;
        for record in self
            .records
            .write()
            .await
            .iter_mut()
            .filter(|r| r.refresh_token == refresh_token)
        {
            record.refreshed = at;
            touched += 1;
        }
        Ok(touched)
    }
}
