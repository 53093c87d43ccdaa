//! Records owned by the stores and the values passed between components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account. Soft-deleted users are invisible to lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub name: Option<String>,
    pub user_type: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user. The email must already be normalized.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
}

impl NewUser {
    pub fn into_user(self) -> User {
        User {
            id: Uuid::new_v4(),
            email: self.email,
            email_verified: false,
            verification_token: None,
            name: self.name,
            user_type: None,
            deleted: false,
            created_at: Utc::now(),
        }
    }
}

/// One-to-one with [`User`]; holds only the bcrypt hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub password_hash: String,
}

/// One device session.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token: String,
    pub user_agent: Option<String>,
    pub created: DateTime<Utc>,
    pub refreshed: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefreshTokenRecord {
    pub user_id: Uuid,
    pub refresh_token: String,
    pub user_agent: Option<String>,
}

impl NewRefreshTokenRecord {
    pub fn into_record(self) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            refresh_token: self.refresh_token,
            user_agent: self.user_agent,
            created: now,
            refreshed: now,
        }
    }
}

/// Reduced user view embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

/// Public view of a user: the hidden fields (`email`, `emailVerified`,
/// `verificationToken`, `deleted`) are never serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            user_type: user.user_type,
            created_at: user.created_at,
        }
    }
}
