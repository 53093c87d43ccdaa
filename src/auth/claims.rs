/// JWT Claims structures
///
/// Access tokens carry the reduced user profile. Refresh tokens carry only a
/// random identifier so that a leaked refresh token reveals nothing about
/// its owner.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Profile;
use crate::error::{AppError, AuthError};

/// Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Unique token ID; two tokens minted in the same second still differ
    pub jti: String,
}

impl AccessClaims {
    pub fn new(profile: &Profile, expiry_seconds: i64, issuer: Option<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: profile.id.to_string(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            exp: now.saturating_add(expiry_seconds),
            iat: now,
            iss: issuer,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Extract user ID from claims
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::AccessTokenInvalid))
    }

    pub fn into_profile(self) -> Result<Profile, AppError> {
        Ok(Profile {
            id: self.user_id()?,
            name: self.name,
            email: self.email,
        })
    }
}

/// Claims for refresh tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    /// Random opaque payload
    pub token: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl RefreshClaims {
    pub fn new(expiry_seconds: i64, issuer: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            token: Uuid::new_v4().to_string(),
            exp: now.saturating_add(expiry_seconds),
            iat: now,
            iss: issuer,
        }
    }
}
