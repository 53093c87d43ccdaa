/// Credential Verifier
///
/// Checks an (email, password) pair against the stored user and bcrypt hash.
/// Every rejection path returns the same error so the response never reveals
/// whether an account exists.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::domain::{Profile, User};
use crate::error::{AppError, AuthError, ConfigError};
use crate::store::UserStore;

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<User, AppError>;

    /// Load a live user by id; a missing or soft-deleted user is an
    /// authentication failure.
    async fn find_user_by_id(&self, id: Uuid) -> Result<User, AppError>;

    fn convert_to_profile(&self, user: &User) -> Profile {
        Profile {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Hashed at construction and checked whenever no real hash exists, so an
/// unknown email costs one bcrypt verification like a known one.
const DUMMY_PASSWORD: &str = "no-such-account-password";

pub struct StoreCredentialVerifier {
    users: Arc<dyn UserStore>,
    dummy_hash: String,
}

impl StoreCredentialVerifier {
    /// `hash_cost` must match the cost stored hashes are created with.
    ///
    /// # Errors
    /// Returns a configuration error if bcrypt rejects the cost
    pub fn new(users: Arc<dyn UserStore>, hash_cost: u32) -> Result<Self, AppError> {
        let dummy_hash = hash_password(DUMMY_PASSWORD, hash_cost).map_err(|_| {
            ConfigError::InvalidValue(format!(
                "password.hash_cost {} is not a valid bcrypt cost",
                hash_cost
            ))
        })?;

        Ok(Self { users, dummy_hash })
    }

    fn reject_without_hash(&self, password: &str) -> AppError {
        let _ = verify_password(password, &self.dummy_hash);
        AuthError::InvalidCredentials.into()
    }
}

#[async_trait]
impl CredentialVerifier for StoreCredentialVerifier {
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = email.trim().to_lowercase();

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => return Err(self.reject_without_hash(password)),
        };

        // A user without a credential is a signup that never completed.
        let credential = match self.users.find_credential(user.id).await? {
            Some(credential) => credential,
            None => {
                tracing::warn!(user_id = %user.id, "User has no stored credential");
                return Err(self.reject_without_hash(password));
            }
        };

        if !verify_password(password, &credential.password_hash)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AuthError::InvalidUser.into())
    }
}
