/// Session Boundary
///
/// The four user-facing flows (signup, login, refresh, logout) plus `me`,
/// orchestrated over the three auth components. HTTP handlers are thin
/// wrappers around this service.

use std::sync::Arc;

use serde::Deserialize;

use crate::auth::{
    hash_password, AccessTokenIssuer, CredentialVerifier, JwtAccessTokenIssuer,
    JwtRefreshTokenManager, RefreshTokenManager, StoreCredentialVerifier,
};
use crate::configuration::{PasswordSettings, TokenSettings};
use crate::domain::{AccessTokenResponse, NewUser, Profile, TokenPair, UserView};
use crate::error::AppError;
use crate::store::{RefreshTokenStore, UserStore};
use crate::validators::{is_valid_email, is_valid_name};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub struct SessionService {
    users: Arc<dyn UserStore>,
    credentials: Arc<dyn CredentialVerifier>,
    access_tokens: Arc<dyn AccessTokenIssuer>,
    refresh_tokens: Arc<dyn RefreshTokenManager>,
    password_cost: u32,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        credentials: Arc<dyn CredentialVerifier>,
        access_tokens: Arc<dyn AccessTokenIssuer>,
        refresh_tokens: Arc<dyn RefreshTokenManager>,
        password_cost: u32,
    ) -> Self {
        Self {
            users,
            credentials,
            access_tokens,
            refresh_tokens,
            password_cost,
        }
    }

    /// Wire the default JWT/bcrypt components over the given stores.
    ///
    /// # Errors
    /// Returns a configuration error if any signing setting is missing
    pub fn from_settings(
        users: Arc<dyn UserStore>,
        refresh_store: Arc<dyn RefreshTokenStore>,
        tokens: &TokenSettings,
        password: &PasswordSettings,
    ) -> Result<Self, AppError> {
        tokens.validate()?;

        let credentials: Arc<dyn CredentialVerifier> =
            Arc::new(StoreCredentialVerifier::new(users.clone(), password.hash_cost)?);
        let access_tokens: Arc<dyn AccessTokenIssuer> =
            Arc::new(JwtAccessTokenIssuer::from_settings(tokens)?);
        let refresh_tokens = Arc::new(JwtRefreshTokenManager::from_settings(
            refresh_store,
            credentials.clone(),
            access_tokens.clone(),
            tokens,
        )?);

        Ok(Self::new(
            users,
            credentials,
            access_tokens,
            refresh_tokens,
            password.hash_cost,
        ))
    }

    pub fn access_tokens(&self) -> Arc<dyn AccessTokenIssuer> {
        self.access_tokens.clone()
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<UserView, AppError> {
        let email = is_valid_email(&request.email)?;
        let name = is_valid_name(request.name.as_deref())?;
        let password_hash = hash_password(&request.password, self.password_cost)?;

        let user = self
            .users
            .create_user_with_credential(NewUser { email, name }, password_hash)
            .await?;

        tracing::info!(user_id = %user.id, "User signed up");
        Ok(user.into())
    }

    pub async fn login(
        &self,
        credentials: &Credentials,
        user_agent: Option<&str>,
    ) -> Result<TokenPair, AppError> {
        let user = self
            .credentials
            .verify_credentials(&credentials.email, &credentials.password)
            .await?;
        let profile = self.credentials.convert_to_profile(&user);
        let access_token = self.access_tokens.issue(&profile)?;

        let tokens = self
            .refresh_tokens
            .issue_session(&profile, access_token, user_agent)
            .await?;

        tracing::info!(user_id = %user.id, user_agent = ?user_agent, "User logged in");
        Ok(tokens)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessTokenResponse, AppError> {
        self.refresh_tokens.exchange(refresh_token).await
    }

    pub async fn me(&self, profile: &Profile) -> Result<UserView, AppError> {
        let user = self.credentials.find_user_by_id(profile.id).await?;
        Ok(user.into())
    }

    pub async fn logout(
        &self,
        profile: &Profile,
        refresh_token: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(), AppError> {
        self.refresh_tokens
            .revoke(profile.id, refresh_token, user_agent)
            .await
    }
}
