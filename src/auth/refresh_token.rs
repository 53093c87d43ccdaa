/// Refresh Token Management
///
/// Refresh tokens are HS256 JWTs signed with their own secret. The payload is
/// a random UUID, never the profile. Each token is backed by a record keyed by
/// (user, device):
/// - the token's own `exp` decides expiry
/// - the record's existence decides revocation
/// - a still-valid token for the same device is reused on login instead of
///   minting another session
///
/// Session states: absent -> live -> expired-but-present -> revoked.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::RefreshClaims;
use crate::auth::credentials::CredentialVerifier;
use crate::auth::jwt::AccessTokenIssuer;
use crate::configuration::{TokenSettings, MAX_TOKEN_EXPIRY_SECONDS};
use crate::domain::{AccessTokenResponse, NewRefreshTokenRecord, Profile, TokenPair};
use crate::error::{AppError, AuthError, ConfigError};
use crate::store::{RefreshTokenFilter, RefreshTokenStore};

#[async_trait]
pub trait RefreshTokenManager: Send + Sync {
    /// Pair `access_token` with a refresh token for (profile, device),
    /// reusing the device's live token when there is one.
    async fn issue_session(
        &self,
        profile: &Profile,
        access_token: String,
        user_agent: Option<&str>,
    ) -> Result<TokenPair, AppError>;

    /// Trade a stored, still-valid refresh token for a fresh access token.
    /// The refresh token itself is not re-emitted.
    async fn exchange(&self, refresh_token: &str) -> Result<AccessTokenResponse, AppError>;

    /// Delete the user's records matching the token, or else the device.
    /// With neither, nothing is revoked.
    async fn revoke(
        &self,
        user_id: Uuid,
        refresh_token: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(), AppError>;
}

pub struct JwtRefreshTokenManager {
    store: Arc<dyn RefreshTokenStore>,
    credentials: Arc<dyn CredentialVerifier>,
    access_tokens: Arc<dyn AccessTokenIssuer>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: i64,
    issuer: String,
}

impl JwtRefreshTokenManager {
    /// # Errors
    /// Returns a configuration error if the secret or issuer is empty or the
    /// TTL is beyond `MAX_TOKEN_EXPIRY_SECONDS`
    pub fn new(
        store: Arc<dyn RefreshTokenStore>,
        credentials: Arc<dyn CredentialVerifier>,
        access_tokens: Arc<dyn AccessTokenIssuer>,
        secret: &str,
        expiry_seconds: i64,
        issuer: String,
    ) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired("refresh token secret".to_string()).into());
        }
        if issuer.is_empty() {
            return Err(ConfigError::MissingRequired("refresh token issuer".to_string()).into());
        }
        if expiry_seconds > MAX_TOKEN_EXPIRY_SECONDS {
            return Err(ConfigError::InvalidValue(format!(
                "refresh token expiry must not exceed {} seconds",
                MAX_TOKEN_EXPIRY_SECONDS
            ))
            .into());
        }

        Ok(Self {
            store,
            credentials,
            access_tokens,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
            issuer,
        })
    }

    pub fn from_settings(
        store: Arc<dyn RefreshTokenStore>,
        credentials: Arc<dyn CredentialVerifier>,
        access_tokens: Arc<dyn AccessTokenIssuer>,
        settings: &TokenSettings,
    ) -> Result<Self, AppError> {
        Self::new(
            store,
            credentials,
            access_tokens,
            &settings.refresh_secret,
            settings.refresh_token_expiry,
            settings.refresh_issuer.clone(),
        )
    }

    fn sign_refresh_token(&self) -> Result<String, AppError> {
        let claims = RefreshClaims::new(self.expiry_seconds, self.issuer.clone());

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Refresh token generation failed: {}", e)))
    }

    /// Signature, expiry and issuer check. Only a short reason leaves this
    /// function, never the underlying library error.
    fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);

        decode::<RefreshClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "jwt expired",
                    ErrorKind::InvalidSignature => "invalid signature",
                    ErrorKind::InvalidIssuer => "jwt issuer invalid",
                    _ => "jwt malformed",
                };
                AuthError::TokenVerification(reason.to_string()).into()
            })
    }

    async fn try_exchange(&self, refresh_token: &str) -> Result<AccessTokenResponse, AppError> {
        if refresh_token.is_empty() {
            return Err(AuthError::MissingToken.into());
        }

        self.verify_refresh_token(refresh_token)?;

        // A verified token without a record has been revoked.
        let record = self
            .store
            .find_one(&RefreshTokenFilter::by_token(refresh_token))
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let user = self.credentials.find_user_by_id(record.user_id).await?;
        let profile = self.credentials.convert_to_profile(&user);
        let access_token = self.access_tokens.issue(&profile)?;

        if let Err(e) = self.store.touch_refreshed(refresh_token, Utc::now()).await {
            tracing::warn!(
                record_id = %record.id,
                user_id = %record.user_id,
                error = %e,
                "Failed to record refresh time"
            );
        }

        tracing::info!(
            record_id = %record.id,
            user_id = %record.user_id,
            "Access token refreshed"
        );

        Ok(AccessTokenResponse { access_token })
    }
}

/// Authentication failures leave `exchange` as one "Error verifying token"
/// failure; store failures pass through untouched.
fn wrap_verification_failure(err: AppError) -> AppError {
    match err {
        AppError::Auth(AuthError::TokenVerification(_)) => err,
        AppError::Auth(e) => AppError::Auth(AuthError::TokenVerification(e.to_string())),
        other => other,
    }
}

#[async_trait]
impl RefreshTokenManager for JwtRefreshTokenManager {
    async fn issue_session(
        &self,
        profile: &Profile,
        access_token: String,
        user_agent: Option<&str>,
    ) -> Result<TokenPair, AppError> {
        let user_id = profile.id;
        let mut reused = None;

        if let Some(user_agent) = user_agent {
            let device = RefreshTokenFilter::by_device(user_id, user_agent);

            if let Some(existing) = self.store.find_one(&device).await? {
                match self.verify_refresh_token(&existing.refresh_token) {
                    Ok(_) => {
                        tracing::info!(
                            user_id = %user_id,
                            user_agent = %user_agent,
                            record_id = %existing.id,
                            "Reusing live refresh token"
                        );
                        reused = Some(existing.refresh_token);
                    }
                    Err(e) => {
                        tracing::warn!(
                            user_id = %user_id,
                            user_agent = %user_agent,
                            record_id = %existing.id,
                            error = %e,
                            "Discarding stale refresh token"
                        );
                        // Match the token too, so a record created concurrently
                        // for the same device survives.
                        self.store
                            .delete_all(&device.with_token(&existing.refresh_token))
                            .await?;
                    }
                }
            }
        }

        let refresh_token = match reused {
            Some(token) => token,
            None => {
                let token = self.sign_refresh_token()?;
                let record = self
                    .store
                    .create(NewRefreshTokenRecord {
                        user_id,
                        refresh_token: token.clone(),
                        user_agent: user_agent.map(str::to_string),
                    })
                    .await?;

                tracing::info!(
                    user_id = %user_id,
                    user_agent = ?user_agent,
                    record_id = %record.id,
                    "Refresh token issued"
                );
                token
            }
        };

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    async fn exchange(&self, refresh_token: &str) -> Result<AccessTokenResponse, AppError> {
        self.try_exchange(refresh_token)
            .await
            .map_err(wrap_verification_failure)
    }

    async fn revoke(
        &self,
        user_id: Uuid,
        refresh_token: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(), AppError> {
        let filter = match (refresh_token.filter(|t| !t.is_empty()), user_agent) {
            (Some(token), _) => RefreshTokenFilter::by_token(token).with_user(user_id),
            (None, Some(user_agent)) => RefreshTokenFilter::by_device(user_id, user_agent),
            (None, None) => {
                tracing::debug!(user_id = %user_id, "Nothing to revoke");
                return Ok(());
            }
        };

        let deleted = self.store.delete_all(&filter).await?;
        tracing::info!(
            user_id = %user_id,
            user_agent = ?user_agent,
            deleted = deleted,
            "Refresh tokens revoked"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::StoreCredentialVerifier;
    use crate::auth::jwt::JwtAccessTokenIssuer;
    use crate::domain::{NewUser, RefreshTokenRecord};
    use crate::error::DatabaseError;
    use crate::store::{InMemoryRefreshTokenStore, InMemoryUserStore, UserStore};
    use chrono::{DateTime, Utc};

    const REFRESH_SECRET: &str = "refresh-secret";

    struct Harness {
        users: Arc<InMemoryUserStore>,
        tokens: Arc<InMemoryRefreshTokenStore>,
        profile: Profile,
    }

    impl Harness {
        async fn new() -> Self {
            let users = Arc::new(InMemoryUserStore::new());
            let user = users
                .create_user(NewUser {
                    email: "a@b.com".to_string(),
                    name: None,
                })
                .await
                .unwrap();
            let profile = Profile {
                id: user.id,
                name: None,
                email: user.email,
            };
            Self {
                users,
                tokens: Arc::new(InMemoryRefreshTokenStore::new()),
                profile,
            }
        }

        fn manager_with_expiry(&self, expiry_seconds: i64) -> JwtRefreshTokenManager {
            self.manager_over(self.tokens.clone(), expiry_seconds)
        }

        fn manager_over(
            &self,
            store: Arc<dyn RefreshTokenStore>,
            expiry_seconds: i64,
        ) -> JwtRefreshTokenManager {
            let access = JwtAccessTokenIssuer::new("access-secret", 60, None).unwrap();
            JwtRefreshTokenManager::new(
                store,
                Arc::new(StoreCredentialVerifier::new(self.users.clone(), 4).unwrap()),
                Arc::new(access),
                REFRESH_SECRET,
                expiry_seconds,
                "test-issuer".to_string(),
            )
            .unwrap()
        }
    }

    /// Wraps the in-memory store and fails selected operations.
    struct FlakyStore {
        inner: InMemoryRefreshTokenStore,
        fail_lookups: bool,
        fail_touch: bool,
    }

    fn outage() -> AppError {
        DatabaseError::ConnectionPool("connection reset".to_string()).into()
    }

    #[async_trait]
    impl RefreshTokenStore for FlakyStore {
        async fn create(
            &self,
            record: NewRefreshTokenRecord,
        ) -> Result<RefreshTokenRecord, AppError> {
            self.inner.create(record).await
        }

        async fn find_one(
            &self,
            filter: &RefreshTokenFilter,
        ) -> Result<Option<RefreshTokenRecord>, AppError> {
            if self.fail_lookups {
                return Err(outage());
            }
            self.inner.find_one(filter).await
        }

        async fn delete_all(&self, filter: &RefreshTokenFilter) -> Result<u64, AppError> {
            self.inner.delete_all(filter).await
        }

        async fn touch_refreshed(
            &self,
            refresh_token: &str,
            at: DateTime<Utc>,
        ) -> Result<u64, AppError> {
            if self.fail_touch {
                return Err(outage());
            }
            self.inner.touch_refreshed(refresh_token, at).await
        }
    }

    #[tokio::test]
    async fn test_live_token_is_reused_for_same_device() {
        let h = Harness::new().await;
        let manager = h.manager_with_expiry(3600);

        let first = manager
            .issue_session(&h.profile, "a1".to_string(), Some("phone"))
            .await
            .unwrap();
        let second = manager
            .issue_session(&h.profile, "a2".to_string(), Some("phone"))
            .await
            .unwrap();

        assert_eq!(first.refresh_token, second.refresh_token);
        assert_eq!(second.access_token, "a2");
        assert_eq!(h.tokens.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_devices_get_separate_sessions() {
        let h = Harness::new().await;
        let manager = h.manager_with_expiry(3600);

        let phone = manager
            .issue_session(&h.profile, "a".to_string(), Some("phone"))
            .await
            .unwrap();
        let laptop = manager
            .issue_session(&h.profile, "a".to_string(), Some("laptop"))
            .await
            .unwrap();

        assert_ne!(phone.refresh_token, laptop.refresh_token);
        assert_eq!(h.tokens.records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_stale_token_is_replaced() {
        let h = Harness::new().await;
        let expired = h
            .manager_with_expiry(-10)
            .issue_session(&h.profile, "a".to_string(), Some("phone"))
            .await
            .unwrap();

        let fresh = h
            .manager_with_expiry(3600)
            .issue_session(&h.profile, "a".to_string(), Some("phone"))
            .await
            .unwrap();

        assert_ne!(expired.refresh_token, fresh.refresh_token);
        let records = h.tokens.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].refresh_token, fresh.refresh_token);
    }

    #[tokio::test]
    async fn test_device_less_login_always_mints_new_token() {
        let h = Harness::new().await;
        let manager = h.manager_with_expiry(3600);

        let first = manager
            .issue_session(&h.profile, "a".to_string(), None)
            .await
            .unwrap();
        let second = manager
            .issue_session(&h.profile, "a".to_string(), None)
            .await
            .unwrap();

        assert_ne!(first.refresh_token, second.refresh_token);
        assert_eq!(h.tokens.records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_exchange_updates_refreshed_timestamp() {
        let h = Harness::new().await;
        let manager = h.manager_with_expiry(3600);
        let pair = manager
            .issue_session(&h.profile, "a".to_string(), Some("phone"))
            .await
            .unwrap();
        let before = h.tokens.records().await[0].refreshed;

        manager.exchange(&pair.refresh_token).await.unwrap();

        let after = h.tokens.records().await[0].refreshed;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn test_empty_token_is_rejected() {
        let h = Harness::new().await;
        let err = h.manager_with_expiry(3600).exchange("").await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Error verifying token : 'refresh token' is null"
        );
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let h = Harness::new().await;
        let pair = h
            .manager_with_expiry(-10)
            .issue_session(&h.profile, "a".to_string(), None)
            .await
            .unwrap();

        let err = h
            .manager_with_expiry(3600)
            .exchange(&pair.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Auth(AuthError::TokenVerification(ref reason)) if reason == "jwt expired"
        ));
    }

    #[tokio::test]
    async fn test_unknown_record_is_invalid_token() {
        let h = Harness::new().await;
        let manager = h.manager_with_expiry(3600);
        let orphan = manager.sign_refresh_token().unwrap();

        let err = manager.exchange(&orphan).await.unwrap_err();
        assert_eq!(err.to_string(), "Error verifying token : Invalid Token");
    }

    #[tokio::test]
    async fn test_deleted_user_is_invalid_user() {
        let h = Harness::new().await;
        let manager = h.manager_with_expiry(3600);
        let pair = manager
            .issue_session(&h.profile, "a".to_string(), None)
            .await
            .unwrap();
        h.users.delete_user(h.profile.id).await.unwrap();

        let err = manager.exchange(&pair.refresh_token).await.unwrap_err();
        assert_eq!(err.to_string(), "Error verifying token : invalid User");
    }

    #[tokio::test]
    async fn test_store_outage_is_not_an_auth_failure() {
        let h = Harness::new().await;
        let flaky = Arc::new(FlakyStore {
            inner: InMemoryRefreshTokenStore::new(),
            fail_lookups: true,
            fail_touch: false,
        });
        let manager = h.manager_over(flaky, 3600);
        let token = manager.sign_refresh_token().unwrap();

        let err = manager.exchange(&token).await.unwrap_err();
        assert!(err.is_infrastructure_failure());
        assert!(!err.is_authentication_failure());
    }

    #[tokio::test]
    async fn test_refreshed_update_is_best_effort() {
        let h = Harness::new().await;
        let flaky = Arc::new(FlakyStore {
            inner: InMemoryRefreshTokenStore::new(),
            fail_lookups: false,
            fail_touch: true,
        });
        let manager = h.manager_over(flaky, 3600);
        let pair = manager
            .issue_session(&h.profile, "a".to_string(), Some("phone"))
            .await
            .unwrap();

        let response = manager.exchange(&pair.refresh_token).await.unwrap();
        assert!(!response.access_token.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_without_target_is_a_no_op() {
        let h = Harness::new().await;
        let manager = h.manager_with_expiry(3600);
        manager
            .issue_session(&h.profile, "a".to_string(), Some("phone"))
            .await
            .unwrap();

        manager.revoke(h.profile.id, None, None).await.unwrap();
        manager.revoke(h.profile.id, Some(""), None).await.unwrap();

        assert_eq!(h.tokens.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_by_token_ignores_other_users() {
        let h = Harness::new().await;
        let manager = h.manager_with_expiry(3600);
        let pair = manager
            .issue_session(&h.profile, "a".to_string(), Some("phone"))
            .await
            .unwrap();

        manager
            .revoke(Uuid::new_v4(), Some(&pair.refresh_token), None)
            .await
            .unwrap();
        assert_eq!(h.tokens.records().await.len(), 1);

        manager
            .revoke(h.profile.id, Some(&pair.refresh_token), None)
            .await
            .unwrap();
        assert!(h.tokens.records().await.is_empty());
    }

    #[test]
    fn test_missing_refresh_secret_is_a_config_error() {
        let users = Arc::new(InMemoryUserStore::new());
        let result = JwtRefreshTokenManager::new(
            Arc::new(InMemoryRefreshTokenStore::new()),
            Arc::new(StoreCredentialVerifier::new(users, 4).unwrap()),
            Arc::new(JwtAccessTokenIssuer::new("access-secret", 60, None).unwrap()),
            "",
            3600,
            "issuer".to_string(),
        );

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_overflowing_refresh_ttl_is_a_config_error() {
        let users = Arc::new(InMemoryUserStore::new());
        let result = JwtRefreshTokenManager::new(
            Arc::new(InMemoryRefreshTokenStore::new()),
            Arc::new(StoreCredentialVerifier::new(users, 4).unwrap()),
            Arc::new(JwtAccessTokenIssuer::new("access-secret", 60, None).unwrap()),
            "refresh-secret",
            i64::MAX,
            "issuer".to_string(),
        );

        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
