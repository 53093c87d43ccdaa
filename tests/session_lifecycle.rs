//! Token lifecycle properties, exercised through the public components

use std::sync::Arc;

use sessionvault::auth::{
    hash_password, AccessTokenIssuer, CredentialVerifier, JwtAccessTokenIssuer,
    JwtRefreshTokenManager, RefreshTokenManager, StoreCredentialVerifier,
};
use sessionvault::domain::{NewUser, Profile};
use sessionvault::error::{AppError, AuthError};
use sessionvault::store::{InMemoryRefreshTokenStore, InMemoryUserStore, UserStore};

struct Engine {
    users: Arc<InMemoryUserStore>,
    records: Arc<InMemoryRefreshTokenStore>,
    credentials: Arc<dyn CredentialVerifier>,
    access_tokens: Arc<dyn AccessTokenIssuer>,
    refresh_tokens: JwtRefreshTokenManager,
}

impl Engine {
    fn new() -> Self {
        let users = Arc::new(InMemoryUserStore::new());
        let records = Arc::new(InMemoryRefreshTokenStore::new());
        let credentials: Arc<dyn CredentialVerifier> =
            Arc::new(StoreCredentialVerifier::new(users.clone(), 4).unwrap());
        let access_tokens: Arc<dyn AccessTokenIssuer> =
            Arc::new(JwtAccessTokenIssuer::new("access", 3600, None).unwrap());
        let refresh_tokens = JwtRefreshTokenManager::new(
            records.clone(),
            credentials.clone(),
            access_tokens.clone(),
            "refresh",
            86400,
            "lifecycle".to_string(),
        )
        .unwrap();

        Self {
            users,
            records,
            credentials,
            access_tokens,
            refresh_tokens,
        }
    }

    async fn register(&self, email: &str, password: &str) -> Profile {
        let user = self
            .users
            .create_user_with_credential(
                NewUser {
                    email: email.to_string(),
                    name: Some("Tester".to_string()),
                },
                hash_password(password, 4).unwrap(),
            )
            .await
            .unwrap();
        self.credentials.convert_to_profile(&user)
    }

    async fn login(&self, profile: &Profile, user_agent: Option<&str>) -> (String, String) {
        let access_token = self.access_tokens.issue(profile).unwrap();
        let pair = self
            .refresh_tokens
            .issue_session(profile, access_token, user_agent)
            .await
            .unwrap();
        (pair.access_token, pair.refresh_token)
    }
}

fn is_auth_failure(result: Result<impl std::fmt::Debug, AppError>) -> bool {
    matches!(result, Err(ref e) if e.is_authentication_failure())
}

#[tokio::test]
async fn credential_failures_are_indistinguishable() {
    let engine = Engine::new();
    let profile = engine.register("a@b.com", "11111111").await;

    let user = engine
        .credentials
        .verify_credentials("a@b.com", "11111111")
        .await
        .unwrap();
    assert_eq!(user.id, profile.id);

    let failures = vec![
        engine.credentials.verify_credentials("a@b.com", "11111112").await,
        engine.credentials.verify_credentials("b@b.com", "11111111").await,
        engine.credentials.verify_credentials("", "").await,
    ];
    for failure in failures {
        let err = failure.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidCredentials)));
        assert_eq!(err.to_string(), "Invalid email or password.");
    }
}

#[tokio::test]
async fn access_token_round_trip_preserves_subject() {
    let engine = Engine::new();

    for email in ["a@b.com", "second@example.org", "third.user@domain.co.uk"] {
        let profile = engine.register(email, "11111111").await;
        let token = engine.access_tokens.issue(&profile).unwrap();

        let verified = engine.access_tokens.verify(&token).unwrap();
        assert_eq!(verified.id, profile.id);
        assert_eq!(verified.email, profile.email);
    }
}

#[tokio::test]
async fn same_device_login_is_idempotent() {
    let engine = Engine::new();
    let profile = engine.register("a@b.com", "11111111").await;

    let (_, first) = engine.login(&profile, Some("phone")).await;
    let (_, second) = engine.login(&profile, Some("phone")).await;

    assert_eq!(first, second);
    assert_eq!(engine.records.records().await.len(), 1);
}

#[tokio::test]
async fn device_less_login_creates_a_session_every_time() {
    let engine = Engine::new();
    let profile = engine.register("a@b.com", "11111111").await;

    let (_, first) = engine.login(&profile, None).await;
    let (_, second) = engine.login(&profile, None).await;

    assert_ne!(first, second);
    assert_eq!(engine.records.records().await.len(), 2);
}

#[tokio::test]
async fn exchange_rotates_access_token_but_keeps_refresh_token() {
    let engine = Engine::new();
    let profile = engine.register("a@b.com", "11111111").await;
    let (original_access, refresh_token) = engine.login(&profile, Some("phone")).await;

    let first = engine.refresh_tokens.exchange(&refresh_token).await.unwrap();
    let second = engine.refresh_tokens.exchange(&refresh_token).await.unwrap();

    assert_ne!(first.access_token, original_access);
    assert_eq!(
        engine.access_tokens.verify(&second.access_token).unwrap().id,
        profile.id
    );
}

#[tokio::test]
async fn revoked_token_no_longer_exchanges() {
    let engine = Engine::new();
    let profile = engine.register("a@b.com", "11111111").await;
    let (_, refresh_token) = engine.login(&profile, Some("phone")).await;

    engine
        .refresh_tokens
        .revoke(profile.id, Some(&refresh_token), None)
        .await
        .unwrap();

    let err = engine.refresh_tokens.exchange(&refresh_token).await.unwrap_err();
    assert!(err.is_authentication_failure());
    assert_eq!(err.to_string(), "Error verifying token : Invalid Token");
}

#[tokio::test]
async fn device_revocation_leaves_other_devices_alone() {
    let engine = Engine::new();
    let profile = engine.register("a@b.com", "11111111").await;
    let (_, phone) = engine.login(&profile, Some("phone")).await;
    let (_, laptop) = engine.login(&profile, Some("laptop")).await;

    engine
        .refresh_tokens
        .revoke(profile.id, None, Some("phone"))
        .await
        .unwrap();

    assert!(is_auth_failure(engine.refresh_tokens.exchange(&phone).await));
    assert!(engine.refresh_tokens.exchange(&laptop).await.is_ok());

    let remaining = engine.records.records().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].user_agent.as_deref(), Some("laptop"));
}

#[tokio::test]
async fn soft_deleted_user_cannot_exchange() {
    let engine = Engine::new();
    let profile = engine.register("a@b.com", "11111111").await;
    let (_, refresh_token) = engine.login(&profile, Some("phone")).await;

    assert!(engine.users.soft_delete(profile.id).await);

    assert!(is_auth_failure(engine.refresh_tokens.exchange(&refresh_token).await));
    assert!(is_auth_failure(
        engine.credentials.verify_credentials("a@b.com", "11111111").await
    ));
}
