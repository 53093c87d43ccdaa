/// Access Token Issuer
///
/// Stateless HS256 access tokens. Nothing is persisted; a token is valid
/// exactly while its signature checks out and `exp` lies in the future.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::AccessClaims;
use crate::configuration::{TokenSettings, MAX_TOKEN_EXPIRY_SECONDS};
use crate::domain::Profile;
use crate::error::{AppError, AuthError, ConfigError};

/// Mints and checks access tokens.
pub trait AccessTokenIssuer: Send + Sync {
    fn issue(&self, profile: &Profile) -> Result<String, AppError>;

    /// Fails with an authentication error on a bad signature, a malformed
    /// token, a wrong issuer or an expired token.
    fn verify(&self, token: &str) -> Result<Profile, AppError>;
}

pub struct JwtAccessTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: i64,
    issuer: Option<String>,
}

impl JwtAccessTokenIssuer {
    /// # Errors
    /// Returns a configuration error if the secret is empty or the TTL is
    /// beyond `MAX_TOKEN_EXPIRY_SECONDS`
    pub fn new(secret: &str, expiry_seconds: i64, issuer: Option<String>) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired("access token secret".to_string()).into());
        }
        if expiry_seconds > MAX_TOKEN_EXPIRY_SECONDS {
            return Err(ConfigError::InvalidValue(format!(
                "access token expiry must not exceed {} seconds",
                MAX_TOKEN_EXPIRY_SECONDS
            ))
            .into());
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
            issuer,
        })
    }

    pub fn from_settings(settings: &TokenSettings) -> Result<Self, AppError> {
        Self::new(
            &settings.access_secret,
            settings.access_token_expiry,
            settings.access_issuer.clone(),
        )
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }
}

impl AccessTokenIssuer for JwtAccessTokenIssuer {
    fn issue(&self, profile: &Profile) -> Result<String, AppError> {
        let claims = AccessClaims::new(profile, self.expiry_seconds, self.issuer.clone());

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    fn verify(&self, token: &str) -> Result<Profile, AppError> {
        let claims = decode::<AccessClaims>(token, &self.decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT validation error: {}", e);
                AppError::Auth(AuthError::AccessTokenInvalid)
            })?;

        claims.into_profile()
    }
}
