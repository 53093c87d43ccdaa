/// Authentication module
///
/// Credential verification, access token issuance and the refresh token
/// lifecycle. Each component sits behind a trait so another signing scheme
/// or store can be swapped in without touching callers.

mod claims;
mod credentials;
mod jwt;
mod password;
mod refresh_token;

pub use claims::{AccessClaims, RefreshClaims};
pub use credentials::{CredentialVerifier, StoreCredentialVerifier};
pub use jwt::{AccessTokenIssuer, JwtAccessTokenIssuer};
pub use password::{hash_password, verify_password, MAX_PASSWORD_BYTES, MIN_PASSWORD_LENGTH};
pub use refresh_token::{JwtRefreshTokenManager, RefreshTokenManager};
