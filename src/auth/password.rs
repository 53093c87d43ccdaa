/// Password Hashing and Verification
///
/// bcrypt with a configurable work factor, plus the signup length policy.

use bcrypt::{hash, verify};

use crate::error::{AppError, ValidationError};

pub const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt reads only the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if the password fails the length policy or hashing fails
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    validate_password_length(password)?;

    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// A password longer than `MAX_PASSWORD_BYTES` never matches: bcrypt would
/// compare only its prefix. The hash is still checked so the call costs the
/// same either way.
///
/// # Errors
/// Returns error if the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let matches = verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

    Ok(matches && password.len() <= MAX_PASSWORD_BYTES)
}

fn validate_password_length(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_BYTES,
        )));
    }

    Ok(())
}
