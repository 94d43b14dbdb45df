// Password hashing and validation

use crate::core::errors::{ServiceError, ServiceResult};
use bcrypt::{hash, verify};

/// Minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length (bcrypt has a 72-byte limit)
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Hash a password using bcrypt on the blocking thread pool
///
/// The returned string embeds the salt and cost.
pub async fn hash_password(password: &str, cost: u32) -> ServiceResult<String> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || {
        hash(password, cost).map_err(|e| ServiceError::InternalError(format!("bcrypt hash: {}", e)))
    })
    .await
    .map_err(|e| ServiceError::InternalError(format!("Task join error: {}", e)))?
}

/// Verify a password against a bcrypt hash
///
/// `Ok(false)` on mismatch; `Err` only when the hash itself is unusable.
pub async fn verify_password(password: &str, hash: &str) -> ServiceResult<bool> {
    let password = password.to_string();
    let hash = hash.to_string();

    tokio::task::spawn_blocking(move || {
        verify(password, &hash).map_err(|e| ServiceError::InternalError(format!("bcrypt verify: {}", e)))
    })
    .await
    .map_err(|e| ServiceError::InternalError(format!("Task join error: {}", e)))?
}

/// Check length bounds before hashing
pub fn validate_password(password: &str) -> ServiceResult<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ServiceError::ValidationError(format!(
            "Password must be at most {} bytes",
            MAX_PASSWORD_LENGTH
        )));
    }

    Ok(())
}
