use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use tracing::instrument;

use crate::models::{ChangePasswordRequest, PatientError};

#[instrument(skip(password))]
pub fn hash_password(password: &str) -> Result<String, PatientError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PatientError::DatabaseError(format!("Failed to hash password: {}", e)))
}

#[instrument(skip(password, hash))]
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PatientError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| PatientError::DatabaseError(format!("Stored password hash is unreadable: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PatientError::DatabaseError(e.to_string())),
    }
}

/// Verifies the current password against the stored hash and returns the replacement hash.
///
/// Confirmation matching is part of `ChangePasswordRequest` validation.
pub fn rehash_for_change(request: &ChangePasswordRequest, stored_hash: &str) -> Result<String, PatientError> {
    if !verify_password(&request.current_password, stored_hash)? {
        return Err(PatientError::WrongPassword);
    }

    hash_password(&request.new_password)
}
