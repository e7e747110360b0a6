//! # Credential Verifier
//!
//! bcrypt hashing and verification for account passwords. The work
//! factor matches the recovery-code cost so both credentials age
//! together.

use super::errors::{AuthError, AuthResult};
use super::recovery::RECOVERY_HASH_COST;

/// Hash a password for storage
pub fn hash_password(password: &str) -> AuthResult<String> {
    bcrypt::hash(password, RECOVERY_HASH_COST).map_err(|e| AuthError::internal(e))
}

/// Check a candidate against a stored hash.
///
/// Malformed stored hashes count as a mismatch rather than an error;
/// login must never leak storage state.
pub fn verify_password(stored_hash: &str, candidate: &str) -> bool {
    bcrypt::verify(candidate, stored_hash).unwrap_or(false)
}

// ==================
// Tests
// ==================
