//! # Recovery Code Manager
//!
//! One-time backup credentials for when the TOTP device is unavailable.
//! Codes are hashed individually with bcrypt (cost 7) before storage;
//! plaintext is shown to the user exactly once at enrollment. Each
//! stored entry burns irreversibly on first use.

use serde::{Deserialize, Serialize};

use super::errors::{AuthError, AuthResult};

/// Codes per set; the whole set is replaced on every re-enrollment
pub const RECOVERY_CODE_COUNT: usize = 10;

/// bcrypt work factor for recovery codes (and account passwords)
pub const RECOVERY_HASH_COST: u32 = 7;

/// A stored recovery-code entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryCode {
    pub hash: String,
    pub used: bool,
}

/// Outcome of attempting to consume a candidate code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Matched an unused entry, now marked used
    Consumed,
    /// Matched an entry that was already burned
    AlreadyUsed,
    /// No entry matched
    NotFound,
}

/// Hash a batch of plaintext codes for storage.
///
/// Codes are independent, so each hash runs on its own blocking task;
/// output order matches input order.
pub async fn hash_all(codes: &[String]) -> AuthResult<Vec<RecoveryCode>> {
    let tasks: Vec<_> = codes
        .iter()
        .cloned()
        .map(|code| tokio::task::spawn_blocking(move || bcrypt::hash(code, RECOVERY_HASH_COST)))
        .collect();

    let mut hashed = Vec::with_capacity(codes.len());
    for joined in futures_util::future::join_all(tasks).await {
        let hash = joined
            .map_err(|e| AuthError::internal(e))?
            .map_err(|e| AuthError::internal(e))?;
        hashed.push(RecoveryCode { hash, used: false });
    }

    Ok(hashed)
}

/// Scan the stored set in order and consume the first entry matching
/// `candidate`.
///
/// The scan stops at the first hash match; total scan time varies with
/// match position.
pub fn consume(codes: &mut [RecoveryCode], candidate: &str) -> ConsumeOutcome {
    for entry in codes.iter_mut() {
        if bcrypt::verify(candidate, &entry.hash).unwrap_or(false) {
            if entry.used {
                return ConsumeOutcome::AlreadyUsed;
            }
            entry.used = true;
            return ConsumeOutcome::Consumed;
        }
    }

    ConsumeOutcome::NotFound
}

// ==================
// Tests
// ==================
