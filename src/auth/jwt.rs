//! # Signed Token Service
//!
//! Issues and verifies the two token families the auth flows rely on:
//! session tokens (carry the user id, 24 h default TTL) and single-use
//! action tokens (carry the secret mirrored in the user record, 1 h
//! TTL). Both are compact HS256 JWTs.
//!
//! Verification failures are indistinguishable to callers: expiry, bad
//! signature, and malformed input all produce the same
//! `Unauthorized("invalid token")`.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{AuthError, AuthResult};

/// Default session token lifetime (24 hours)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

/// Claims carried by both token families
///
/// Session tokens set `id`; action tokens set `secret`. Neither sets
/// both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// An issued token plus its lifetime, as returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
}

/// Signing/verification handle, constructed once from configuration
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Token TTLs are exact; no expiry leeway.
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issue a session token bound to a user id
    pub fn issue_session(&self, user_id: Uuid, ttl_secs: u64) -> AuthResult<TokenResponse> {
        self.issue(Some(user_id.to_string()), None, ttl_secs)
    }

    /// Issue a single-purpose action token carrying an opaque secret
    pub fn issue_action(&self, secret: &str, ttl_secs: u64) -> AuthResult<TokenResponse> {
        self.issue(None, Some(secret.to_string()), ttl_secs)
    }

    fn issue(
        &self,
        id: Option<String>,
        secret: Option<String>,
        ttl_secs: u64,
    ) -> AuthResult<TokenResponse> {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            id,
            secret,
            iat: now,
            exp: now + ttl_secs as i64,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(e))?;

        Ok(TokenResponse {
            token,
            expires_in: ttl_secs,
        })
    }

    /// Verify a token and return its claims.
    ///
    /// All failure modes collapse into one generic error; callers treat
    /// it as unauthenticated without learning why.
    pub fn verify(&self, token: &str) -> AuthResult<TokenClaims> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::unauthorized("invalid token"))
    }
}

// ==================
// Tests
// ==================
