//! # User Record & Store Boundary
//!
//! The persisted user record the auth workflows mutate, the `UserStore`
//! trait the real document store implements, and an in-memory store for
//! tests and the dev server.
//!
//! Sensitive fields (password hash, outstanding secret token, OTP
//! secret, recovery codes) live on the full record; anything leaving
//! the service goes through the redacted [`UserProfile`] projection.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{AuthError, AuthResult};
use super::recovery::RecoveryCode;

// ==================
// User Record
// ==================

/// Full persisted user record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Email-verification state
    pub verified: bool,
    /// Single-use secret backing both the email-verify and
    /// password-reset links; never outstanding for both at once
    #[serde(skip_serializing, default)]
    pub secret_token: Option<String>,
    /// New address staged by an email change, promoted only after the
    /// verification link is followed
    pub pending_email: Option<String>,

    /// Password-reset state; `grant_password_reset` implies
    /// `password_reset_request`
    pub password_reset_request: bool,
    pub grant_password_reset: bool,

    /// Two-factor state
    pub otp_enabled: bool,
    pub otp_verified: bool,
    #[serde(skip_serializing, default)]
    pub otp_base32: Option<String>,
    // The otpauth URL embeds the base32 secret, so it stays hidden too
    #[serde(skip_serializing, default)]
    pub otp_auth_url: Option<String>,
    #[serde(skip_serializing, default)]
    pub recovery_codes: Vec<RecoveryCode>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fresh unverified account
    pub fn new(name: impl Into<String>, email: impl Into<String>, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            password_hash,
            verified: false,
            secret_token: None,
            pending_email: None,
            password_reset_request: false,
            grant_password_reset: false,
            otp_enabled: false,
            otp_verified: false,
            otp_base32: None,
            otp_auth_url: None,
            recovery_codes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Public projection: what handlers return to clients
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub verified: bool,
    pub otp_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            verified: user.verified,
            otp_enabled: user.otp_enabled,
            created_at: user.created_at,
        }
    }
}

// ==================
// Partial Update
// ==================

/// Partial update applied atomically by [`UserStore::update`].
///
/// Outer `None` leaves a field alone; for nullable fields the inner
/// option distinguishes "set" from "clear".
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub verified: Option<bool>,
    pub secret_token: Option<Option<String>>,
    pub pending_email: Option<Option<String>>,
    pub password_reset_request: Option<bool>,
    pub grant_password_reset: Option<bool>,
    pub otp_enabled: Option<bool>,
    pub otp_verified: Option<bool>,
    pub otp_base32: Option<Option<String>>,
    pub otp_auth_url: Option<Option<String>>,
    pub recovery_codes: Option<Vec<RecoveryCode>>,
}

impl UserPatch {
    fn apply(self, user: &mut User) {
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(hash) = self.password_hash {
            user.password_hash = hash;
        }
        if let Some(verified) = self.verified {
            user.verified = verified;
        }
        if let Some(secret_token) = self.secret_token {
            user.secret_token = secret_token;
        }
        if let Some(pending_email) = self.pending_email {
            user.pending_email = pending_email;
        }
        if let Some(flag) = self.password_reset_request {
            user.password_reset_request = flag;
        }
        if let Some(flag) = self.grant_password_reset {
            user.grant_password_reset = flag;
        }
        if let Some(flag) = self.otp_enabled {
            user.otp_enabled = flag;
        }
        if let Some(flag) = self.otp_verified {
            user.otp_verified = flag;
        }
        if let Some(otp_base32) = self.otp_base32 {
            user.otp_base32 = otp_base32;
        }
        if let Some(otp_auth_url) = self.otp_auth_url {
            user.otp_auth_url = otp_auth_url;
        }
        if let Some(codes) = self.recovery_codes {
            user.recovery_codes = codes;
        }
        user.updated_at = Utc::now();
    }
}

// ==================
// Store Boundary
// ==================

/// Persistence boundary the auth service talks to.
///
/// Lookups return the full record including sensitive fields; each
/// `update` is a single atomic document write from the caller's
/// perspective.
pub trait UserStore: Send + Sync {
    fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>>;

    fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Lookup by the staged address of an in-flight email change
    fn find_by_pending_email(&self, email: &str) -> AuthResult<Option<User>>;

    fn create(&self, user: &User) -> AuthResult<()>;

    /// Apply a partial update and return the updated record
    fn update(&self, id: Uuid, patch: UserPatch) -> AuthResult<User>;
}

/// In-memory store for tests and the dev server
pub struct InMemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStore for InMemoryUserStore {
    fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        let users = self.users.read().unwrap();
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let users = self.users.read().unwrap();
        Ok(users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn find_by_pending_email(&self, email: &str) -> AuthResult<Option<User>> {
        let users = self.users.read().unwrap();
        Ok(users
            .iter()
            .find(|u| {
                u.pending_email
                    .as_deref()
                    .is_some_and(|p| p.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    fn create(&self, user: &User) -> AuthResult<()> {
        let mut users = self.users.write().unwrap();
        if users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(AuthError::bad_request("email already in use"));
        }
        users.push(user.clone());
        Ok(())
    }

    fn update(&self, id: Uuid, patch: UserPatch) -> AuthResult<User> {
        let mut users = self.users.write().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AuthError::not_found("user does not exist"))?;

        patch.apply(user);
        Ok(user.clone())
    }
}

// ==================
// Tests
// ==================
