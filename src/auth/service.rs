//! # Auth Orchestration Service
//!
//! Composes the token codec, secret generator, signed-token service,
//! TOTP engine, recovery-code manager and credential verifier into the
//! account-security workflows: login, OTP enrollment/validation/
//! disable, recovery-code consumption, email verification and the
//! multi-step password-reset state machine.
//!
//! Every workflow is a guarded transition over the persisted user
//! record, applied as a single store update. Failure messages follow
//! one rule: nothing a caller reads may reveal which validation step
//! failed when that would aid guessing.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::AuthConfig;

use super::crypto::{Encoding, TokenCipher};
use super::email::{EmailSender, EmailTemplate};
use super::errors::{AuthError, AuthResult};
use super::jwt::JwtManager;
use super::password::{hash_password, verify_password};
use super::random;
use super::recovery::{self, ConsumeOutcome, RECOVERY_CODE_COUNT};
use super::totp::{TotpConfig, TotpGenerator};
use super::user::{User, UserPatch, UserProfile, UserStore};

// Uniform messages; the same string is returned regardless of which
// check actually failed.
const WRONG_CREDENTIALS: &str = "wrong credentials";
const OTP_INVALID: &str = "token is invalid or user does not exist";
const VERIFY_FAILED: &str = "could not verify email";
const RESET_FAILED: &str = "could not reset password";

// ==================
// Response Types
// ==================

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    pub otp_enabled: bool,
}

/// Returned by OTP enrollment step 1; the caller renders the URL as a
/// QR code
#[derive(Debug, Clone, Serialize)]
pub struct OtpSetup {
    pub otp_base32: String,
    pub otp_auth_url: String,
}

/// Returned by OTP enrollment step 2; the plaintext recovery codes
/// appear here exactly once and are never persisted
#[derive(Debug, Clone, Serialize)]
pub struct OtpEnrollment {
    pub recovery_codes: Vec<String>,
    pub user: UserProfile,
}

// ==================
// Service
// ==================

pub struct AuthService<S: UserStore> {
    store: Arc<S>,
    mailer: Option<Arc<dyn EmailSender>>,
    cipher: TokenCipher,
    jwt: JwtManager,
    config: AuthConfig,
}

impl<S: UserStore> AuthService<S> {
    pub fn new(store: Arc<S>, mailer: Option<Arc<dyn EmailSender>>, config: AuthConfig) -> Self {
        let cipher = TokenCipher::new(&config.cipher_key, &config.cipher_salt);
        let jwt = JwtManager::new(&config.jwt_secret);
        Self {
            store,
            mailer,
            cipher,
            jwt,
            config,
        }
    }

    // ==================
    // Registration & Login
    // ==================

    pub fn register(&self, name: &str, email: &str, password: &str) -> AuthResult<UserProfile> {
        let user = User::new(name, email, hash_password(password)?);
        self.store.create(&user)?;
        tracing::info!(user_id = %user.id, "registered new user");
        Ok(UserProfile::from(&user))
    }

    /// Verify email/password and issue a session token.
    ///
    /// Unknown email and wrong password are indistinguishable to the
    /// caller.
    pub fn login(&self, email: &str, password: &str) -> AuthResult<LoginResponse> {
        let user = self
            .store
            .find_by_email(email)?
            .ok_or_else(|| AuthError::unauthorized(WRONG_CREDENTIALS))?;

        if !verify_password(&user.password_hash, password) {
            return Err(AuthError::unauthorized(WRONG_CREDENTIALS));
        }

        let issued = self
            .jwt
            .issue_session(user.id, self.config.session_ttl_secs)?;

        Ok(LoginResponse {
            token: issued.token,
            expires_in: issued.expires_in,
            otp_enabled: user.otp_enabled,
        })
    }

    /// Resolve a session token into the user it belongs to
    pub fn authenticate(&self, token: &str) -> AuthResult<User> {
        let claims = self.jwt.verify(token)?;
        let id = claims
            .id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| AuthError::unauthorized("invalid token"))?;

        self.store
            .find_by_id(id)?
            .ok_or_else(|| AuthError::not_found("the user belonging to this token no longer exists"))
    }

    // ==================
    // OTP Enrollment & Validation
    // ==================

    /// Enrollment step 1: mint a fresh base32 secret and provisioning
    /// URL
    pub fn generate_otp(&self, user_id: Uuid) -> AuthResult<OtpSetup> {
        let user = self.load_user(user_id)?;
        if !user.verified {
            return Err(AuthError::forbidden(
                "only verified users can enable two-factor auth",
            ));
        }

        let secret = random::random_base32(32);
        let generator = self.totp(&secret, &user.email);
        let url = generator.otpauth_url();

        self.store.update(
            user_id,
            UserPatch {
                otp_base32: Some(Some(secret.clone())),
                otp_auth_url: Some(Some(url.clone())),
                ..Default::default()
            },
        )?;

        Ok(OtpSetup {
            otp_base32: secret,
            otp_auth_url: url,
        })
    }

    /// Enrollment step 2: confirm the code with a zero window, switch
    /// OTP on, and mint a replacement set of recovery codes
    pub async fn verify_otp(&self, user_id: Uuid, code: &str) -> AuthResult<OtpEnrollment> {
        let user = self.load_user_for_otp(user_id)?;
        let generator = self.stored_totp(&user)?;

        if !generator.verify(code, 0)? {
            return Err(AuthError::unauthorized(OTP_INVALID));
        }

        let codes = random::random_string_array(
            &self.config.alphabet,
            self.config.recovery_code_length,
            RECOVERY_CODE_COUNT,
        );
        let hashed = recovery::hash_all(&codes).await?;

        let updated = self.store.update(
            user_id,
            UserPatch {
                otp_enabled: Some(true),
                otp_verified: Some(true),
                recovery_codes: Some(hashed),
                ..Default::default()
            },
        )?;
        tracing::info!(%user_id, "two-factor auth enabled");

        Ok(OtpEnrollment {
            recovery_codes: codes,
            user: UserProfile::from(&updated),
        })
    }

    /// Routine re-auth check; ±1 step window for clock drift
    pub fn validate_otp(&self, user_id: Uuid, code: &str) -> AuthResult<()> {
        let user = self.load_user_for_otp(user_id)?;
        let generator = self.stored_totp(&user)?;

        if generator.verify(code, 1)? {
            Ok(())
        } else {
            Err(AuthError::unauthorized(OTP_INVALID))
        }
    }

    /// Turn OTP off after a ±1 window check.
    ///
    /// Recovery codes stay in place; re-enrollment replaces the set.
    pub fn disable_otp(&self, user_id: Uuid, code: &str) -> AuthResult<UserProfile> {
        let user = self.load_user_for_otp(user_id)?;
        let generator = self.stored_totp(&user)?;

        if !generator.verify(code, 1)? {
            return Err(AuthError::unauthorized(OTP_INVALID));
        }

        let updated = self.store.update(
            user_id,
            UserPatch {
                otp_enabled: Some(false),
                otp_verified: Some(false),
                otp_base32: Some(None),
                otp_auth_url: Some(None),
                ..Default::default()
            },
        )?;
        tracing::info!(%user_id, "two-factor auth disabled");

        Ok(UserProfile::from(&updated))
    }

    /// Burn a recovery code.
    ///
    /// An unknown code is unauthorized; a known-but-burned code is
    /// forbidden (the two-tier 401/403 distinction).
    pub fn validate_recovery_code(&self, user_id: Uuid, code: &str) -> AuthResult<()> {
        let user = self
            .store
            .find_by_id(user_id)?
            .ok_or_else(|| AuthError::unauthorized("recovery code does not exist"))?;

        let mut codes = user.recovery_codes;
        match recovery::consume(&mut codes, code) {
            ConsumeOutcome::Consumed => {
                self.store.update(
                    user_id,
                    UserPatch {
                        recovery_codes: Some(codes),
                        ..Default::default()
                    },
                )?;
                tracing::info!(%user_id, "recovery code consumed");
                Ok(())
            }
            ConsumeOutcome::AlreadyUsed => Err(AuthError::forbidden(
                "recovery code has already been used",
            )),
            ConsumeOutcome::NotFound => {
                Err(AuthError::unauthorized("recovery code does not exist"))
            }
        }
    }

    // ==================
    // Email Verification
    // ==================

    /// Mint the single-use secret, stash it on the record, and mail the
    /// verification link
    pub async fn request_email_verification(&self, user_id: Uuid) -> AuthResult<()> {
        let user = self.load_user(user_id)?;
        if user.verified {
            return Err(AuthError::bad_request("user is already verified"));
        }

        let url =
            self.issue_action_link(user_id, &user.email, "verifyemail", UserPatch::default())?;
        self.dispatch(
            &user.email,
            EmailTemplate::VerifyEmail {
                name: user.name.clone(),
                url,
                expires_minutes: self.action_ttl_minutes(),
            },
        )
        .await;

        Ok(())
    }

    /// Follow a verification link: signed token + encrypted email +
    /// stored secret must all line up
    pub fn validate_email_verification(
        &self,
        encrypted_email: &str,
        token: &str,
    ) -> AuthResult<UserProfile> {
        let token_secret = self.action_secret(token, VERIFY_FAILED)?;
        let email = self
            .cipher
            .decrypt(encrypted_email, Encoding::Base64Url, Encoding::Utf8)
            .map_err(|_| AuthError::bad_request(VERIFY_FAILED))?;

        if let Some(user) = self.store.find_by_email(&email)? {
            // First-time verification of the registered address
            if user.verified {
                return Err(AuthError::bad_request("user is already verified"));
            }
            self.check_stored_secret(&user, &token_secret, VERIFY_FAILED)?;

            let updated = self.store.update(
                user.id,
                UserPatch {
                    verified: Some(true),
                    secret_token: Some(None),
                    ..Default::default()
                },
            )?;
            tracing::info!(user_id = %updated.id, "email verified");
            return Ok(UserProfile::from(&updated));
        }

        if let Some(user) = self.store.find_by_pending_email(&email)? {
            // Email change: the new address becomes authoritative only
            // now that its link was followed
            self.check_stored_secret(&user, &token_secret, VERIFY_FAILED)?;

            let updated = self.store.update(
                user.id,
                UserPatch {
                    email: Some(email),
                    pending_email: Some(None),
                    verified: Some(true),
                    secret_token: Some(None),
                    ..Default::default()
                },
            )?;
            tracing::info!(user_id = %updated.id, "email change confirmed");
            return Ok(UserProfile::from(&updated));
        }

        Err(AuthError::bad_request(VERIFY_FAILED))
    }

    /// Stage a new address and re-run the verification flow against it;
    /// the swap happens when the link is followed
    pub async fn update_email(&self, user_id: Uuid, new_email: &str) -> AuthResult<()> {
        let user = self.load_user(user_id)?;
        if user.email.eq_ignore_ascii_case(new_email) {
            return Err(AuthError::bad_request(
                "new email must be different from the current email",
            ));
        }
        if self.store.find_by_email(new_email)?.is_some() {
            return Err(AuthError::bad_request("email already in use"));
        }

        let url = self.issue_action_link(
            user_id,
            new_email,
            "verifyemail",
            UserPatch {
                pending_email: Some(Some(new_email.to_string())),
                ..Default::default()
            },
        )?;
        self.dispatch(
            new_email,
            EmailTemplate::VerifyEmail {
                name: user.name.clone(),
                url,
                expires_minutes: self.action_ttl_minutes(),
            },
        )
        .await;

        Ok(())
    }

    // ==================
    // Password Reset
    // ==================

    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let user = self
            .store
            .find_by_email(email)?
            .ok_or_else(|| AuthError::not_found("user does not exist"))?;
        if !user.verified {
            return Err(AuthError::forbidden(
                "account must be verified to reset the password",
            ));
        }

        let url = self.issue_action_link(
            user.id,
            &user.email,
            "resetpassword",
            UserPatch {
                password_reset_request: Some(true),
                grant_password_reset: Some(false),
                ..Default::default()
            },
        )?;

        self.dispatch(
            &user.email,
            EmailTemplate::PasswordReset {
                name: user.name.clone(),
                url,
                expires_minutes: self.action_ttl_minutes(),
            },
        )
        .await;

        Ok(())
    }

    /// Follow a reset link. On success the reset is granted and the
    /// secret comes back base64-encoded, acting as the short-lived
    /// credential for the actual reset call.
    pub fn validate_password_reset(
        &self,
        encrypted_email: &str,
        token: &str,
    ) -> AuthResult<String> {
        let token_secret = self.action_secret(token, RESET_FAILED)?;
        let email = self
            .cipher
            .decrypt(encrypted_email, Encoding::Base64Url, Encoding::Utf8)
            .map_err(|_| AuthError::bad_request(RESET_FAILED))?;

        let user = self
            .store
            .find_by_email(&email)?
            .ok_or_else(|| AuthError::bad_request(RESET_FAILED))?;
        if !user.password_reset_request {
            return Err(AuthError::bad_request("no request to reset password"));
        }
        self.check_stored_secret(&user, &token_secret, RESET_FAILED)?;

        self.store.update(
            user.id,
            UserPatch {
                grant_password_reset: Some(true),
                ..Default::default()
            },
        )?;

        Ok(STANDARD.encode(&token_secret))
    }

    /// Apply the new password. Requires the full granted state and the
    /// secret from the password-token header; clears all reset state on
    /// success.
    pub fn reset_password(
        &self,
        email: &str,
        password_token: &str,
        new_password: &str,
    ) -> AuthResult<UserProfile> {
        let secret = decode_password_token(password_token)
            .ok_or_else(|| AuthError::bad_request(RESET_FAILED))?;

        let user = self
            .store
            .find_by_email(email)?
            .ok_or_else(|| AuthError::bad_request(RESET_FAILED))?;

        let granted = user.verified && user.password_reset_request && user.grant_password_reset;
        if !granted {
            return Err(AuthError::bad_request(RESET_FAILED));
        }
        self.check_stored_secret(&user, &secret, RESET_FAILED)?;

        if verify_password(&user.password_hash, new_password) {
            return Err(AuthError::bad_request(
                "invalid password, try a different password",
            ));
        }

        let updated = self.store.update(
            user.id,
            UserPatch {
                password_hash: Some(hash_password(new_password)?),
                password_reset_request: Some(false),
                grant_password_reset: Some(false),
                secret_token: Some(None),
                ..Default::default()
            },
        )?;
        tracing::info!(user_id = %updated.id, "password reset completed");

        Ok(UserProfile::from(&updated))
    }

    /// Abandon a granted reset without changing the password.
    ///
    /// Unlike the reset itself, each unmet precondition gets its own
    /// message; this path authorizes nothing.
    pub fn cancel_password_reset(&self, email: &str, password_token: &str) -> AuthResult<()> {
        let user = self
            .store
            .find_by_email(email)?
            .ok_or_else(|| AuthError::not_found("user does not exist"))?;

        if !user.verified {
            return Err(AuthError::forbidden("account is not verified"));
        }
        if !user.password_reset_request {
            return Err(AuthError::forbidden("no password reset request is active"));
        }
        if !user.grant_password_reset {
            return Err(AuthError::forbidden("password reset was not granted"));
        }

        let secret = decode_password_token(password_token);
        let matches = secret
            .as_deref()
            .zip(user.secret_token.as_deref())
            .map(|(a, b)| secrets_match(a, b))
            .unwrap_or(false);
        if !matches {
            return Err(AuthError::forbidden("invalid password reset token"));
        }

        self.store.update(
            user.id,
            UserPatch {
                password_reset_request: Some(false),
                grant_password_reset: Some(false),
                secret_token: Some(None),
                ..Default::default()
            },
        )?;
        tracing::info!(user_id = %user.id, "password reset cancelled");

        Ok(())
    }

    // ==================
    // Internals
    // ==================

    fn load_user(&self, user_id: Uuid) -> AuthResult<User> {
        self.store
            .find_by_id(user_id)?
            .ok_or_else(|| AuthError::not_found("user does not exist"))
    }

    /// OTP flows report the same message for a missing user and a bad
    /// code
    fn load_user_for_otp(&self, user_id: Uuid) -> AuthResult<User> {
        self.store
            .find_by_id(user_id)?
            .ok_or_else(|| AuthError::unauthorized(OTP_INVALID))
    }

    fn totp(&self, secret: &str, label: &str) -> TotpGenerator {
        TotpGenerator::new(secret, label, TotpConfig::new(self.config.app_name.clone()))
    }

    fn stored_totp(&self, user: &User) -> AuthResult<TotpGenerator> {
        let secret = user
            .otp_base32
            .as_deref()
            .ok_or_else(|| AuthError::unauthorized(OTP_INVALID))?;
        Ok(self.totp(secret, &user.email))
    }

    /// Mint a fresh single-use secret, persist it together with the
    /// rest of the transition in `patch` (one document update), and
    /// build the signed action link for `path`
    fn issue_action_link(
        &self,
        user_id: Uuid,
        email: &str,
        path: &str,
        mut patch: UserPatch,
    ) -> AuthResult<String> {
        let secret = random::random_string(&self.config.alphabet, self.config.secret_token_length);

        patch.secret_token = Some(Some(secret.clone()));
        self.store.update(user_id, patch)?;

        let action = self
            .jwt
            .issue_action(&secret, self.config.action_token_ttl_secs)?;
        let encrypted_email = self
            .cipher
            .encrypt(email, Encoding::Utf8, Encoding::Base64Url)?;

        Ok(format!(
            "{}/{}/{}/{}",
            self.config.origin.trim_end_matches('/'),
            path,
            encrypted_email,
            action.token
        ))
    }

    /// Pull the embedded secret out of an action token, normalizing any
    /// failure to the flow's generic message
    fn action_secret(&self, token: &str, generic_message: &str) -> AuthResult<String> {
        self.jwt
            .verify(token)
            .ok()
            .and_then(|claims| claims.secret)
            .ok_or_else(|| AuthError::bad_request(generic_message))
    }

    /// Constant-time comparison against the outstanding stored secret
    fn check_stored_secret(
        &self,
        user: &User,
        candidate: &str,
        generic_message: &str,
    ) -> AuthResult<()> {
        let stored = user
            .secret_token
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::bad_request(generic_message))?;

        if secrets_match(candidate, stored) {
            Ok(())
        } else {
            Err(AuthError::bad_request(generic_message))
        }
    }

    fn action_ttl_minutes(&self) -> i64 {
        (self.config.action_token_ttl_secs / 60) as i64
    }

    /// Fire-and-forget mail dispatch: failures are logged, never
    /// surfaced
    async fn dispatch(&self, to: &str, template: EmailTemplate) {
        let Some(mailer) = self.mailer.clone() else {
            tracing::info!(to, url = template.url(), "no mail transport configured, skipping send");
            return;
        };

        let recipient = to.to_string();
        let result = tokio::task::spawn_blocking(move || mailer.send(&recipient, &template)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(to, error = %e, "failed to send email"),
            Err(e) => tracing::warn!(to, error = %e, "email dispatch task failed"),
        }
    }
}

fn secrets_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn decode_password_token(token: &str) -> Option<String> {
    let bytes = STANDARD.decode(token).ok()?;
    String::from_utf8(bytes).ok()
}

// ==================
// Tests
// ==================
